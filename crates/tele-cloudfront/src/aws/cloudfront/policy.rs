//! Cookie, header and query string blocks shared by cache policies and
//! origin-request policies.
//!
//! Both policy types nest the same three blocks, differing only in which
//! behaviors they accept.
use aws_sdk_cloudfront::types::{CookieNames, Headers, QueryStringNames};
use snafu::prelude::*;

use super::{BuildSnafu, Error, Items};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CookiesConfig<B> {
    pub cookie_behavior: B,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<Items<String>>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HeadersConfig<B> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_behavior: Option<B>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Items<String>>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QueryStringsConfig<B> {
    pub query_string_behavior: B,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_strings: Option<Items<String>>,
}

pub(crate) fn expand_cookie_names(
    cookies: Option<&Items<String>>,
) -> Result<Option<CookieNames>, Error> {
    Items::non_empty(cookies)
        .map(|cookies| {
            CookieNames::builder()
                .quantity(cookies.quantity())
                .set_items(Some(cookies.to_vec()))
                .build()
                .context(BuildSnafu {
                    what: "CookieNames",
                })
        })
        .transpose()
}

pub(crate) fn expand_headers(headers: Option<&Items<String>>) -> Result<Option<Headers>, Error> {
    Items::non_empty(headers)
        .map(|headers| {
            Headers::builder()
                .quantity(headers.quantity())
                .set_items(Some(headers.to_vec()))
                .build()
                .context(BuildSnafu { what: "Headers" })
        })
        .transpose()
}

pub(crate) fn expand_query_string_names(
    query_strings: Option<&Items<String>>,
) -> Result<Option<QueryStringNames>, Error> {
    Items::non_empty(query_strings)
        .map(|query_strings| {
            QueryStringNames::builder()
                .quantity(query_strings.quantity())
                .set_items(Some(query_strings.to_vec()))
                .build()
                .context(BuildSnafu {
                    what: "QueryStringNames",
                })
        })
        .transpose()
}

pub(crate) fn flatten_cookie_names(cookies: Option<&CookieNames>) -> Option<Items<String>> {
    cookies.and_then(|c| Items::flatten(c.items()))
}

pub(crate) fn flatten_headers(headers: Option<&Headers>) -> Option<Items<String>> {
    headers.and_then(|h| Items::flatten(h.items()))
}

pub(crate) fn flatten_query_string_names(
    query_strings: Option<&QueryStringNames>,
) -> Option<Items<String>> {
    query_strings.and_then(|q| Items::flatten(q.items()))
}
