//! CloudFront origin-request policies.
//!
//! These choose the values CloudFront includes in requests it sends to the
//! origin, independently of the cache key.
use aws_sdk_cloudfront::types::{
    OriginRequestPolicyConfig, OriginRequestPolicyCookieBehavior,
    OriginRequestPolicyCookiesConfig, OriginRequestPolicyHeaderBehavior,
    OriginRequestPolicyHeadersConfig, OriginRequestPolicyQueryStringBehavior,
    OriginRequestPolicyQueryStringsConfig,
};
use snafu::prelude::*;

use super::{
    api::Found,
    policy::{self, CookiesConfig, HeadersConfig, QueryStringsConfig},
    schema::{Attribute, Kind, Schema},
    BuildSnafu, CloudFront, Error, IncompleteSnafu,
};
use crate::{HasDependencies, Resource};

const ITEMS: &[Attribute] = &[Attribute::optional("items", Kind::StringSet)];

pub const SCHEMA: Schema = Schema {
    type_name: "aws_cloudfront_origin_request_policy",
    attributes: &[
        Attribute::optional("comment", Kind::String),
        Attribute::required("cookies_config", Kind::Block)
            .max_items(1)
            .with(&[
                Attribute::required("cookie_behavior", Kind::String),
                Attribute::optional("cookies", Kind::Block)
                    .max_items(1)
                    .with(ITEMS),
            ]),
        Attribute::computed("etag", Kind::String),
        Attribute::required("headers_config", Kind::Block)
            .max_items(1)
            .with(&[
                Attribute::optional("header_behavior", Kind::String),
                Attribute::optional("headers", Kind::Block)
                    .max_items(1)
                    .with(ITEMS),
            ]),
        Attribute::required("name", Kind::String),
        Attribute::required("query_strings_config", Kind::Block)
            .max_items(1)
            .with(&[
                Attribute::required("query_string_behavior", Kind::String),
                Attribute::optional("query_strings", Kind::Block)
                    .max_items(1)
                    .with(ITEMS),
            ]),
    ],
};

wire_enum! {
    CookieBehavior => OriginRequestPolicyCookieBehavior {
        None = "none",
        Whitelist = "whitelist",
        All = "all",
        AllExcept = "allExcept",
    }
}

wire_enum! {
    HeaderBehavior => OriginRequestPolicyHeaderBehavior {
        None = "none",
        Whitelist = "whitelist",
        AllViewer = "allViewer",
        AllViewerAndWhitelistCloudFront = "allViewerAndWhitelistCloudFront",
        AllExcept = "allExcept",
    }
}

wire_enum! {
    QueryStringBehavior => OriginRequestPolicyQueryStringBehavior {
        None = "none",
        Whitelist = "whitelist",
        All = "all",
        AllExcept = "allExcept",
    }
}

/// An origin-request policy definition.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OriginRequestPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub cookies_config: CookiesConfig<CookieBehavior>,
    pub headers_config: HeadersConfig<HeaderBehavior>,
    pub name: String,
    pub query_strings_config: QueryStringsConfig<QueryStringBehavior>,
}

impl HasDependencies for OriginRequestPolicy {}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RemoteOriginRequestPolicy {
    pub id: String,
    pub etag: String,
    pub config: OriginRequestPolicy,
}

impl OriginRequestPolicy {
    pub fn expand(&self) -> Result<OriginRequestPolicyConfig, Error> {
        let cookies_config = OriginRequestPolicyCookiesConfig::builder()
            .cookie_behavior(self.cookies_config.cookie_behavior.into())
            .set_cookies(policy::expand_cookie_names(
                self.cookies_config.cookies.as_ref(),
            )?)
            .build()
            .context(BuildSnafu {
                what: "OriginRequestPolicyCookiesConfig",
            })?;
        let headers_config = OriginRequestPolicyHeadersConfig::builder()
            .header_behavior(
                self.headers_config
                    .header_behavior
                    .unwrap_or(HeaderBehavior::None)
                    .into(),
            )
            .set_headers(policy::expand_headers(self.headers_config.headers.as_ref())?)
            .build()
            .context(BuildSnafu {
                what: "OriginRequestPolicyHeadersConfig",
            })?;
        let query_strings_config = OriginRequestPolicyQueryStringsConfig::builder()
            .query_string_behavior(self.query_strings_config.query_string_behavior.into())
            .set_query_strings(policy::expand_query_string_names(
                self.query_strings_config.query_strings.as_ref(),
            )?)
            .build()
            .context(BuildSnafu {
                what: "OriginRequestPolicyQueryStringsConfig",
            })?;

        OriginRequestPolicyConfig::builder()
            .set_comment(self.comment.clone())
            .name(&self.name)
            .cookies_config(cookies_config)
            .headers_config(headers_config)
            .query_strings_config(query_strings_config)
            .build()
            .context(BuildSnafu {
                what: "OriginRequestPolicyConfig",
            })
    }

    pub fn flatten(config: &OriginRequestPolicyConfig) -> Result<Self, Error> {
        const WHAT: &str = "OriginRequestPolicyConfig";
        let cookies = config.cookies_config().context(IncompleteSnafu {
            what: WHAT,
            field: "CookiesConfig",
        })?;
        let headers = config.headers_config().context(IncompleteSnafu {
            what: WHAT,
            field: "HeadersConfig",
        })?;
        let query_strings = config.query_strings_config().context(IncompleteSnafu {
            what: WHAT,
            field: "QueryStringsConfig",
        })?;
        Ok(Self {
            comment: config.comment().map(str::to_owned),
            cookies_config: CookiesConfig {
                cookie_behavior: cookies.cookie_behavior().try_into()?,
                cookies: policy::flatten_cookie_names(cookies.cookies()),
            },
            headers_config: HeadersConfig {
                header_behavior: Some(headers.header_behavior().try_into()?),
                headers: policy::flatten_headers(headers.headers()),
            },
            name: config.name().to_owned(),
            query_strings_config: QueryStringsConfig {
                query_string_behavior: query_strings.query_string_behavior().try_into()?,
                query_strings: policy::flatten_query_string_names(query_strings.query_strings()),
            },
        })
    }

    pub fn normalized(&self) -> Result<Self, Error> {
        Self::flatten(&self.expand()?)
    }

    async fn get(
        &self,
        provider: &CloudFront,
        id: &str,
    ) -> Result<Option<RemoteOriginRequestPolicy>, Error> {
        Ok(
            match provider.api().get_origin_request_policy(id).await.found()? {
                Some(policy) => Some(RemoteOriginRequestPolicy {
                    config: Self::flatten(&policy.value)?,
                    id: policy.id,
                    etag: policy.etag,
                }),
                None => None,
            },
        )
    }
}

impl Resource for OriginRequestPolicy {
    type Provider = CloudFront;
    type Error = Error;
    type Output = RemoteOriginRequestPolicy;

    fn remote_id(output: &Self::Output) -> String {
        output.id.clone()
    }

    fn validate(&self) -> Result<(), Self::Error> {
        super::validate_name("name", &self.name, 128)?;
        self.expand().map(|_| ())
    }

    fn has_drifted(&self, remote: &Self::Output) -> bool {
        match self.normalized() {
            Ok(config) => config != remote.config,
            Err(_) => true,
        }
    }

    async fn create(&self, provider: &Self::Provider) -> Result<Self::Output, Self::Error> {
        let created = provider
            .api()
            .create_origin_request_policy(self.expand()?)
            .await?;
        log::info!(
            "  created origin request policy '{}' ({})",
            self.name,
            created.id
        );
        self.get(provider, &created.id)
            .await?
            .context(IncompleteSnafu {
                what: "CreateOriginRequestPolicy",
                field: "OriginRequestPolicy",
            })
    }

    async fn read(
        &self,
        provider: &Self::Provider,
        id: &str,
    ) -> Result<Option<Self::Output>, Self::Error> {
        let policy = self.get(provider, id).await?;
        if policy.is_none() {
            log::warn!("CloudFront Origin Request Policy ({id}) not found");
        }
        Ok(policy)
    }

    async fn update(
        &self,
        provider: &Self::Provider,
        _previous_local: &Self,
        previous_remote: &Self::Output,
    ) -> Result<Self::Output, Self::Error> {
        provider
            .api()
            .update_origin_request_policy(
                &previous_remote.id,
                &previous_remote.etag,
                self.expand()?,
            )
            .await?;
        self.get(provider, &previous_remote.id)
            .await?
            .context(IncompleteSnafu {
                what: "UpdateOriginRequestPolicy",
                field: "OriginRequestPolicy",
            })
    }

    async fn delete(
        &self,
        provider: &Self::Provider,
        previous_remote: &Self::Output,
    ) -> Result<(), Self::Error> {
        let deleted = provider
            .api()
            .delete_origin_request_policy(&previous_remote.id, &previous_remote.etag)
            .await
            .found()?;
        if deleted.is_none() {
            log::warn!(
                "  origin request policy {} was already deleted",
                previous_remote.id
            );
        }
        Ok(())
    }
}
