//! CloudFront cache policies.
//!
//! A cache policy decides which values (cookies, headers, query strings) are
//! part of the cache key, and how long objects stay cached.
use aws_sdk_cloudfront::types::{
    CachePolicyConfig, CachePolicyCookieBehavior, CachePolicyCookiesConfig,
    CachePolicyHeaderBehavior, CachePolicyHeadersConfig, CachePolicyQueryStringBehavior,
    CachePolicyQueryStringsConfig, ParametersInCacheKeyAndForwardedToOrigin,
};
use snafu::prelude::*;

use super::{
    api::Found,
    policy::{self, CookiesConfig, HeadersConfig, QueryStringsConfig},
    schema::{Attribute, Kind, Schema},
    BuildSnafu, CloudFront, Error, IncompleteSnafu,
};
use crate::{HasDependencies, Resource};

pub const DEFAULT_TTL: i64 = 86400;
pub const MAX_TTL: i64 = 31536000;

const ITEMS: &[Attribute] = &[Attribute::optional("items", Kind::StringSet)];

pub const SCHEMA: Schema = Schema {
    type_name: "aws_cloudfront_cache_policy",
    attributes: &[
        Attribute::optional("comment", Kind::String),
        Attribute::optional("default_ttl", Kind::Int).default("86400"),
        Attribute::computed("etag", Kind::String),
        Attribute::optional("max_ttl", Kind::Int).default("31536000"),
        Attribute::optional("min_ttl", Kind::Int).default("0"),
        Attribute::required("name", Kind::String),
        Attribute::required("parameters_in_cache_key_and_forwarded_to_origin", Kind::Block)
            .max_items(1)
            .with(&[
                Attribute::required("cookies_config", Kind::Block)
                    .max_items(1)
                    .with(&[
                        Attribute::required("cookie_behavior", Kind::String),
                        Attribute::optional("cookies", Kind::Block)
                            .max_items(1)
                            .with(ITEMS),
                    ]),
                Attribute::optional("enable_accept_encoding_brotli", Kind::Bool),
                Attribute::optional("enable_accept_encoding_gzip", Kind::Bool),
                Attribute::required("headers_config", Kind::Block)
                    .max_items(1)
                    .with(&[
                        Attribute::optional("header_behavior", Kind::String),
                        Attribute::optional("headers", Kind::Block)
                            .max_items(1)
                            .with(ITEMS),
                    ]),
                Attribute::required("query_strings_config", Kind::Block)
                    .max_items(1)
                    .with(&[
                        Attribute::required("query_string_behavior", Kind::String),
                        Attribute::optional("query_strings", Kind::Block)
                            .max_items(1)
                            .with(ITEMS),
                    ]),
            ]),
    ],
};

wire_enum! {
    CookieBehavior => CachePolicyCookieBehavior {
        None = "none",
        Whitelist = "whitelist",
        AllExcept = "allExcept",
        All = "all",
    }
}

wire_enum! {
    HeaderBehavior => CachePolicyHeaderBehavior {
        None = "none",
        Whitelist = "whitelist",
    }
}

wire_enum! {
    QueryStringBehavior => CachePolicyQueryStringBehavior {
        None = "none",
        Whitelist = "whitelist",
        AllExcept = "allExcept",
        All = "all",
    }
}

fn default_ttl() -> i64 {
    DEFAULT_TTL
}

fn max_ttl() -> i64 {
    MAX_TTL
}

/// A cache policy definition.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CachePolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default = "default_ttl")]
    pub default_ttl: i64,
    #[serde(default = "max_ttl")]
    pub max_ttl: i64,
    #[serde(default)]
    pub min_ttl: i64,
    pub name: String,
    pub parameters_in_cache_key_and_forwarded_to_origin: ParametersInCacheKey,
}

impl HasDependencies for CachePolicy {}

/// The `parameters_in_cache_key_and_forwarded_to_origin` block.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParametersInCacheKey {
    pub cookies_config: CookiesConfig<CookieBehavior>,
    #[serde(default)]
    pub enable_accept_encoding_brotli: bool,
    #[serde(default)]
    pub enable_accept_encoding_gzip: bool,
    pub headers_config: HeadersConfig<HeaderBehavior>,
    pub query_strings_config: QueryStringsConfig<QueryStringBehavior>,
}

/// The cache policy as it exists in CloudFront.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RemoteCachePolicy {
    pub id: String,
    pub etag: String,
    pub config: CachePolicy,
}

impl CachePolicy {
    /// A policy with the given name that caches on nothing but the URL.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            comment: None,
            default_ttl: DEFAULT_TTL,
            max_ttl: MAX_TTL,
            min_ttl: 0,
            name: name.into(),
            parameters_in_cache_key_and_forwarded_to_origin: ParametersInCacheKey {
                cookies_config: CookiesConfig {
                    cookie_behavior: CookieBehavior::None,
                    cookies: None,
                },
                enable_accept_encoding_brotli: false,
                enable_accept_encoding_gzip: false,
                headers_config: HeadersConfig {
                    header_behavior: None,
                    headers: None,
                },
                query_strings_config: QueryStringsConfig {
                    query_string_behavior: QueryStringBehavior::None,
                    query_strings: None,
                },
            },
        }
    }

    pub fn expand(&self) -> Result<CachePolicyConfig, Error> {
        let params = &self.parameters_in_cache_key_and_forwarded_to_origin;
        let cookies_config = CachePolicyCookiesConfig::builder()
            .cookie_behavior(params.cookies_config.cookie_behavior.into())
            .set_cookies(policy::expand_cookie_names(
                params.cookies_config.cookies.as_ref(),
            )?)
            .build()
            .context(BuildSnafu {
                what: "CachePolicyCookiesConfig",
            })?;
        let headers_config = CachePolicyHeadersConfig::builder()
            .header_behavior(
                params
                    .headers_config
                    .header_behavior
                    .unwrap_or(HeaderBehavior::None)
                    .into(),
            )
            .set_headers(policy::expand_headers(
                params.headers_config.headers.as_ref(),
            )?)
            .build()
            .context(BuildSnafu {
                what: "CachePolicyHeadersConfig",
            })?;
        let query_strings_config = CachePolicyQueryStringsConfig::builder()
            .query_string_behavior(params.query_strings_config.query_string_behavior.into())
            .set_query_strings(policy::expand_query_string_names(
                params.query_strings_config.query_strings.as_ref(),
            )?)
            .build()
            .context(BuildSnafu {
                what: "CachePolicyQueryStringsConfig",
            })?;
        let parameters = ParametersInCacheKeyAndForwardedToOrigin::builder()
            .cookies_config(cookies_config)
            .enable_accept_encoding_brotli(params.enable_accept_encoding_brotli)
            .enable_accept_encoding_gzip(params.enable_accept_encoding_gzip)
            .headers_config(headers_config)
            .query_strings_config(query_strings_config)
            .build()
            .context(BuildSnafu {
                what: "ParametersInCacheKeyAndForwardedToOrigin",
            })?;

        CachePolicyConfig::builder()
            .set_comment(self.comment.clone())
            .default_ttl(self.default_ttl)
            .max_ttl(self.max_ttl)
            .min_ttl(self.min_ttl)
            .name(&self.name)
            .parameters_in_cache_key_and_forwarded_to_origin(parameters)
            .build()
            .context(BuildSnafu {
                what: "CachePolicyConfig",
            })
    }

    pub fn flatten(config: &CachePolicyConfig) -> Result<Self, Error> {
        const WHAT: &str = "ParametersInCacheKeyAndForwardedToOrigin";
        let params = config
            .parameters_in_cache_key_and_forwarded_to_origin()
            .context(IncompleteSnafu {
                what: "CachePolicyConfig",
                field: WHAT,
            })?;
        let cookies = params.cookies_config().context(IncompleteSnafu {
            what: WHAT,
            field: "CookiesConfig",
        })?;
        let headers = params.headers_config().context(IncompleteSnafu {
            what: WHAT,
            field: "HeadersConfig",
        })?;
        let query_strings = params.query_strings_config().context(IncompleteSnafu {
            what: WHAT,
            field: "QueryStringsConfig",
        })?;

        Ok(Self {
            comment: config.comment().map(str::to_owned),
            default_ttl: config.default_ttl().unwrap_or(DEFAULT_TTL),
            max_ttl: config.max_ttl().unwrap_or(MAX_TTL),
            min_ttl: config.min_ttl(),
            name: config.name().to_owned(),
            parameters_in_cache_key_and_forwarded_to_origin: ParametersInCacheKey {
                cookies_config: CookiesConfig {
                    cookie_behavior: cookies.cookie_behavior().try_into()?,
                    cookies: policy::flatten_cookie_names(cookies.cookies()),
                },
                enable_accept_encoding_brotli: params
                    .enable_accept_encoding_brotli()
                    .unwrap_or_default(),
                enable_accept_encoding_gzip: params.enable_accept_encoding_gzip(),
                headers_config: HeadersConfig {
                    header_behavior: Some(headers.header_behavior().try_into()?),
                    headers: policy::flatten_headers(headers.headers()),
                },
                query_strings_config: QueryStringsConfig {
                    query_string_behavior: query_strings.query_string_behavior().try_into()?,
                    query_strings: policy::flatten_query_string_names(
                        query_strings.query_strings(),
                    ),
                },
            },
        })
    }

    /// This definition as CloudFront would report it back.
    pub fn normalized(&self) -> Result<Self, Error> {
        Self::flatten(&self.expand()?)
    }

    async fn get(&self, provider: &CloudFront, id: &str) -> Result<Option<RemoteCachePolicy>, Error> {
        let Some(policy) = provider.api().get_cache_policy(id).await.found()? else {
            return Ok(None);
        };
        Ok(Some(RemoteCachePolicy {
            config: Self::flatten(&policy.value)?,
            id: policy.id,
            etag: policy.etag,
        }))
    }
}

impl Resource for CachePolicy {
    type Provider = CloudFront;
    type Error = Error;
    type Output = RemoteCachePolicy;

    fn remote_id(output: &Self::Output) -> String {
        output.id.clone()
    }

    fn validate(&self) -> Result<(), Self::Error> {
        super::validate_name("name", &self.name, 128)?;
        self.expand().map(|_| ())
    }

    fn has_drifted(&self, remote: &Self::Output) -> bool {
        self.normalized()
            .map(|config| config != remote.config)
            .unwrap_or(true)
    }

    async fn create(&self, provider: &Self::Provider) -> Result<Self::Output, Self::Error> {
        let created = provider.api().create_cache_policy(self.expand()?).await?;
        log::info!("  created cache policy '{}' ({})", self.name, created.id);
        self.get(provider, &created.id)
            .await?
            .context(IncompleteSnafu {
                what: "CreateCachePolicy",
                field: "CachePolicy",
            })
    }

    async fn read(
        &self,
        provider: &Self::Provider,
        id: &str,
    ) -> Result<Option<Self::Output>, Self::Error> {
        let policy = self.get(provider, id).await?;
        if policy.is_none() {
            log::warn!("CloudFront Cache Policy ({id}) not found");
        }
        Ok(policy)
    }

    async fn update(
        &self,
        provider: &Self::Provider,
        _previous_local: &Self,
        previous_remote: &Self::Output,
    ) -> Result<Self::Output, Self::Error> {
        let updated = provider
            .api()
            .update_cache_policy(&previous_remote.id, &previous_remote.etag, self.expand()?)
            .await?;
        self.get(provider, &updated.id)
            .await?
            .context(IncompleteSnafu {
                what: "UpdateCachePolicy",
                field: "CachePolicy",
            })
    }

    async fn delete(
        &self,
        provider: &Self::Provider,
        previous_remote: &Self::Output,
    ) -> Result<(), Self::Error> {
        let RemoteCachePolicy { id, etag, .. } = previous_remote;
        if provider
            .api()
            .delete_cache_policy(id, etag)
            .await
            .found()?
            .is_none()
        {
            log::warn!("  cache policy {id} was already deleted");
        }
        Ok(())
    }
}
