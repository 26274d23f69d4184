//! CloudFront response-headers policies.
//!
//! A policy adds, removes or overrides headers in the responses CloudFront
//! sends to viewers. It is made of optional blocks, at least one of which
//! must be given.
use aws_sdk_cloudfront::types::{
    FrameOptionsList, ReferrerPolicyList, ResponseHeadersPolicyAccessControlAllowHeaders,
    ResponseHeadersPolicyAccessControlAllowMethods,
    ResponseHeadersPolicyAccessControlAllowMethodsValues,
    ResponseHeadersPolicyAccessControlAllowOrigins,
    ResponseHeadersPolicyAccessControlExposeHeaders, ResponseHeadersPolicyConfig,
    ResponseHeadersPolicyContentSecurityPolicy, ResponseHeadersPolicyContentTypeOptions,
    ResponseHeadersPolicyCorsConfig, ResponseHeadersPolicyCustomHeader,
    ResponseHeadersPolicyCustomHeadersConfig, ResponseHeadersPolicyFrameOptions,
    ResponseHeadersPolicyReferrerPolicy, ResponseHeadersPolicyRemoveHeader,
    ResponseHeadersPolicyRemoveHeadersConfig, ResponseHeadersPolicySecurityHeadersConfig,
    ResponseHeadersPolicyServerTimingHeadersConfig, ResponseHeadersPolicyStrictTransportSecurity,
    ResponseHeadersPolicyXssProtection,
};
use snafu::prelude::*;

use super::{
    api::Found,
    schema::{Attribute, Kind, Schema},
    BuildSnafu, CloudFront, Error, IncompleteSnafu, InvalidSnafu, Items,
};
use crate::{HasDependencies, Resource};

const AT_LEAST_ONE_OF: &[&str] = &[
    "cors_config",
    "custom_headers_config",
    "remove_headers_config",
    "security_headers_config",
    "server_timing_headers_config",
];

const STRING_ITEMS: &[Attribute] = &[Attribute::optional("items", Kind::StringSet)];

const CORS: &[Attribute] = &[
    Attribute::required("access_control_allow_credentials", Kind::Bool),
    Attribute::required("access_control_allow_headers", Kind::Block)
        .max_items(1)
        .with(STRING_ITEMS),
    Attribute::required("access_control_allow_methods", Kind::Block)
        .max_items(1)
        .with(STRING_ITEMS),
    Attribute::required("access_control_allow_origins", Kind::Block)
        .max_items(1)
        .with(STRING_ITEMS),
    Attribute::optional("access_control_expose_headers", Kind::Block)
        .max_items(1)
        .with(STRING_ITEMS),
    Attribute::optional("access_control_max_age_sec", Kind::Int),
    Attribute::required("origin_override", Kind::Bool),
];

const CUSTOM_HEADER: &[Attribute] = &[
    Attribute::required("header", Kind::String),
    Attribute::required("override", Kind::Bool),
    Attribute::required("value", Kind::String),
];

const SECURITY_HEADERS: &[Attribute] = &[
    Attribute::optional("content_security_policy", Kind::Block)
        .max_items(1)
        .with(&[
            Attribute::required("content_security_policy", Kind::String),
            Attribute::required("override", Kind::Bool),
        ]),
    Attribute::optional("content_type_options", Kind::Block)
        .max_items(1)
        .with(&[Attribute::required("override", Kind::Bool)]),
    Attribute::optional("frame_options", Kind::Block)
        .max_items(1)
        .with(&[
            Attribute::required("frame_option", Kind::String),
            Attribute::required("override", Kind::Bool),
        ]),
    Attribute::optional("referrer_policy", Kind::Block)
        .max_items(1)
        .with(&[
            Attribute::required("override", Kind::Bool),
            Attribute::required("referrer_policy", Kind::String),
        ]),
    Attribute::optional("strict_transport_security", Kind::Block)
        .max_items(1)
        .with(&[
            Attribute::required("access_control_max_age_sec", Kind::Int),
            Attribute::optional("include_subdomains", Kind::Bool),
            Attribute::required("override", Kind::Bool),
            Attribute::optional("preload", Kind::Bool),
        ]),
    Attribute::optional("xss_protection", Kind::Block)
        .max_items(1)
        .with(&[
            Attribute::optional("mode_block", Kind::Bool),
            Attribute::required("override", Kind::Bool),
            Attribute::required("protection", Kind::Bool),
            Attribute::optional("report_uri", Kind::String),
        ]),
];

pub const SCHEMA: Schema = Schema {
    type_name: "aws_cloudfront_response_headers_policy",
    attributes: &[
        Attribute::optional("comment", Kind::String),
        Attribute::optional("cors_config", Kind::Block)
            .max_items(1)
            .with(CORS),
        Attribute::optional("custom_headers_config", Kind::Block)
            .max_items(1)
            .with(&[Attribute::optional("items", Kind::BlockSet).with(CUSTOM_HEADER)]),
        Attribute::computed("etag", Kind::String),
        Attribute::required("name", Kind::String),
        Attribute::optional("remove_headers_config", Kind::Block)
            .max_items(1)
            .with(&[Attribute::optional("items", Kind::BlockSet)
                .with(&[Attribute::required("header", Kind::String)])]),
        Attribute::optional("security_headers_config", Kind::Block)
            .max_items(1)
            .with(SECURITY_HEADERS),
        Attribute::optional("server_timing_headers_config", Kind::Block)
            .max_items(1)
            .with(&[
                Attribute::required("enabled", Kind::Bool),
                Attribute::required("sampling_rate", Kind::Float),
            ]),
    ],
};

wire_enum! {
    AllowMethod => ResponseHeadersPolicyAccessControlAllowMethodsValues {
        Get = "GET",
        Post = "POST",
        Options = "OPTIONS",
        Put = "PUT",
        Delete = "DELETE",
        Patch = "PATCH",
        Head = "HEAD",
        All = "ALL",
    }
}

wire_enum! {
    FrameOption => FrameOptionsList {
        Deny = "DENY",
        SameOrigin = "SAMEORIGIN",
    }
}

wire_enum! {
    ReferrerPolicyValue => ReferrerPolicyList {
        NoReferrer = "no-referrer",
        NoReferrerWhenDowngrade = "no-referrer-when-downgrade",
        Origin = "origin",
        OriginWhenCrossOrigin = "origin-when-cross-origin",
        SameOrigin = "same-origin",
        StrictOrigin = "strict-origin",
        StrictOriginWhenCrossOrigin = "strict-origin-when-cross-origin",
        UnsafeUrl = "unsafe-url",
    }
}

/// A response-headers policy definition.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResponseHeadersPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors_config: Option<CorsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_headers_config: Option<CustomHeadersConfig>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_headers_config: Option<RemoveHeadersConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_headers_config: Option<SecurityHeadersConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_timing_headers_config: Option<ServerTimingHeadersConfig>,
}

impl HasDependencies for ResponseHeadersPolicy {}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CorsConfig {
    pub access_control_allow_credentials: bool,
    pub access_control_allow_headers: Items<String>,
    pub access_control_allow_methods: Items<AllowMethod>,
    pub access_control_allow_origins: Items<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_control_expose_headers: Option<Items<String>>,
    /// Zero leaves the max age unset.
    #[serde(default)]
    pub access_control_max_age_sec: i32,
    pub origin_override: bool,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CustomHeadersConfig {
    #[serde(default)]
    pub items: Items<CustomHeader>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct CustomHeader {
    pub header: String,
    pub r#override: bool,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RemoveHeadersConfig {
    #[serde(default)]
    pub items: Items<RemoveHeader>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct RemoveHeader {
    pub header: String,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SecurityHeadersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_security_policy: Option<ContentSecurityPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type_options: Option<ContentTypeOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_options: Option<FrameOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_policy: Option<ReferrerPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_transport_security: Option<StrictTransportSecurity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xss_protection: Option<XssProtection>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ContentSecurityPolicy {
    pub content_security_policy: String,
    pub r#override: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ContentTypeOptions {
    pub r#override: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameOptions {
    pub frame_option: FrameOption,
    pub r#override: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReferrerPolicy {
    pub r#override: bool,
    pub referrer_policy: ReferrerPolicyValue,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StrictTransportSecurity {
    pub access_control_max_age_sec: i32,
    #[serde(default)]
    pub include_subdomains: bool,
    pub r#override: bool,
    #[serde(default)]
    pub preload: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct XssProtection {
    #[serde(default)]
    pub mode_block: bool,
    pub r#override: bool,
    pub protection: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_uri: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ServerTimingHeadersConfig {
    pub enabled: bool,
    /// Percentage of requests, from 0 to 100.
    pub sampling_rate: f64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RemoteResponseHeadersPolicy {
    pub id: String,
    pub etag: String,
    pub config: ResponseHeadersPolicy,
}

impl CorsConfig {
    fn expand(&self) -> Result<ResponseHeadersPolicyCorsConfig, Error> {
        let headers = &self.access_control_allow_headers;
        let methods = &self.access_control_allow_methods;
        let origins = &self.access_control_allow_origins;
        let expose_headers = Items::non_empty(self.access_control_expose_headers.as_ref())
            .map(|headers| {
                ResponseHeadersPolicyAccessControlExposeHeaders::builder()
                    .quantity(headers.quantity())
                    .set_items(Some(headers.to_vec()))
                    .build()
                    .context(BuildSnafu {
                        what: "ResponseHeadersPolicyAccessControlExposeHeaders",
                    })
            })
            .transpose()?;

        ResponseHeadersPolicyCorsConfig::builder()
            .access_control_allow_credentials(self.access_control_allow_credentials)
            .access_control_allow_headers(
                ResponseHeadersPolicyAccessControlAllowHeaders::builder()
                    .quantity(headers.quantity())
                    .set_items(Some(headers.to_vec()))
                    .build()
                    .context(BuildSnafu {
                        what: "ResponseHeadersPolicyAccessControlAllowHeaders",
                    })?,
            )
            .access_control_allow_methods(
                ResponseHeadersPolicyAccessControlAllowMethods::builder()
                    .quantity(methods.quantity())
                    .set_items(Some(methods.items.iter().map(|m| (*m).into()).collect()))
                    .build()
                    .context(BuildSnafu {
                        what: "ResponseHeadersPolicyAccessControlAllowMethods",
                    })?,
            )
            .access_control_allow_origins(
                ResponseHeadersPolicyAccessControlAllowOrigins::builder()
                    .quantity(origins.quantity())
                    .set_items(Some(origins.to_vec()))
                    .build()
                    .context(BuildSnafu {
                        what: "ResponseHeadersPolicyAccessControlAllowOrigins",
                    })?,
            )
            .set_access_control_expose_headers(expose_headers)
            .set_access_control_max_age_sec(
                (self.access_control_max_age_sec != 0).then_some(self.access_control_max_age_sec),
            )
            .origin_override(self.origin_override)
            .build()
            .context(BuildSnafu {
                what: "ResponseHeadersPolicyCorsConfig",
            })
    }

    fn flatten(cors: &ResponseHeadersPolicyCorsConfig) -> Result<Self, Error> {
        const WHAT: &str = "ResponseHeadersPolicyCorsConfig";
        let headers = cors.access_control_allow_headers().context(IncompleteSnafu {
            what: WHAT,
            field: "AccessControlAllowHeaders",
        })?;
        let methods = cors.access_control_allow_methods().context(IncompleteSnafu {
            what: WHAT,
            field: "AccessControlAllowMethods",
        })?;
        let origins = cors.access_control_allow_origins().context(IncompleteSnafu {
            what: WHAT,
            field: "AccessControlAllowOrigins",
        })?;
        Ok(Self {
            access_control_allow_credentials: cors.access_control_allow_credentials(),
            access_control_allow_headers: headers.items().iter().cloned().collect(),
            access_control_allow_methods: methods
                .items()
                .iter()
                .map(AllowMethod::try_from)
                .collect::<Result<_, _>>()?,
            access_control_allow_origins: origins.items().iter().cloned().collect(),
            access_control_expose_headers: cors
                .access_control_expose_headers()
                .and_then(|h| Items::flatten(h.items())),
            access_control_max_age_sec: cors.access_control_max_age_sec().unwrap_or_default(),
            origin_override: cors.origin_override(),
        })
    }
}

impl CustomHeadersConfig {
    fn expand(&self) -> Result<ResponseHeadersPolicyCustomHeadersConfig, Error> {
        let items = self
            .items
            .items
            .iter()
            .map(|h| {
                ResponseHeadersPolicyCustomHeader::builder()
                    .header(&h.header)
                    .r#override(h.r#override)
                    .value(&h.value)
                    .build()
                    .context(BuildSnafu {
                        what: "ResponseHeadersPolicyCustomHeader",
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        ResponseHeadersPolicyCustomHeadersConfig::builder()
            .quantity(self.items.quantity())
            .set_items((!items.is_empty()).then_some(items))
            .build()
            .context(BuildSnafu {
                what: "ResponseHeadersPolicyCustomHeadersConfig",
            })
    }

    fn flatten(config: &ResponseHeadersPolicyCustomHeadersConfig) -> Self {
        Self {
            items: config
                .items()
                .iter()
                .map(|h| CustomHeader {
                    header: h.header().to_owned(),
                    r#override: h.r#override(),
                    value: h.value().to_owned(),
                })
                .collect(),
        }
    }
}

impl RemoveHeadersConfig {
    fn expand(&self) -> Result<ResponseHeadersPolicyRemoveHeadersConfig, Error> {
        let items = self
            .items
            .items
            .iter()
            .map(|h| {
                ResponseHeadersPolicyRemoveHeader::builder()
                    .header(&h.header)
                    .build()
                    .context(BuildSnafu {
                        what: "ResponseHeadersPolicyRemoveHeader",
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        ResponseHeadersPolicyRemoveHeadersConfig::builder()
            .quantity(self.items.quantity())
            .set_items((!items.is_empty()).then_some(items))
            .build()
            .context(BuildSnafu {
                what: "ResponseHeadersPolicyRemoveHeadersConfig",
            })
    }

    fn flatten(config: &ResponseHeadersPolicyRemoveHeadersConfig) -> Self {
        Self {
            items: config
                .items()
                .iter()
                .map(|h| RemoveHeader {
                    header: h.header().to_owned(),
                })
                .collect(),
        }
    }
}

impl SecurityHeadersConfig {
    fn expand(&self) -> Result<ResponseHeadersPolicySecurityHeadersConfig, Error> {
        let content_security_policy = self
            .content_security_policy
            .as_ref()
            .map(|csp| {
                ResponseHeadersPolicyContentSecurityPolicy::builder()
                    .content_security_policy(&csp.content_security_policy)
                    .r#override(csp.r#override)
                    .build()
                    .context(BuildSnafu {
                        what: "ResponseHeadersPolicyContentSecurityPolicy",
                    })
            })
            .transpose()?;
        let content_type_options = self
            .content_type_options
            .as_ref()
            .map(|cto| {
                ResponseHeadersPolicyContentTypeOptions::builder()
                    .r#override(cto.r#override)
                    .build()
                    .context(BuildSnafu {
                        what: "ResponseHeadersPolicyContentTypeOptions",
                    })
            })
            .transpose()?;
        let frame_options = self
            .frame_options
            .as_ref()
            .map(|fo| {
                ResponseHeadersPolicyFrameOptions::builder()
                    .frame_option(fo.frame_option.into())
                    .r#override(fo.r#override)
                    .build()
                    .context(BuildSnafu {
                        what: "ResponseHeadersPolicyFrameOptions",
                    })
            })
            .transpose()?;
        let referrer_policy = self
            .referrer_policy
            .as_ref()
            .map(|rp| {
                ResponseHeadersPolicyReferrerPolicy::builder()
                    .r#override(rp.r#override)
                    .referrer_policy(rp.referrer_policy.into())
                    .build()
                    .context(BuildSnafu {
                        what: "ResponseHeadersPolicyReferrerPolicy",
                    })
            })
            .transpose()?;
        let strict_transport_security = self
            .strict_transport_security
            .as_ref()
            .map(|sts| {
                ResponseHeadersPolicyStrictTransportSecurity::builder()
                    .access_control_max_age_sec(sts.access_control_max_age_sec)
                    .include_subdomains(sts.include_subdomains)
                    .r#override(sts.r#override)
                    .preload(sts.preload)
                    .build()
                    .context(BuildSnafu {
                        what: "ResponseHeadersPolicyStrictTransportSecurity",
                    })
            })
            .transpose()?;
        let xss_protection = self
            .xss_protection
            .as_ref()
            .map(|xss| {
                ResponseHeadersPolicyXssProtection::builder()
                    .mode_block(xss.mode_block)
                    .r#override(xss.r#override)
                    .protection(xss.protection)
                    .set_report_uri(xss.report_uri.clone().filter(|uri| !uri.is_empty()))
                    .build()
                    .context(BuildSnafu {
                        what: "ResponseHeadersPolicyXssProtection",
                    })
            })
            .transpose()?;

        Ok(ResponseHeadersPolicySecurityHeadersConfig::builder()
            .set_content_security_policy(content_security_policy)
            .set_content_type_options(content_type_options)
            .set_frame_options(frame_options)
            .set_referrer_policy(referrer_policy)
            .set_strict_transport_security(strict_transport_security)
            .set_xss_protection(xss_protection)
            .build())
    }

    fn flatten(config: &ResponseHeadersPolicySecurityHeadersConfig) -> Result<Self, Error> {
        Ok(Self {
            content_security_policy: config.content_security_policy().map(|csp| {
                ContentSecurityPolicy {
                    content_security_policy: csp.content_security_policy().to_owned(),
                    r#override: csp.r#override(),
                }
            }),
            content_type_options: config.content_type_options().map(|cto| ContentTypeOptions {
                r#override: cto.r#override(),
            }),
            frame_options: config
                .frame_options()
                .map(|fo| {
                    Ok::<_, Error>(FrameOptions {
                        frame_option: fo.frame_option().try_into()?,
                        r#override: fo.r#override(),
                    })
                })
                .transpose()?,
            referrer_policy: config
                .referrer_policy()
                .map(|rp| {
                    Ok::<_, Error>(ReferrerPolicy {
                        r#override: rp.r#override(),
                        referrer_policy: rp.referrer_policy().try_into()?,
                    })
                })
                .transpose()?,
            strict_transport_security: config.strict_transport_security().map(|sts| {
                StrictTransportSecurity {
                    access_control_max_age_sec: sts.access_control_max_age_sec(),
                    include_subdomains: sts.include_subdomains().unwrap_or_default(),
                    r#override: sts.r#override(),
                    preload: sts.preload().unwrap_or_default(),
                }
            }),
            xss_protection: config.xss_protection().map(|xss| XssProtection {
                mode_block: xss.mode_block().unwrap_or_default(),
                r#override: xss.r#override(),
                protection: xss.protection(),
                report_uri: xss.report_uri().map(str::to_owned),
            }),
        })
    }
}

impl ServerTimingHeadersConfig {
    fn expand(&self) -> Result<ResponseHeadersPolicyServerTimingHeadersConfig, Error> {
        ResponseHeadersPolicyServerTimingHeadersConfig::builder()
            .enabled(self.enabled)
            .sampling_rate(self.sampling_rate)
            .build()
            .context(BuildSnafu {
                what: "ResponseHeadersPolicyServerTimingHeadersConfig",
            })
    }

    fn flatten(config: &ResponseHeadersPolicyServerTimingHeadersConfig) -> Self {
        Self {
            enabled: config.enabled(),
            sampling_rate: config.sampling_rate().unwrap_or_default(),
        }
    }
}

impl ResponseHeadersPolicy {
    pub fn expand(&self) -> Result<ResponseHeadersPolicyConfig, Error> {
        ResponseHeadersPolicyConfig::builder()
            .set_comment(self.comment.clone())
            .name(&self.name)
            .set_cors_config(self.cors_config.as_ref().map(CorsConfig::expand).transpose()?)
            .set_custom_headers_config(
                self.custom_headers_config
                    .as_ref()
                    .map(CustomHeadersConfig::expand)
                    .transpose()?,
            )
            .set_remove_headers_config(
                self.remove_headers_config
                    .as_ref()
                    .map(RemoveHeadersConfig::expand)
                    .transpose()?,
            )
            .set_security_headers_config(
                self.security_headers_config
                    .as_ref()
                    .map(SecurityHeadersConfig::expand)
                    .transpose()?,
            )
            .set_server_timing_headers_config(
                self.server_timing_headers_config
                    .as_ref()
                    .map(ServerTimingHeadersConfig::expand)
                    .transpose()?,
            )
            .build()
            .context(BuildSnafu {
                what: "ResponseHeadersPolicyConfig",
            })
    }

    pub fn flatten(config: &ResponseHeadersPolicyConfig) -> Result<Self, Error> {
        Ok(Self {
            comment: config.comment().map(str::to_owned),
            cors_config: config.cors_config().map(CorsConfig::flatten).transpose()?,
            custom_headers_config: config
                .custom_headers_config()
                .map(CustomHeadersConfig::flatten),
            name: config.name().to_owned(),
            remove_headers_config: config
                .remove_headers_config()
                .map(RemoveHeadersConfig::flatten),
            security_headers_config: config
                .security_headers_config()
                .map(SecurityHeadersConfig::flatten)
                .transpose()?,
            server_timing_headers_config: config
                .server_timing_headers_config()
                .map(ServerTimingHeadersConfig::flatten),
        })
    }

    pub fn normalized(&self) -> Result<Self, Error> {
        Self::flatten(&self.expand()?)
    }

    async fn get(
        &self,
        provider: &CloudFront,
        id: &str,
    ) -> Result<Option<RemoteResponseHeadersPolicy>, Error> {
        let Some(policy) = provider
            .api()
            .get_response_headers_policy(id)
            .await
            .found()?
        else {
            return Ok(None);
        };
        Ok(Some(RemoteResponseHeadersPolicy {
            config: Self::flatten(&policy.value)?,
            id: policy.id,
            etag: policy.etag,
        }))
    }
}

impl Resource for ResponseHeadersPolicy {
    type Provider = CloudFront;
    type Error = Error;
    type Output = RemoteResponseHeadersPolicy;

    fn remote_id(output: &Self::Output) -> String {
        output.id.clone()
    }

    fn validate(&self) -> Result<(), Self::Error> {
        super::validate_name("name", &self.name, 128)?;
        ensure!(
            self.cors_config.is_some()
                || self.custom_headers_config.is_some()
                || self.remove_headers_config.is_some()
                || self.security_headers_config.is_some()
                || self.server_timing_headers_config.is_some(),
            InvalidSnafu {
                attribute: "response_headers_policy",
                message: format!("one of {} must be specified", AT_LEAST_ONE_OF.join(", ")),
            }
        );
        if let Some(server_timing) = &self.server_timing_headers_config {
            ensure!(
                (0.0..=100.0).contains(&server_timing.sampling_rate),
                InvalidSnafu {
                    attribute: "server_timing_headers_config.sampling_rate",
                    message: format!(
                        "expected to be in the range (0.000000 - 100.000000), got {}",
                        server_timing.sampling_rate
                    ),
                }
            );
        }
        self.expand().map(|_| ())
    }

    fn has_drifted(&self, remote: &Self::Output) -> bool {
        self.normalized()
            .map(|config| config != remote.config)
            .unwrap_or(true)
    }

    async fn create(&self, provider: &Self::Provider) -> Result<Self::Output, Self::Error> {
        let created = provider
            .api()
            .create_response_headers_policy(self.expand()?)
            .await?;
        log::info!(
            "  created response headers policy '{}' ({})",
            self.name,
            created.id
        );
        self.get(provider, &created.id)
            .await?
            .context(IncompleteSnafu {
                what: "CreateResponseHeadersPolicy",
                field: "ResponseHeadersPolicy",
            })
    }

    async fn read(
        &self,
        provider: &Self::Provider,
        id: &str,
    ) -> Result<Option<Self::Output>, Self::Error> {
        let policy = self.get(provider, id).await?;
        if policy.is_none() {
            log::warn!("CloudFront Response Headers Policy ({id}) not found");
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
            .update_response_headers_policy(
                &previous_remote.id,
                &previous_remote.etag,
                self.expand()?,
            )
            .await?;
        self.get(provider, &previous_remote.id)
            .await?
            .context(IncompleteSnafu {
                what: "UpdateResponseHeadersPolicy",
                field: "ResponseHeadersPolicy",
            })
    }

    async fn delete(
        &self,
        provider: &Self::Provider,
        previous_remote: &Self::Output,
    ) -> Result<(), Self::Error> {
        let RemoteResponseHeadersPolicy { id, etag, .. } = previous_remote;
        if provider
            .api()
            .delete_response_headers_policy(id, etag)
            .await
            .found()?
            .is_none()
        {
            log::warn!("  response headers policy {id} was already deleted");
        }
        Ok(())
    }
}
