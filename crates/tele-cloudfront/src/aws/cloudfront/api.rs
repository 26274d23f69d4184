//! The typed client interface to the CloudFront API.
//!
//! Every remote call made by the resources in this module goes through
//! [`CloudFrontApi`], which is implemented for the AWS SDK client.
use aws_sdk_cloudfront::{
    error::ProvideErrorMetadata,
    primitives::Blob,
    types::{
        CachePolicyConfig, FunctionConfig, FunctionStage, MonitoringSubscription,
        OriginRequestPolicyConfig, PublicKeyConfig, ResponseHeadersPolicyConfig,
    },
};
use snafu::prelude::*;

/// Errors returned by a [`CloudFrontApi`].
#[derive(Debug, Snafu)]
pub enum ApiError {
    #[snafu(display("{operation}: not found ({code}): {message}"))]
    NotFound {
        operation: &'static str,
        code: String,
        message: String,
    },

    #[snafu(display("{operation}: {code}: {message}"))]
    Service {
        operation: &'static str,
        code: String,
        message: String,
    },

    #[snafu(display("{operation}: response is missing '{field}'"))]
    EmptyResponse {
        operation: &'static str,
        field: &'static str,
    },
}

impl ApiError {
    /// Classify an SDK error by its service error code.
    pub fn from_sdk<E: ProvideErrorMetadata + core::fmt::Display>(
        operation: &'static str,
        err: E,
    ) -> Self {
        let code = err.code().unwrap_or("Unknown").to_owned();
        let message = err
            .message()
            .map(str::to_owned)
            .unwrap_or_else(|| err.to_string());
        if code.starts_with("NoSuch") || message.to_lowercase().contains("not found") {
            ApiError::NotFound {
                operation,
                code,
                message,
            }
        } else {
            ApiError::Service {
                operation,
                code,
                message,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}

/// Turns "not found" into `None`.
pub trait Found<T> {
    fn found(self) -> Result<Option<T>, ApiError>;
}

impl<T> Found<T> for Result<T, ApiError> {
    fn found(self) -> Result<Option<T>, ApiError> {
        match self {
            Ok(t) => Ok(Some(t)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// A configuration object along with its identifier and current ETag.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    pub id: String,
    pub etag: String,
    pub value: T,
}

/// A function as described at one of its stages.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDescription {
    pub name: String,
    pub arn: String,
    pub status: Option<String>,
    pub stage: FunctionStage,
    pub etag: String,
    pub config: FunctionConfig,
}

/// The CloudFront endpoints used by this crate's resources.
#[async_trait::async_trait]
pub trait CloudFrontApi: Send + Sync {
    async fn create_cache_policy(
        &self,
        config: CachePolicyConfig,
    ) -> Result<Versioned<CachePolicyConfig>, ApiError>;
    async fn get_cache_policy(&self, id: &str) -> Result<Versioned<CachePolicyConfig>, ApiError>;
    async fn update_cache_policy(
        &self,
        id: &str,
        if_match: &str,
        config: CachePolicyConfig,
    ) -> Result<Versioned<CachePolicyConfig>, ApiError>;
    async fn delete_cache_policy(&self, id: &str, if_match: &str) -> Result<(), ApiError>;

    async fn create_origin_request_policy(
        &self,
        config: OriginRequestPolicyConfig,
    ) -> Result<Versioned<OriginRequestPolicyConfig>, ApiError>;
    async fn get_origin_request_policy(
        &self,
        id: &str,
    ) -> Result<Versioned<OriginRequestPolicyConfig>, ApiError>;
    async fn update_origin_request_policy(
        &self,
        id: &str,
        if_match: &str,
        config: OriginRequestPolicyConfig,
    ) -> Result<Versioned<OriginRequestPolicyConfig>, ApiError>;
    async fn delete_origin_request_policy(&self, id: &str, if_match: &str)
        -> Result<(), ApiError>;

    async fn create_response_headers_policy(
        &self,
        config: ResponseHeadersPolicyConfig,
    ) -> Result<Versioned<ResponseHeadersPolicyConfig>, ApiError>;
    async fn get_response_headers_policy(
        &self,
        id: &str,
    ) -> Result<Versioned<ResponseHeadersPolicyConfig>, ApiError>;
    async fn update_response_headers_policy(
        &self,
        id: &str,
        if_match: &str,
        config: ResponseHeadersPolicyConfig,
    ) -> Result<Versioned<ResponseHeadersPolicyConfig>, ApiError>;
    async fn delete_response_headers_policy(
        &self,
        id: &str,
        if_match: &str,
    ) -> Result<(), ApiError>;

    async fn create_public_key(
        &self,
        config: PublicKeyConfig,
    ) -> Result<Versioned<PublicKeyConfig>, ApiError>;
    async fn get_public_key(&self, id: &str) -> Result<Versioned<PublicKeyConfig>, ApiError>;
    async fn update_public_key(
        &self,
        id: &str,
        if_match: &str,
        config: PublicKeyConfig,
    ) -> Result<Versioned<PublicKeyConfig>, ApiError>;
    async fn delete_public_key(&self, id: &str, if_match: &str) -> Result<(), ApiError>;

    async fn create_function(
        &self,
        name: &str,
        config: FunctionConfig,
        code: Vec<u8>,
    ) -> Result<FunctionDescription, ApiError>;
    async fn describe_function(
        &self,
        name: &str,
        stage: FunctionStage,
    ) -> Result<FunctionDescription, ApiError>;
    async fn get_function_code(&self, name: &str, stage: FunctionStage)
        -> Result<Vec<u8>, ApiError>;
    async fn update_function(
        &self,
        name: &str,
        if_match: &str,
        config: FunctionConfig,
        code: Vec<u8>,
    ) -> Result<FunctionDescription, ApiError>;
    async fn publish_function(
        &self,
        name: &str,
        if_match: &str,
    ) -> Result<FunctionDescription, ApiError>;
    async fn delete_function(&self, name: &str, if_match: &str) -> Result<(), ApiError>;

    async fn create_monitoring_subscription(
        &self,
        distribution_id: &str,
        subscription: MonitoringSubscription,
    ) -> Result<MonitoringSubscription, ApiError>;
    async fn get_monitoring_subscription(
        &self,
        distribution_id: &str,
    ) -> Result<MonitoringSubscription, ApiError>;
    async fn delete_monitoring_subscription(&self, distribution_id: &str)
        -> Result<(), ApiError>;
}

fn required<T>(
    operation: &'static str,
    field: &'static str,
    value: Option<T>,
) -> Result<T, ApiError> {
    value.context(EmptyResponseSnafu { operation, field })
}

fn versioned<T: Clone>(
    operation: &'static str,
    id: Option<&str>,
    etag: Option<&str>,
    value: Option<&T>,
) -> Result<Versioned<T>, ApiError> {
    Ok(Versioned {
        id: required(operation, "Id", id)?.to_owned(),
        etag: required(operation, "ETag", etag)?.to_owned(),
        value: required(operation, "Config", value)?.clone(),
    })
}

fn describe(
    operation: &'static str,
    summary: Option<&aws_sdk_cloudfront::types::FunctionSummary>,
    etag: Option<&str>,
) -> Result<FunctionDescription, ApiError> {
    let summary = required(operation, "FunctionSummary", summary)?;
    let metadata = required(operation, "FunctionMetadata", summary.function_metadata())?;
    Ok(FunctionDescription {
        name: summary.name().to_owned(),
        arn: metadata.function_arn().to_owned(),
        status: summary.status().map(str::to_owned),
        stage: metadata
            .stage()
            .cloned()
            .unwrap_or(FunctionStage::Development),
        etag: required(operation, "ETag", etag)?.to_owned(),
        config: required(operation, "FunctionConfig", summary.function_config())?.clone(),
    })
}

#[async_trait::async_trait]
impl CloudFrontApi for aws_sdk_cloudfront::Client {
    async fn create_cache_policy(
        &self,
        config: CachePolicyConfig,
    ) -> Result<Versioned<CachePolicyConfig>, ApiError> {
        const OP: &str = "CreateCachePolicy";
        let out = self
            .create_cache_policy()
            .cache_policy_config(config)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        let policy = required(OP, "CachePolicy", out.cache_policy())?;
        versioned(
            OP,
            Some(policy.id()),
            out.e_tag(),
            policy.cache_policy_config(),
        )
    }

    async fn get_cache_policy(&self, id: &str) -> Result<Versioned<CachePolicyConfig>, ApiError> {
        const OP: &str = "GetCachePolicy";
        let out = self
            .get_cache_policy()
            .id(id)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        let policy = required(OP, "CachePolicy", out.cache_policy())?;
        versioned(
            OP,
            Some(policy.id()),
            out.e_tag(),
            policy.cache_policy_config(),
        )
    }

    async fn update_cache_policy(
        &self,
        id: &str,
        if_match: &str,
        config: CachePolicyConfig,
    ) -> Result<Versioned<CachePolicyConfig>, ApiError> {
        const OP: &str = "UpdateCachePolicy";
        let out = self
            .update_cache_policy()
            .id(id)
            .if_match(if_match)
            .cache_policy_config(config)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        let policy = required(OP, "CachePolicy", out.cache_policy())?;
        versioned(
            OP,
            Some(policy.id()),
            out.e_tag(),
            policy.cache_policy_config(),
        )
    }

    async fn delete_cache_policy(&self, id: &str, if_match: &str) -> Result<(), ApiError> {
        self.delete_cache_policy()
            .id(id)
            .if_match(if_match)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("DeleteCachePolicy", e))?;
        Ok(())
    }

    async fn create_origin_request_policy(
        &self,
        config: OriginRequestPolicyConfig,
    ) -> Result<Versioned<OriginRequestPolicyConfig>, ApiError> {
        const OP: &str = "CreateOriginRequestPolicy";
        let out = self
            .create_origin_request_policy()
            .origin_request_policy_config(config)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        let policy = required(OP, "OriginRequestPolicy", out.origin_request_policy())?;
        versioned(
            OP,
            Some(policy.id()),
            out.e_tag(),
            policy.origin_request_policy_config(),
        )
    }

    async fn get_origin_request_policy(
        &self,
        id: &str,
    ) -> Result<Versioned<OriginRequestPolicyConfig>, ApiError> {
        const OP: &str = "GetOriginRequestPolicy";
        let out = self
            .get_origin_request_policy()
            .id(id)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        let policy = required(OP, "OriginRequestPolicy", out.origin_request_policy())?;
        versioned(
            OP,
            Some(policy.id()),
            out.e_tag(),
            policy.origin_request_policy_config(),
        )
    }

    async fn update_origin_request_policy(
        &self,
        id: &str,
        if_match: &str,
        config: OriginRequestPolicyConfig,
    ) -> Result<Versioned<OriginRequestPolicyConfig>, ApiError> {
        const OP: &str = "UpdateOriginRequestPolicy";
        let out = self
            .update_origin_request_policy()
            .id(id)
            .if_match(if_match)
            .origin_request_policy_config(config)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        let policy = required(OP, "OriginRequestPolicy", out.origin_request_policy())?;
        versioned(
            OP,
            Some(policy.id()),
            out.e_tag(),
            policy.origin_request_policy_config(),
        )
    }

    async fn delete_origin_request_policy(
        &self,
        id: &str,
        if_match: &str,
    ) -> Result<(), ApiError> {
        self.delete_origin_request_policy()
            .id(id)
            .if_match(if_match)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("DeleteOriginRequestPolicy", e))?;
        Ok(())
    }

    async fn create_response_headers_policy(
        &self,
        config: ResponseHeadersPolicyConfig,
    ) -> Result<Versioned<ResponseHeadersPolicyConfig>, ApiError> {
        const OP: &str = "CreateResponseHeadersPolicy";
        let out = self
            .create_response_headers_policy()
            .response_headers_policy_config(config)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        let policy = required(OP, "ResponseHeadersPolicy", out.response_headers_policy())?;
        versioned(
            OP,
            Some(policy.id()),
            out.e_tag(),
            policy.response_headers_policy_config(),
        )
    }

    async fn get_response_headers_policy(
        &self,
        id: &str,
    ) -> Result<Versioned<ResponseHeadersPolicyConfig>, ApiError> {
        const OP: &str = "GetResponseHeadersPolicy";
        let out = self
            .get_response_headers_policy()
            .id(id)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        let policy = required(OP, "ResponseHeadersPolicy", out.response_headers_policy())?;
        versioned(
            OP,
            Some(policy.id()),
            out.e_tag(),
            policy.response_headers_policy_config(),
        )
    }

    async fn update_response_headers_policy(
        &self,
        id: &str,
        if_match: &str,
        config: ResponseHeadersPolicyConfig,
    ) -> Result<Versioned<ResponseHeadersPolicyConfig>, ApiError> {
        const OP: &str = "UpdateResponseHeadersPolicy";
        let out = self
            .update_response_headers_policy()
            .id(id)
            .if_match(if_match)
            .response_headers_policy_config(config)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        let policy = required(OP, "ResponseHeadersPolicy", out.response_headers_policy())?;
        versioned(
            OP,
            Some(policy.id()),
            out.e_tag(),
            policy.response_headers_policy_config(),
        )
    }

    async fn delete_response_headers_policy(
        &self,
        id: &str,
        if_match: &str,
    ) -> Result<(), ApiError> {
        self.delete_response_headers_policy()
            .id(id)
            .if_match(if_match)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("DeleteResponseHeadersPolicy", e))?;
        Ok(())
    }

    async fn create_public_key(
        &self,
        config: PublicKeyConfig,
    ) -> Result<Versioned<PublicKeyConfig>, ApiError> {
        const OP: &str = "CreatePublicKey";
        let out = self
            .create_public_key()
            .public_key_config(config)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        let key = required(OP, "PublicKey", out.public_key())?;
        versioned(OP, Some(key.id()), out.e_tag(), key.public_key_config())
    }

    async fn get_public_key(&self, id: &str) -> Result<Versioned<PublicKeyConfig>, ApiError> {
        const OP: &str = "GetPublicKey";
        let out = self
            .get_public_key()
            .id(id)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        let key = required(OP, "PublicKey", out.public_key())?;
        versioned(OP, Some(key.id()), out.e_tag(), key.public_key_config())
    }

    async fn update_public_key(
        &self,
        id: &str,
        if_match: &str,
        config: PublicKeyConfig,
    ) -> Result<Versioned<PublicKeyConfig>, ApiError> {
        const OP: &str = "UpdatePublicKey";
        let out = self
            .update_public_key()
            .id(id)
            .if_match(if_match)
            .public_key_config(config)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        let key = required(OP, "PublicKey", out.public_key())?;
        versioned(OP, Some(key.id()), out.e_tag(), key.public_key_config())
    }

    async fn delete_public_key(&self, id: &str, if_match: &str) -> Result<(), ApiError> {
        self.delete_public_key()
            .id(id)
            .if_match(if_match)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("DeletePublicKey", e))?;
        Ok(())
    }

    async fn create_function(
        &self,
        name: &str,
        config: FunctionConfig,
        code: Vec<u8>,
    ) -> Result<FunctionDescription, ApiError> {
        const OP: &str = "CreateFunction";
        let out = self
            .create_function()
            .name(name)
            .function_config(config)
            .function_code(Blob::new(code))
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        describe(OP, out.function_summary(), out.e_tag())
    }

    async fn describe_function(
        &self,
        name: &str,
        stage: FunctionStage,
    ) -> Result<FunctionDescription, ApiError> {
        const OP: &str = "DescribeFunction";
        let out = self
            .describe_function()
            .name(name)
            .stage(stage)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        describe(OP, out.function_summary(), out.e_tag())
    }

    async fn get_function_code(
        &self,
        name: &str,
        stage: FunctionStage,
    ) -> Result<Vec<u8>, ApiError> {
        const OP: &str = "GetFunction";
        let out = self
            .get_function()
            .name(name)
            .stage(stage)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        let code = required(OP, "FunctionCode", out.function_code())?;
        Ok(code.as_ref().to_vec())
    }

    async fn update_function(
        &self,
        name: &str,
        if_match: &str,
        config: FunctionConfig,
        code: Vec<u8>,
    ) -> Result<FunctionDescription, ApiError> {
        const OP: &str = "UpdateFunction";
        let out = self
            .update_function()
            .name(name)
            .if_match(if_match)
            .function_config(config)
            .function_code(Blob::new(code))
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        describe(OP, out.function_summary(), out.e_tag())
    }

    async fn publish_function(
        &self,
        name: &str,
        if_match: &str,
    ) -> Result<FunctionDescription, ApiError> {
        const OP: &str = "PublishFunction";
        let out = self
            .publish_function()
            .name(name)
            .if_match(if_match)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        // Publishing does not return an ETag, the LIVE stage is read afterwards.
        describe(OP, out.function_summary(), Some(""))
    }

    async fn delete_function(&self, name: &str, if_match: &str) -> Result<(), ApiError> {
        self.delete_function()
            .name(name)
            .if_match(if_match)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("DeleteFunction", e))?;
        Ok(())
    }

    async fn create_monitoring_subscription(
        &self,
        distribution_id: &str,
        subscription: MonitoringSubscription,
    ) -> Result<MonitoringSubscription, ApiError> {
        const OP: &str = "CreateMonitoringSubscription";
        let out = self
            .create_monitoring_subscription()
            .distribution_id(distribution_id)
            .monitoring_subscription(subscription)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        required(OP, "MonitoringSubscription", out.monitoring_subscription()).cloned()
    }

    async fn get_monitoring_subscription(
        &self,
        distribution_id: &str,
    ) -> Result<MonitoringSubscription, ApiError> {
        const OP: &str = "GetMonitoringSubscription";
        let out = self
            .get_monitoring_subscription()
            .distribution_id(distribution_id)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk(OP, e))?;
        required(OP, "MonitoringSubscription", out.monitoring_subscription()).cloned()
    }

    async fn delete_monitoring_subscription(
        &self,
        distribution_id: &str,
    ) -> Result<(), ApiError> {
        self.delete_monitoring_subscription()
            .distribution_id(distribution_id)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("DeleteMonitoringSubscription", e))?;
        Ok(())
    }
}
