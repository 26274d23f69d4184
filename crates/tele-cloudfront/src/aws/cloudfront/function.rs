//! CloudFront Functions.
//!
//! A function is edited in its DEVELOPMENT stage and, when `publish` is set,
//! promoted to the LIVE stage after every create or update.
use aws_sdk_cloudfront::types::{FunctionConfig, FunctionRuntime, FunctionStage};
use snafu::prelude::*;

use super::{
    api::{FunctionDescription, Found},
    schema::{Attribute, Kind, Schema},
    BuildSnafu, CloudFront, Error, IncompleteSnafu, InvalidSnafu,
};
use crate::{utils::sha256_hex, HasDependencies, Resource};

pub const SCHEMA: Schema = Schema {
    type_name: "aws_cloudfront_function",
    attributes: &[
        Attribute::computed("arn", Kind::String),
        Attribute::required("code", Kind::String),
        Attribute::optional("comment", Kind::String),
        Attribute::computed("etag", Kind::String),
        Attribute::computed("live_stage_etag", Kind::String),
        Attribute::required("name", Kind::String).force_new(),
        Attribute::optional("publish", Kind::Bool).default("true"),
        Attribute::required("runtime", Kind::String),
        Attribute::computed("status", Kind::String),
    ],
};

wire_enum! {
    Runtime => FunctionRuntime {
        CloudfrontJs10 = "cloudfront-js-1.0",
        CloudfrontJs20 = "cloudfront-js-2.0",
    }
}

fn default_publish() -> bool {
    true
}

/// A CloudFront Function definition.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Function {
    pub code: String,
    #[serde(default)]
    pub comment: String,
    pub name: String,
    #[serde(default = "default_publish")]
    pub publish: bool,
    pub runtime: Runtime,
}

impl HasDependencies for Function {}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RemoteFunction {
    pub arn: String,
    /// Digest of the DEVELOPMENT stage code.
    pub code_sha256: String,
    pub comment: String,
    /// ETag of the DEVELOPMENT stage.
    pub etag: String,
    /// ETag of the LIVE stage, if the function was ever published.
    pub live_stage_etag: Option<String>,
    pub name: String,
    pub runtime: Runtime,
    pub status: Option<String>,
}

impl Function {
    pub fn expand(&self) -> Result<FunctionConfig, Error> {
        FunctionConfig::builder()
            .comment(&self.comment)
            .runtime(self.runtime.into())
            .build()
            .context(BuildSnafu {
                what: "FunctionConfig",
            })
    }

    fn code_changed(&self, previous: &Self) -> bool {
        self.code != previous.code
            || self.comment != previous.comment
            || self.runtime != previous.runtime
    }

    async fn publish_live(&self, provider: &CloudFront, etag: &str) -> Result<(), Error> {
        log::debug!("publishing CloudFront Function: {}", self.name);
        let published = provider.api().publish_function(&self.name, etag).await?;
        log::info!(
            "  published function '{}' ({})",
            published.name,
            published.status.as_deref().unwrap_or("unknown status")
        );
        Ok(())
    }

    async fn describe(
        &self,
        provider: &CloudFront,
        id: &str,
    ) -> Result<Option<RemoteFunction>, Error> {
        let api = provider.api();
        let Some(FunctionDescription {
            name,
            arn,
            status,
            etag,
            config,
            ..
        }) = api
            .describe_function(id, FunctionStage::Development)
            .await
            .found()?
        else {
            return Ok(None);
        };
        let code = api
            .get_function_code(&name, FunctionStage::Development)
            .await?;
        let live_stage_etag = api
            .describe_function(&name, FunctionStage::Live)
            .await
            .found()?
            .map(|live| live.etag);
        Ok(Some(RemoteFunction {
            arn,
            code_sha256: sha256_hex(code),
            comment: config.comment().to_owned(),
            etag,
            live_stage_etag,
            runtime: config.runtime().try_into()?,
            name,
            status,
        }))
    }
}

impl Resource for Function {
    type Provider = CloudFront;
    type Error = Error;
    type Output = RemoteFunction;

    fn remote_id(output: &Self::Output) -> String {
        output.name.clone()
    }

    fn validate(&self) -> Result<(), Self::Error> {
        super::validate_name("name", &self.name, 64)?;
        ensure!(
            !self.code.is_empty(),
            InvalidSnafu {
                attribute: "code",
                message: "must not be empty",
            }
        );
        Ok(())
    }

    fn should_replace(&self, previous: &Self) -> bool {
        SCHEMA.requires_replacement(previous, self)
    }

    fn has_drifted(&self, remote: &Self::Output) -> bool {
        sha256_hex(&self.code) != remote.code_sha256
            || self.comment != remote.comment
            || self.runtime != remote.runtime
    }

    async fn create(&self, provider: &Self::Provider) -> Result<Self::Output, Self::Error> {
        let created = provider
            .api()
            .create_function(&self.name, self.expand()?, self.code.clone().into_bytes())
            .await?;
        log::info!("  created function '{}' ({})", created.name, created.arn);
        if self.publish {
            self.publish_live(provider, &created.etag).await?;
        }
        self.describe(provider, &created.name)
            .await?
            .context(IncompleteSnafu {
                what: "CreateFunction",
                field: "FunctionSummary",
            })
    }

    async fn read(
        &self,
        provider: &Self::Provider,
        id: &str,
    ) -> Result<Option<Self::Output>, Self::Error> {
        let function = self.describe(provider, id).await?;
        if function.is_none() {
            log::warn!("CloudFront Function ({id}) not found");
        }
        Ok(function)
    }

    async fn update(
        &self,
        provider: &Self::Provider,
        previous_local: &Self,
        previous_remote: &Self::Output,
    ) -> Result<Self::Output, Self::Error> {
        let mut etag = previous_remote.etag.clone();
        if self.code_changed(previous_local) || self.has_drifted(previous_remote) {
            log::debug!("updating CloudFront Function: {}", previous_remote.name);
            let updated = provider
                .api()
                .update_function(
                    &previous_remote.name,
                    &etag,
                    self.expand()?,
                    self.code.clone().into_bytes(),
                )
                .await?;
            etag = updated.etag;
        }
        if self.publish {
            self.publish_live(provider, &etag).await?;
        }
        self.describe(provider, &previous_remote.name)
            .await?
            .context(IncompleteSnafu {
                what: "UpdateFunction",
                field: "FunctionSummary",
            })
    }

    async fn delete(
        &self,
        provider: &Self::Provider,
        previous_remote: &Self::Output,
    ) -> Result<(), Self::Error> {
        let RemoteFunction { name, etag, .. } = previous_remote;
        if provider
            .api()
            .delete_function(name, etag)
            .await
            .found()?
            .is_none()
        {
            log::warn!("  function {name} was already deleted");
        }
        Ok(())
    }
}
