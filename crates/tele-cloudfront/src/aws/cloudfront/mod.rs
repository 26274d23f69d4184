//! Amazon CloudFront configuration resources.
//!
//! Each resource is a serializable definition mirroring the CloudFront
//! configuration object it manages. Definitions are "expanded" into the SDK's
//! config types before a remote call and API responses are "flattened" back
//! into definitions, so that what is stored can be compared to what is
//! declared.
use std::{collections::BTreeSet, sync::Arc};

use aws_config::SdkConfig;
use snafu::prelude::*;

use crate::{Dependencies, HasDependencies, Store};

/// Defines a local enum mirroring an SDK enum, serialized as the API's
/// wire strings.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident => $sdk:ty {
            $($variant:ident = $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl core::str::FromStr for $name {
            type Err = crate::aws::cloudfront::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => crate::aws::cloudfront::UnsupportedValueSnafu {
                        kind: stringify!($name),
                        value: other,
                    }
                    .fail(),
                }
            }
        }

        impl crate::HasDependencies for $name {}

        impl From<$name> for $sdk {
            fn from(value: $name) -> Self {
                <$sdk>::from(value.as_str())
            }
        }

        impl TryFrom<&$sdk> for $name {
            type Error = crate::aws::cloudfront::Error;

            fn try_from(value: &$sdk) -> Result<Self, Self::Error> {
                value.as_str().parse()
            }
        }
    };
}

pub mod api;
pub mod cache_policy;
pub mod function;
pub mod monitoring_subscription;
pub mod origin_request_policy;
pub mod policy;
pub mod public_key;
pub mod response_headers_policy;
pub mod schema;

#[cfg(test)]
mod fake;
#[cfg(test)]
mod test;

pub use api::{ApiError, CloudFrontApi, Versioned};
pub use cache_policy::CachePolicy;
pub use function::Function;
pub use monitoring_subscription::MonitoringSubscription;
pub use origin_request_policy::OriginRequestPolicy;
pub use public_key::PublicKey;
pub use response_headers_policy::ResponseHeadersPolicy;

/// Errors raised by CloudFront resources.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{source}"))]
    Api { source: ApiError },

    #[snafu(display("Could not build {what}: {source}"))]
    Build {
        what: &'static str,
        source: aws_sdk_cloudfront::error::BuildError,
    },

    #[snafu(display("{what} is missing '{field}'"))]
    Incomplete {
        what: &'static str,
        field: &'static str,
    },

    #[snafu(display("Invalid {attribute}: {message}"))]
    Invalid {
        attribute: &'static str,
        message: String,
    },

    #[snafu(display("Unsupported {kind} value '{value}'"))]
    UnsupportedValue { kind: &'static str, value: String },

    #[snafu(display("Could not resolve {attribute}: {source}"))]
    Unresolved {
        attribute: &'static str,
        source: Box<crate::Error>,
    },

    #[snafu(display("Could not generate a unique identifier: {source}"))]
    UniqueId { source: ring::error::Unspecified },
}

impl From<ApiError> for Error {
    fn from(source: ApiError) -> Self {
        Error::Api { source }
    }
}

/// The provider of CloudFront resources.
#[derive(Clone)]
pub struct CloudFront {
    api: Arc<dyn CloudFrontApi>,
}

impl core::fmt::Debug for CloudFront {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudFront").finish_non_exhaustive()
    }
}

impl CloudFront {
    /// Creates a provider talking to CloudFront through the AWS SDK.
    pub fn new(config: &SdkConfig) -> Self {
        Self::from_api(aws_sdk_cloudfront::Client::new(config))
    }

    /// Creates a provider from any implementation of the CloudFront API.
    pub fn from_api(api: impl CloudFrontApi + 'static) -> Self {
        Self { api: Arc::new(api) }
    }

    pub fn api(&self) -> &dyn CloudFrontApi {
        self.api.as_ref()
    }
}

impl AsRef<CloudFront> for CloudFront {
    fn as_ref(&self) -> &CloudFront {
        self
    }
}

/// Registers every CloudFront resource type for orphan auto-deletion.
///
/// Declaring nothing after registering deletes everything in the store.
pub fn register_all(store: &mut Store<CloudFront>) {
    store
        .register::<CachePolicy>()
        .register::<OriginRequestPolicy>()
        .register::<ResponseHeadersPolicy>()
        .register::<PublicKey>()
        .register::<Function>()
        .register::<MonitoringSubscription>();
}

/// The schemas of every CloudFront resource type.
pub fn schemas() -> [&'static schema::Schema; 6] {
    [
        &cache_policy::SCHEMA,
        &origin_request_policy::SCHEMA,
        &response_headers_policy::SCHEMA,
        &public_key::SCHEMA,
        &function::SCHEMA,
        &monitoring_subscription::SCHEMA,
    ]
}

/// A set of values, nested the way the API nests its lists.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Items<T: Ord> {
    #[serde(default = "BTreeSet::new")]
    pub items: BTreeSet<T>,
}

impl<T: Ord> Default for Items<T> {
    fn default() -> Self {
        Self {
            items: BTreeSet::new(),
        }
    }
}

impl<T: Ord> FromIterator<T> for Items<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<T: Ord> HasDependencies for Items<T> {
    fn dependencies(&self) -> Dependencies {
        Dependencies::default()
    }
}

impl<T: Ord + Clone> Items<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The API's `Quantity`.
    pub fn quantity(&self) -> i32 {
        i32::try_from(self.items.len()).unwrap_or(i32::MAX)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// `None` when empty, as the API omits empty lists.
    pub fn non_empty(items: Option<&Self>) -> Option<&Self> {
        items.filter(|items| !items.is_empty())
    }

    /// Flattens an API list, dropping it when empty.
    pub fn flatten(items: &[T]) -> Option<Self> {
        if items.is_empty() {
            None
        } else {
            Some(items.iter().cloned().collect())
        }
    }
}

/// Checks the value of a name-like attribute against the characters and
/// length CloudFront accepts.
pub(crate) fn validate_name(
    attribute: &'static str,
    name: &str,
    max_len: usize,
) -> Result<(), Error> {
    ensure!(
        !name.is_empty() && name.len() <= max_len,
        InvalidSnafu {
            attribute,
            message: format!("must be between 1 and {max_len} characters, got {}", name.len()),
        }
    );
    ensure!(
        name.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'),
        InvalidSnafu {
            attribute,
            message: format!(
                "'{name}' may only contain alphanumeric characters, underscores and hyphens"
            ),
        }
    );
    Ok(())
}
