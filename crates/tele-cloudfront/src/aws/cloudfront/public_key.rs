//! CloudFront public keys, used to verify signed URLs and signed cookies.
use aws_sdk_cloudfront::types::PublicKeyConfig;
use snafu::prelude::*;

use super::{
    api::{Found, Versioned},
    schema::{Attribute, Kind, Schema},
    BuildSnafu, CloudFront, Error, IncompleteSnafu, InvalidSnafu, UniqueIdSnafu,
};
use crate::{
    utils::{is_unique_id, unique_id, UNIQUE_ID_SUFFIX_LENGTH},
    HasDependencies, Resource,
};

/// Prefix of generated names when neither a name nor a prefix is given.
pub const DEFAULT_NAME_PREFIX: &str = "tf-";

const NAME_MAX_LEN: usize = 128;

pub const SCHEMA: Schema = Schema {
    type_name: "aws_cloudfront_public_key",
    attributes: &[
        Attribute::computed("caller_reference", Kind::String),
        Attribute::optional("comment", Kind::String),
        Attribute::required("encoded_key", Kind::String).force_new(),
        Attribute::computed("etag", Kind::String),
        Attribute::optional_computed("name", Kind::String)
            .force_new()
            .conflicts_with(&["name_prefix"]),
        Attribute::optional_computed("name_prefix", Kind::String)
            .force_new()
            .conflicts_with(&["name"]),
    ],
};

/// A public key definition.
///
/// Without a `name` one is generated from `name_prefix` (or
/// [`DEFAULT_NAME_PREFIX`]) and a unique suffix.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PublicKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub encoded_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
}

impl HasDependencies for PublicKey {}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RemotePublicKey {
    pub id: String,
    pub etag: String,
    pub caller_reference: String,
    pub comment: Option<String>,
    pub encoded_key: String,
    pub name: String,
    pub name_prefix: Option<String>,
}

/// Recovers the prefix of a name generated with a unique suffix.
pub fn name_prefix_from_name(name: &str) -> Option<&str> {
    let split = name.len().checked_sub(UNIQUE_ID_SUFFIX_LENGTH)?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (prefix, suffix) = name.split_at(split);
    is_unique_id(suffix).then_some(prefix)
}

impl From<Versioned<PublicKeyConfig>> for RemotePublicKey {
    fn from(key: Versioned<PublicKeyConfig>) -> Self {
        let config = key.value;
        RemotePublicKey {
            id: key.id,
            etag: key.etag,
            caller_reference: config.caller_reference().to_owned(),
            comment: config.comment().map(str::to_owned),
            encoded_key: config.encoded_key().to_owned(),
            name_prefix: name_prefix_from_name(config.name()).map(str::to_owned),
            name: config.name().to_owned(),
        }
    }
}

impl PublicKey {
    fn generate_name(&self) -> Result<String, Error> {
        if let Some(name) = &self.name {
            return Ok(name.clone());
        }
        let prefix = self.name_prefix.as_deref().unwrap_or(DEFAULT_NAME_PREFIX);
        Ok(format!("{prefix}{}", unique_id().context(UniqueIdSnafu)?))
    }

    pub fn expand(&self, name: &str, caller_reference: &str) -> Result<PublicKeyConfig, Error> {
        PublicKeyConfig::builder()
            .caller_reference(caller_reference)
            .set_comment(self.comment.clone())
            .encoded_key(&self.encoded_key)
            .name(name)
            .build()
            .context(BuildSnafu {
                what: "PublicKeyConfig",
            })
    }

    async fn get(&self, provider: &CloudFront, id: &str) -> Result<Option<RemotePublicKey>, Error> {
        Ok(provider
            .api()
            .get_public_key(id)
            .await
            .found()?
            .map(RemotePublicKey::from))
    }
}

impl Resource for PublicKey {
    type Provider = CloudFront;
    type Error = Error;
    type Output = RemotePublicKey;

    fn remote_id(output: &Self::Output) -> String {
        output.id.clone()
    }

    fn validate(&self) -> Result<(), Self::Error> {
        ensure!(
            self.name.is_none() || self.name_prefix.is_none(),
            InvalidSnafu {
                attribute: "name",
                message: "conflicts with name_prefix",
            }
        );
        if let Some(name) = &self.name {
            super::validate_name("name", name, NAME_MAX_LEN)?;
        }
        if let Some(prefix) = &self.name_prefix {
            super::validate_name(
                "name_prefix",
                prefix,
                NAME_MAX_LEN - UNIQUE_ID_SUFFIX_LENGTH,
            )?;
        }
        ensure!(
            !self.encoded_key.trim().is_empty(),
            InvalidSnafu {
                attribute: "encoded_key",
                message: "must not be empty",
            }
        );
        Ok(())
    }

    fn should_replace(&self, previous: &Self) -> bool {
        SCHEMA.requires_replacement(previous, self)
    }

    fn has_drifted(&self, remote: &Self::Output) -> bool {
        self.comment != remote.comment
            || self.encoded_key != remote.encoded_key
            || self.name.as_ref().is_some_and(|name| *name != remote.name)
            || self
                .name_prefix
                .as_ref()
                .is_some_and(|prefix| Some(prefix) != remote.name_prefix.as_ref())
    }

    async fn create(&self, provider: &Self::Provider) -> Result<Self::Output, Self::Error> {
        let name = self.generate_name()?;
        let caller_reference = unique_id().context(UniqueIdSnafu)?;
        let created = provider
            .api()
            .create_public_key(self.expand(&name, &caller_reference)?)
            .await?;
        log::info!("  created public key '{name}' ({})", created.id);
        self.get(provider, &created.id)
            .await?
            .context(IncompleteSnafu {
                what: "CreatePublicKey",
                field: "PublicKey",
            })
    }

    async fn read(
        &self,
        provider: &Self::Provider,
        id: &str,
    ) -> Result<Option<Self::Output>, Self::Error> {
        let key = self.get(provider, id).await?;
        if key.is_none() {
            log::warn!("CloudFront Public Key ({id}) not found");
        }
        Ok(key)
    }

    async fn update(
        &self,
        provider: &Self::Provider,
        _previous_local: &Self,
        previous_remote: &Self::Output,
    ) -> Result<Self::Output, Self::Error> {
        let name = self.name.as_deref().unwrap_or(&previous_remote.name);
        let config = self.expand(name, &previous_remote.caller_reference)?;
        provider
            .api()
            .update_public_key(&previous_remote.id, &previous_remote.etag, config)
            .await?;
        self.get(provider, &previous_remote.id)
            .await?
            .context(IncompleteSnafu {
                what: "UpdatePublicKey",
                field: "PublicKey",
            })
    }

    async fn delete(
        &self,
        provider: &Self::Provider,
        previous_remote: &Self::Output,
    ) -> Result<(), Self::Error> {
        let RemotePublicKey { id, etag, .. } = previous_remote;
        if provider
            .api()
            .delete_public_key(id, etag)
            .await
            .found()?
            .is_none()
        {
            log::warn!("  public key {id} was already deleted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const KEY: &str = "-----BEGIN PUBLIC KEY-----\nMIIBIjANBgkqh\n-----END PUBLIC KEY-----\n";

    fn key() -> PublicKey {
        PublicKey {
            encoded_key: KEY.into(),
            ..Default::default()
        }
    }

    #[test]
    fn generated_names_carry_their_prefix() {
        let name = key().generate_name().unwrap();
        assert!(name.starts_with(DEFAULT_NAME_PREFIX), "{name}");
        assert_eq!(Some(DEFAULT_NAME_PREFIX), name_prefix_from_name(&name));

        let prefixed = PublicKey {
            name_prefix: Some("signing-".into()),
            ..key()
        };
        let name = prefixed.generate_name().unwrap();
        assert_eq!(Some("signing-"), name_prefix_from_name(&name));

        assert_eq!(None, name_prefix_from_name("signing-key"));
        assert_eq!(None, name_prefix_from_name(""));
    }

    #[test]
    fn name_and_prefix_conflict() {
        let mut key = PublicKey {
            name: Some("signing".into()),
            name_prefix: Some("signing-".into()),
            ..key()
        };
        assert!(key.validate().is_err());
        key.name_prefix = None;
        key.validate().unwrap();
    }

    #[test]
    fn prefix_leaves_room_for_the_suffix() {
        let key = PublicKey {
            name_prefix: Some("p".repeat(103)),
            ..key()
        };
        assert!(key.validate().is_err());
        let key = PublicKey {
            name_prefix: Some("p".repeat(102)),
            ..key
        };
        key.validate().unwrap();
    }

    #[test]
    fn key_and_name_changes_force_replacement() {
        let previous = key();
        let comment = PublicKey {
            comment: Some("rotated monthly".into()),
            ..key()
        };
        assert!(!comment.should_replace(&previous));
        let named = PublicKey {
            name: Some("signing".into()),
            ..key()
        };
        assert!(named.should_replace(&previous));
        let rotated = PublicKey {
            encoded_key: "another".into(),
            ..key()
        };
        assert!(rotated.should_replace(&previous));
    }
}
