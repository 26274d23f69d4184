//! Remote values.
//!
//! Remote values are values that are determined after creating
//! or reading a resource from a provider. A [`Remote`] may also hold a
//! literal value, in which case it carries no dependency.

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex},
};

use snafu::OptionExt;

use crate::HasDependencies;

use super::{
    Action, Dependencies, DowncastSnafu, Error, RemoteUnresolvedSnafu, Resource, StoreResource,
};

type VarFn<X> = Arc<dyn Fn(&Arc<dyn Any>) -> Result<X, Error>>;

#[derive(Clone)]
enum RemoteInner<X> {
    Known(X),
    Init {
        depends_on: String,
        last_known_value: Option<X>,
    },
    Var {
        depends_on: String,
        map: VarFn<X>,
        // RemoteVar<T::Output>
        var: Arc<dyn Any>,
    },
}

/// A value that is either known up front, or produced by another resource's
/// output once that resource has been applied.
#[derive(Clone)]
pub struct Remote<X> {
    inner: RemoteInner<X>,
}

impl<X: Clone + core::fmt::Debug + 'static> std::fmt::Debug for Remote<X> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote")
            .field("depends_on", &self.depends_on())
            .field("value", &self.get().ok())
            .finish()
    }
}

impl<X: Clone + core::fmt::Debug + PartialEq + 'static> PartialEq for Remote<X> {
    fn eq(&self, other: &Self) -> bool {
        match (self.get(), other.get()) {
            (Ok(here), Ok(there)) => here == there,
            _ => false,
        }
    }
}

impl<X> From<X> for Remote<X> {
    fn from(value: X) -> Self {
        Remote {
            inner: RemoteInner::Known(value),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct RemoteProxy<T> {
    depends_on: String,
    last_known_value: Option<T>,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RemoteRepr<T> {
    Remote(RemoteProxy<T>),
    Known(T),
}

impl<X: serde::Serialize + Clone + core::fmt::Debug + 'static> serde::Serialize for Remote<X> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match &self.inner {
            RemoteInner::Known(value) => value.serialize(serializer),
            RemoteInner::Init { depends_on, .. } | RemoteInner::Var { depends_on, .. } => {
                RemoteProxy {
                    last_known_value: self.get().ok(),
                    depends_on: depends_on.clone(),
                }
                .serialize(serializer)
            }
        }
    }
}

impl<'de, X: serde::Deserialize<'de>> serde::Deserialize<'de> for Remote<X> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let inner = match RemoteRepr::<X>::deserialize(deserializer)? {
            RemoteRepr::Remote(RemoteProxy {
                depends_on,
                last_known_value,
            }) => RemoteInner::Init {
                depends_on,
                last_known_value,
            },
            RemoteRepr::Known(value) => RemoteInner::Known(value),
        };
        Ok(Remote { inner })
    }
}

impl<X: Clone + core::fmt::Debug + 'static> Remote<X> {
    pub(crate) fn new<T: Resource>(
        resource: &StoreResource<T, T::Output>,
        map: impl Fn(&T::Output) -> X + 'static,
    ) -> Self {
        log::trace!(
            "creating mapping of a remote resource '{}'",
            resource.remote_var.depends_on
        );
        let depends_on = resource.remote_var.depends_on.clone();
        Self {
            inner: RemoteInner::Var {
                map: Arc::new({
                    let depends_on = depends_on.clone();
                    move |any: &Arc<dyn Any>| {
                        let remote_var = any
                            .downcast_ref::<RemoteVar<T::Output>>()
                            .context(DowncastSnafu)?;
                        let t_output = remote_var.get().context(RemoteUnresolvedSnafu {
                            ty: core::any::type_name::<X>(),
                            depends_on: depends_on.clone(),
                        })?;
                        Ok(map(&t_output))
                    }
                }),
                depends_on,
                var: Arc::new(resource.remote_var.clone()),
            },
        }
    }

    /// A literal value that depends on nothing.
    pub fn value(value: X) -> Self {
        Self::from(value)
    }

    /// Name of the resource this value is produced by, if any.
    pub fn depends_on(&self) -> Option<&str> {
        match &self.inner {
            RemoteInner::Known(_) => None,
            RemoteInner::Init { depends_on, .. } | RemoteInner::Var { depends_on, .. } => {
                Some(depends_on)
            }
        }
    }

    pub fn get(&self) -> Result<X, Error> {
        match &self.inner {
            RemoteInner::Known(value) => Ok(value.clone()),
            RemoteInner::Init {
                depends_on,
                last_known_value,
            } => {
                log::trace!("remote var returning last known value: {last_known_value:?}");
                last_known_value.clone().context(RemoteUnresolvedSnafu {
                    ty: core::any::type_name::<X>(),
                    depends_on: depends_on.clone(),
                })
            }
            RemoteInner::Var {
                map,
                var,
                depends_on: _,
            } => map(var),
        }
    }

    pub fn map<Y>(&self, f: impl Fn(X) -> Y + 'static) -> Remote<Y> {
        let inner = match &self.inner {
            RemoteInner::Known(value) => RemoteInner::Known(f(value.clone())),
            RemoteInner::Init {
                depends_on,
                last_known_value,
            } => RemoteInner::Init {
                depends_on: depends_on.clone(),
                last_known_value: last_known_value.clone().map(f),
            },
            RemoteInner::Var {
                depends_on,
                map,
                var,
            } => RemoteInner::Var {
                depends_on: depends_on.clone(),
                var: var.clone(),
                map: Arc::new({
                    let map = map.clone();
                    move |any: &Arc<dyn Any>| {
                        let x = map(any)?;
                        Ok(f(x))
                    }
                }),
            },
        };
        Remote { inner }
    }
}

impl<X: Clone + core::fmt::Debug + 'static> HasDependencies for Remote<X> {
    fn dependencies(&self) -> Dependencies {
        Dependencies {
            inner: self.depends_on().map(str::to_owned).into_iter().collect(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct RemoteVar<T> {
    depends_on: String,
    inner: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for RemoteVar<T> {
    fn clone(&self) -> Self {
        Self {
            depends_on: self.depends_on.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> RemoteVar<T> {
    pub fn get(&self) -> Option<T> {
        self.inner.lock().unwrap().clone()
    }

    pub fn set(&self, value: Option<T>) {
        *self.inner.lock().unwrap() = value;
    }
}

pub(crate) struct Var {
    pub(crate) key: usize,
    pub(crate) ty: &'static str,
    pub(crate) action: Action,
    pub(crate) remote: Box<dyn core::any::Any>,
}

#[derive(Default)]
pub(crate) struct Remotes {
    /// Map of resource name to key + RemoteVar<T>
    vars: HashMap<String, Var>,
}

impl Remotes {
    /// Returns a new `RemoteVar<T>` and its resource key.
    ///
    /// ## Errors
    /// Errs if a var by the given name exists but is of a different type than the type
    /// requested.
    pub fn dequeue_var<T: Any>(
        &mut self,
        id: &str,
        ty: &'static str,
        action: Action,
    ) -> Result<(RemoteVar<T>, usize), Error> {
        log::trace!(
            "requested remote var '{id}' of type {}",
            core::any::type_name::<T>()
        );
        let next_k = self.vars.len();
        let var = self.vars.entry(id.to_owned()).or_insert_with(|| {
            log::trace!("   but one doesn't exist, so we're creating a new entry '{next_k}'");
            Var {
                key: next_k,
                ty,
                action,
                remote: Box::new(RemoteVar::<T> {
                    depends_on: id.to_owned(),
                    inner: Default::default(),
                }),
            }
        });
        let remote: &RemoteVar<T> = var.remote.downcast_ref().context(DowncastSnafu)?;
        Ok((remote.clone(), var.key))
    }

    /// Returns the var of the resource with the given name.
    pub fn get(&self, id: &str) -> Option<&Var> {
        self.vars.get(id)
    }

    /// Returns the set of all declared resource IDs.
    pub fn declared_ids(&self) -> std::collections::HashSet<String> {
        self.vars.keys().cloned().collect()
    }

    /// Iterate over all declared resources.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Var)> {
        self.vars.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_value_serializes_bare() {
        let known = Remote::value("E2QWRUHAPOMQZL".to_owned());
        let s = serde_json::to_string(&known).unwrap();
        assert_eq!(r#""E2QWRUHAPOMQZL""#, s);
        assert!(known.dependencies().into_iter().next().is_none());
    }

    #[test]
    fn stored_remote_keeps_its_dependency() {
        let s = serde_json::json!({
          "depends_on": "distribution",
          "last_known_value": "E2QWRUHAPOMQZL"
        });
        let remote: Remote<String> = serde_json::from_value(s).unwrap();
        assert_eq!("E2QWRUHAPOMQZL", remote.get().unwrap());
        assert_eq!(Some("distribution"), remote.depends_on());
        assert_eq!(
            vec!["distribution".to_owned()],
            remote.dependencies().into_iter().collect::<Vec<_>>()
        );

        let unresolved: Remote<String> = serde_json::from_value(serde_json::json!({
            "depends_on": "distribution",
            "last_known_value": null
        }))
        .unwrap();
        assert!(unresolved.get().is_err());
        assert_ne!(remote, unresolved);
    }

    #[test]
    fn literal_and_stored_remote_compare_by_value() {
        let literal = Remote::value(8u32);
        let stored: Remote<u32> = serde_json::from_value(serde_json::json!({
            "depends_on": "bucket",
            "last_known_value": 8
        }))
        .unwrap();
        assert_eq!(literal, stored);
        assert_eq!(Remote::value(16u32), stored.map(|n| n * 2));
    }
}
