//! # tele-cloudfront
//!
//! Infrastructure as Code (IaC) for Amazon CloudFront configuration objects,
//! written in Rust. Resources are described as plain Rust values and applied
//! to the platform as a Directed Acyclic Graph (DAG) of create, update,
//! replace and delete steps.
//!
//! ## Key Features
//!
//! - **Resource Management**: CloudFront cache policies, origin-request
//!   policies, response-headers policies, public keys, functions and
//!   monitoring subscriptions, see [`aws::cloudfront`].
//! - **Dependency Tracking**: values produced by one resource can be fed into
//!   another through [`Remote`](remote::Remote), which orders the work.
//! - **Drift Detection**: with [`Store::with_refresh`] every stored resource
//!   is read back from the platform before it is loaded or updated.
//!
//! ### Concepts
//!
//! - **Local State**: the desired state of the resource as defined in your
//!   code or configuration.
//! - **Remote State**: the resource as it exists on the platform, including
//!   computed values like identifiers and ETags.
//!
//! Both are kept in a store directory, one JSON file per resource. Comparing
//! the local definition with the stored one decides the [`Action`] taken.
//!
//! ## Error Handling
//!
//! Functions that can fail return a `Result` with the top-level [`Error`].
//! Errors raised by resources themselves are carried inside it, boxed.

use std::{future::Future, ops::Deref, pin::Pin};

use dagga::{Node, Schedule};
use snafu::prelude::*;
use tokio::io::AsyncWriteExt;

pub use tele_cloudfront_derive::HasDependencies;

extern crate self as tele;

pub mod aws;
mod has_dependencies_impl;
pub mod remote;
pub mod utils;

use remote::{Remote, RemoteVar, Remotes};

/// Marker trait for userland errors.
pub trait UserError: core::fmt::Display + core::fmt::Debug + Send + Sync + 'static {}
impl<T: core::fmt::Display + core::fmt::Debug + Send + Sync + 'static> UserError for T {}

/// Top-level error enum that encompasses all errors.
#[derive(snafu::Snafu, Debug)]
pub enum Error {
    #[snafu(display("Could not read store file '{path:?}': {source}"))]
    StoreFileRead {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not delete store file '{path:?}': {source}"))]
    StoreFileDelete {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not serialize stored '{name}': {source}"))]
    Serialize {
        name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Could not deserialize stored '{name}': {source}"))]
    Deserialize {
        name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Could not build schedule: {msg}"))]
    Schedule { msg: String },

    #[snafu(display("Could not create file {path:?}: {source}"))]
    CreateFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not write file {path:?}: {source}"))]
    WriteFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Remote value of {ty:?} is unresolved. Depends on {depends_on}"))]
    RemoteUnresolved {
        ty: &'static str,
        depends_on: String,
    },

    #[snafu(display("Could not find a resource by the name '{name}'"))]
    MissingResource { name: String },

    #[snafu(display("'{name}' is not a valid definition: {error}"))]
    Invalid {
        name: String,
        error: Box<dyn UserError>,
    },

    #[snafu(display("Error during '{name}' creation: {error}"))]
    Create {
        name: String,
        error: Box<dyn UserError>,
    },

    #[snafu(display("Error during '{name}' read: {error}"))]
    Read {
        name: String,
        error: Box<dyn UserError>,
    },

    #[snafu(display("Could not import '{name}', nothing exists with the id '{id}'"))]
    ImportMissing { name: String, id: String },

    #[snafu(display("Error during '{name}' update: {error}"))]
    Update {
        name: String,
        error: Box<dyn UserError>,
    },

    #[snafu(display("Error during '{name}' destruction: {error}"))]
    Destroy {
        name: String,
        error: Box<dyn UserError>,
    },

    #[snafu(display("Missing previous remote value '{name}'"))]
    Load { name: String },

    #[snafu(display("Could not downcast"))]
    Downcast,

    #[snafu(display("Missing store file for '{id}'"))]
    MissingStoreFile { id: String },

    #[snafu(display("Could not scan store directory '{path:?}': {source}"))]
    ScanStoreDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

type Result<T, E = Error> = core::result::Result<T, E>;

/// IaC resources.
///
/// Represents a resource created on a platform.
pub trait Resource:
    core::fmt::Debug
    + Clone
    + PartialEq
    + HasDependencies
    + serde::Serialize
    + serde::de::DeserializeOwned
    + 'static
{
    /// Type of the platform/resource provider.
    ///
    /// For example [`aws::cloudfront::CloudFront`].
    type Provider;

    /// Errors that may occur interacting with the provider.
    type Error: UserError;

    /// The remote type of this resource, which we can used to fill in
    /// [`Remote`] values in other resources.
    type Output: core::fmt::Debug
        + Clone
        + PartialEq
        + serde::Serialize
        + serde::de::DeserializeOwned
        + 'static;

    /// The platform identifier of a created resource.
    fn remote_id(output: &Self::Output) -> String;

    /// Checks the definition before any platform call is made.
    fn validate(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Whether moving from `previous` to `self` requires the resource to be
    /// destroyed and created again, rather than updated in place.
    fn should_replace(&self, _previous: &Self) -> bool {
        false
    }

    /// Whether the platform's copy of the resource no longer matches this
    /// definition.
    fn has_drifted(&self, _remote: &Self::Output) -> bool {
        false
    }

    /// Creates a new resource on the platform.
    fn create(
        &self,
        provider: &Self::Provider,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>>;

    /// Reads the resource with the given platform identifier.
    ///
    /// Resolves to `None` if the resource does not exist.
    fn read(
        &self,
        provider: &Self::Provider,
        id: &str,
    ) -> impl Future<Output = Result<Option<Self::Output>, Self::Error>>;

    /// Updates an existing resource on the platform, given its previous
    /// local and remote states.
    fn update(
        &self,
        provider: &Self::Provider,
        previous_local: &Self,
        previous_remote: &Self::Output,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>>;

    /// Deletes a resource from the platform.
    ///
    /// A resource that is already gone is not an error.
    fn delete(
        &self,
        provider: &Self::Provider,
        previous_remote: &Self::Output,
    ) -> impl Future<Output = Result<(), Self::Error>>;
}

#[derive(Clone, Default, Debug)]
pub struct Dependencies {
    /// Specifies a dependency on a `Resource`.
    inner: Vec<String>,
}

impl IntoIterator for Dependencies {
    type Item = String;

    type IntoIter = <Vec<String> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl core::fmt::Display for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner.join(", "))
    }
}

impl Dependencies {
    pub fn merge(self, other: Self) -> Self {
        let mut inner = self.inner;
        for dep in other.inner {
            if !inner.contains(&dep) {
                inner.push(dep);
            }
        }
        Dependencies { inner }
    }
}

/// Tracks dependencies between resources.
///
/// This trait can be derived, and has a default implementation that
/// reports zero dependencies.
pub trait HasDependencies {
    fn dependencies(&self) -> Dependencies {
        Dependencies::default()
    }
}

/// `Create`, `Read`, `Load`, `Update` and `Replace` result in a resource
/// being added to the graph.
///
/// `Destroy` moves the resource out of the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Action {
    Load,
    Create,
    Read,
    Update,
    Replace,
    Destroy,
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Action::Load => "load",
            Action::Create => "create",
            Action::Read => "import",
            Action::Update => "update",
            Action::Replace => "replace",
            Action::Destroy => "destroy",
        })
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
struct InertStoreResource {
    name: String,
    local: serde_json::Value,
    remote: serde_json::Value,
    /// The Rust type name of the resource (via `std::any::type_name::<T>()`).
    /// Used for orphan detection and auto-deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    type_name: Option<String>,
    /// The resource names this resource depends on.
    /// Used for ordering orphan deletions correctly.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<String>,
}

impl InertStoreResource {
    fn read(id: &str, store_path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = store_file_path(id, store_path);
        snafu::ensure!(path.exists(), MissingStoreFileSnafu { id: id.to_owned() });

        log::debug!("{path:?} exists, reading '{id}' from it");
        let contents =
            std::fs::read_to_string(&path).context(StoreFileReadSnafu { path: &path })?;
        log::trace!("contents:\n{}", indent(&contents));
        serde_json::from_str(&contents).context(DeserializeSnafu {
            name: id.to_owned(),
        })
    }

    async fn save(&self, store_path: impl AsRef<std::path::Path>) -> Result<(), Error> {
        let path = store_file_path(&self.name, &store_path);
        log::info!("  storing {} to {path:?}", self.name);

        let contents = serde_json::to_string_pretty(self).context(SerializeSnafu {
            name: format!("storing {}", self.name),
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(&parent)
                .await
                .context(CreateFileSnafu { path: parent })?;
        }

        let mut file = tokio::fs::File::create(&path)
            .await
            .context(CreateFileSnafu { path: path.clone() })?;
        file.write_all(contents.as_bytes())
            .await
            .context(WriteFileSnafu { path: path.clone() })?;
        // tokio finishes writes in the background unless flushed
        file.flush().await.context(WriteFileSnafu { path })?;
        Ok(())
    }
}

/// A resource declared in a [`Store`].
#[derive(Clone, Debug)]
pub struct StoreResource<L, R> {
    /// Name of the resource from the user's perspective
    name: String,
    /// Local definition in _code_
    local_definition: L,
    action: Action,
    remote_var: RemoteVar<R>,
}

impl<L, R> Deref for StoreResource<L, R> {
    type Target = L;

    fn deref(&self) -> &Self::Target {
        &self.local_definition
    }
}

impl<L, R> AsRef<L> for StoreResource<L, R> {
    fn as_ref(&self) -> &L {
        &self.local_definition
    }
}

impl<T> StoreResource<T, T::Output>
where
    T: Resource,
{
    /// Map a remote value to use in local definitions.
    pub fn remote<X: Clone + core::fmt::Debug + 'static>(
        &self,
        f: impl Fn(&T::Output) -> X + 'static,
    ) -> Remote<X> {
        Remote::new(self, f)
    }

    /// Return the action that would be applied to this resource.
    pub fn action(&self) -> Action {
        self.action
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The path to an individual resource store file.
fn store_file_path(name: &str, store_path: impl AsRef<std::path::Path>) -> std::path::PathBuf {
    store_path.as_ref().join(format!("{name}.json"))
}

fn indent(s: &str) -> String {
    s.lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

type StoreNodeRunFn<Provider> = Box<
    dyn FnOnce(
        // Resource platform provider
        &'_ Provider,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + '_>>,
>;

fn noop_run_fn<Provider: 'static>(message: String) -> StoreNodeRunFn<Provider> {
    Box::new(move |_provider: &Provider| {
        Box::pin(async move {
            log::debug!("{message}");
            Ok(())
        }) as Pin<Box<dyn Future<Output = Result<()>> + '_>>
    })
}

struct RunAction<'a, Provider, T: Resource<Provider = Provider>> {
    provider: &'a Provider,
    store_path: std::path::PathBuf,
    /// Name of the resource being acted on, not the node name.
    resource_id: String,
    action: Action,
    refresh: bool,
    /// The platform identifier to import, for [`Action::Read`].
    import_id: Option<String>,
    local_definition_code: T,
    local_definition_store: Option<T>,
    remote_var: RemoteVar<T::Output>,
}

impl<Provider, T: Resource<Provider = Provider>> RunAction<'_, Provider, T> {
    async fn save(&self, local_definition: &T) -> Result<()> {
        let resource_id = &self.resource_id;
        let inert_resource = InertStoreResource {
            name: resource_id.clone(),
            local: serde_json::to_value(local_definition).context(SerializeSnafu {
                name: format!("store {resource_id}"),
            })?,
            remote: serde_json::to_value(
                self.remote_var
                    .get()
                    .context(LoadSnafu { name: resource_id })?,
            )
            .context(SerializeSnafu {
                name: format!("store {resource_id} remote"),
            })?,
            type_name: Some(std::any::type_name::<T>().to_owned()),
            dependencies: local_definition.dependencies().into_iter().collect(),
        };
        inert_resource.save(&self.store_path).await
    }

    async fn create(&self) -> Result<()> {
        let value = self
            .local_definition_code
            .create(self.provider)
            .await
            .map_err(|error| Error::Create {
                name: self.resource_id.clone(),
                error: Box::new(error),
            })?;
        log::info!("  created {}", T::remote_id(&value));
        self.remote_var.set(Some(value));
        self.save(&self.local_definition_code).await
    }

    async fn read(&self, local: &T, id: &str) -> Result<Option<T::Output>> {
        local
            .read(self.provider, id)
            .await
            .map_err(|error| Error::Read {
                name: self.resource_id.clone(),
                error: Box::new(error),
            })
    }

    async fn delete(&self, local: &T, previous_remote: &T::Output) -> Result<()> {
        local
            .delete(self.provider, previous_remote)
            .await
            .map_err(|error| Error::Destroy {
                name: self.resource_id.clone(),
                error: Box::new(error),
            })
    }

    /// Loads or updates a previously stored resource, reading it back from
    /// the platform first when refreshing.
    async fn load_or_update(&self) -> Result<()> {
        let resource_id = &self.resource_id;
        let previous_local = self
            .local_definition_store
            .as_ref()
            .context(LoadSnafu { name: resource_id })?;
        let mut previous_remote = self
            .remote_var
            .get()
            .context(LoadSnafu { name: resource_id })?;

        let mut drifted = false;
        if self.refresh {
            let id = T::remote_id(&previous_remote);
            log::debug!("  refreshing '{resource_id}' ({id})");
            match self.read(previous_local, &id).await? {
                None => {
                    log::warn!("  '{resource_id}' ({id}) no longer exists, creating it again");
                    return self.create().await;
                }
                Some(current) => {
                    drifted = self.local_definition_code.has_drifted(&current);
                    if drifted {
                        log::warn!("  '{resource_id}' has drifted from its definition");
                    }
                    previous_remote = current;
                    self.remote_var.set(Some(previous_remote.clone()));
                }
            }
        }

        if *previous_local == self.local_definition_code && !drifted {
            if self.action == Action::Update {
                log::warn!(
                    "Skipping '{resource_id}' update as the local value has not changed.\n\
                    If you require an update, consider adding a sentinel value."
                );
            }
            return self.save(&self.local_definition_code).await;
        }

        let cmp = pretty_assertions::Comparison::new(previous_local, &self.local_definition_code);
        log::info!("updating '{resource_id}':\n{}", indent(&format!("{cmp}")));
        let output = self
            .local_definition_code
            .update(self.provider, previous_local, &previous_remote)
            .await
            .map_err(|error| Error::Update {
                name: resource_id.clone(),
                error: Box::new(error),
            })?;
        self.remote_var.set(Some(output));
        self.save(&self.local_definition_code).await
    }

    async fn run(self) -> Result<()> {
        let resource_id = self.resource_id.clone();
        log::info!("{} '{resource_id}':", self.action);

        match self.action {
            Action::Load | Action::Update => self.load_or_update().await?,
            Action::Create => self.create().await?,
            Action::Read => {
                let id = self.import_id.clone().unwrap_or_default();
                let value = self
                    .read(&self.local_definition_code, &id)
                    .await?
                    .context(ImportMissingSnafu {
                        name: &resource_id,
                        id: &id,
                    })?;
                let drifted = self.local_definition_code.has_drifted(&value);
                self.remote_var.set(Some(value.clone()));
                if drifted {
                    log::info!("  '{resource_id}' ({id}) differs from its definition, updating it");
                    let output = self
                        .local_definition_code
                        .update(self.provider, &self.local_definition_code, &value)
                        .await
                        .map_err(|error| Error::Update {
                            name: resource_id.clone(),
                            error: Box::new(error),
                        })?;
                    self.remote_var.set(Some(output));
                }
                self.save(&self.local_definition_code).await?;
            }
            Action::Replace => {
                let previous_local = self
                    .local_definition_store
                    .as_ref()
                    .context(LoadSnafu { name: &resource_id })?;
                let previous_remote = self
                    .remote_var
                    .get()
                    .context(LoadSnafu { name: &resource_id })?;
                let cmp =
                    pretty_assertions::Comparison::new(previous_local, &self.local_definition_code);
                log::info!(
                    "replacing '{resource_id}' ({}):\n{}",
                    T::remote_id(&previous_remote),
                    indent(&format!("{cmp}"))
                );
                self.delete(previous_local, &previous_remote).await?;
                self.remote_var.set(None);
                self.create().await?;
            }
            Action::Destroy => {
                log::debug!("running destroy action on {resource_id}");
                // In the destroy case there is no code-local definition, only the stored one,
                // which is passed as the code definition.
                let previous_remote = self
                    .remote_var
                    .get()
                    .context(LoadSnafu { name: &resource_id })?;
                self.delete(&self.local_definition_code, &previous_remote)
                    .await?;

                log::info!("  {resource_id} is destroyed");
                let path = store_file_path(&resource_id, &self.store_path);
                log::info!("  removing {resource_id} store file {path:?}");
                tokio::fs::remove_file(&path)
                    .await
                    .context(StoreFileDeleteSnafu { path })?;
                self.remote_var.set(None);
            }
        }

        log::info!("  success!");
        Ok(())
    }
}

/// A resource scheduled to be destroyed.
pub struct DestroyResource<T: Resource> {
    local: T,
    remote: T::Output,
}

impl<T: Resource> Deref for DestroyResource<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.local
    }
}

impl<T: Resource> DestroyResource<T> {
    /// Map a remote value of a resource scheduled to be destroyed into a
    /// literal value of another resource, severing the dependency.
    pub fn migrate<X: Clone + core::fmt::Debug + 'static>(
        &self,
        f: fn(&T::Output) -> X,
    ) -> Remote<X> {
        Remote::value(f(&self.remote))
    }

    /// The last stored remote value.
    pub fn remote(&self) -> &T::Output {
        &self.remote
    }
}

struct StoreNode<Provider> {
    run: StoreNodeRunFn<Provider>,
}

struct PreviouslyStored<T: Resource> {
    action: Action,
    resource: Option<(T, T::Output)>,
}

/// A type-erased delete function for a specific resource type.
///
/// Constructed automatically when a resource type is first used (via
/// [`Store::resource`], [`Store::import`] or [`Store::destroy`]), or
/// manually via [`Store::register`]. Produces a [`StoreNodeRunFn`] that
/// reads the store file, deserializes it into the concrete type, calls
/// `T::delete()`, and removes the file.
struct ResourceDeleter<Provider> {
    make_run_fn: Box<
        dyn Fn(
            std::path::PathBuf, // store_path
            String,             // resource_id
        ) -> StoreNodeRunFn<Provider>,
    >,
}

/// A single planned action for a resource.
#[derive(Clone, Debug)]
pub struct PlannedAction {
    /// The resource name.
    pub id: String,
    /// The action to be taken.
    pub action: Action,
    /// The Rust type name, if known.
    pub type_name: Option<String>,
    /// Whether this is an auto-detected orphan.
    pub is_orphan: bool,
}

/// A plan of actions produced by [`Store::plan`].
///
/// Inspect the plan before passing it to [`Store::apply`] to execute.
pub struct Plan<Provider> {
    /// The planned actions, in schedule order.
    pub actions: Vec<PlannedAction>,
    /// Resources that appear orphaned but could not be auto-deleted
    /// (unregistered type or missing `type_name` in store file).
    pub warnings: Vec<String>,
    /// Whether stored resources are read back from the platform on apply.
    pub refresh: bool,
    schedule: Schedule<Node<StoreNode<Provider>, usize>>,
}

impl<Provider> Plan<Provider> {
    /// Whether applying this plan would change anything on the platform,
    /// ignoring the effect of a refresh.
    pub fn has_changes(&self) -> bool {
        self.actions.iter().any(|a| a.action != Action::Load)
    }

    /// Returns the steps of the schedule, one batch of node names per step.
    pub fn steps(&self) -> Vec<Vec<String>> {
        self.schedule
            .batches
            .iter()
            .map(|batch| batch.iter().map(|node| node.name().to_owned()).collect())
            .collect()
    }
}

impl<Provider> core::fmt::Display for Plan<Provider> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.has_changes() {
            f.write_str("No changes.\n")?;
        }
        for action in self.actions.iter().filter(|a| a.action != Action::Load) {
            let orphan_marker = if action.is_orphan { " (orphan)" } else { "" };
            let ty = action.type_name.as_deref().unwrap_or("unknown");
            writeln!(
                f,
                "  {} '{}' [{}]{}",
                action.action, action.id, ty, orphan_marker
            )?;
        }
        if self.refresh {
            let loads = self
                .actions
                .iter()
                .filter(|a| a.action == Action::Load)
                .count();
            if loads > 0 {
                writeln!(f, "  refresh {loads} unchanged resource(s)")?;
            }
        }
        for warning in &self.warnings {
            writeln!(f, "  WARNING: {warning}")?;
        }
        Ok(())
    }
}

/// Holds the provider, the store directory and the graph of declared work.
pub struct Store<T> {
    path: std::path::PathBuf,
    provider: T,
    refresh: bool,
    remotes: Remotes,
    graph: dagga::Dag<StoreNode<T>, usize>,
    deleters: std::collections::HashMap<String, ResourceDeleter<T>>,
}

impl<P: 'static> Store<P> {
    fn read_from_store<T: Resource<Provider = P>>(
        path: impl AsRef<std::path::Path>,
        id: &str,
    ) -> Result<(T, T::Output)> {
        let inert_store_rez = InertStoreResource::read(id, path)?;
        log::trace!("reading local contents as {}", std::any::type_name::<T>());
        let stored_definition: T =
            serde_json::from_value(inert_store_rez.local).context(DeserializeSnafu {
                name: id.to_owned(),
            })?;

        log::trace!("  reading remote output JSON value");
        let remote_value: T::Output =
            serde_json::from_value(inert_store_rez.remote).context(DeserializeSnafu {
                name: format!("remote {id}"),
            })?;
        Ok((stored_definition, remote_value))
    }

    pub fn new(path: impl AsRef<std::path::Path>, provider: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            graph: dagga::Dag::default(),
            refresh: false,
            remotes: Default::default(),
            provider,
            deleters: Default::default(),
        }
    }

    /// Read every stored resource back from the platform before loading or
    /// updating it.
    ///
    /// Resources that no longer exist are created again, and resources
    /// whose platform copy has drifted from their definition are updated.
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn ensure_registered<T>(&mut self)
    where
        T: Resource<Provider = P>,
    {
        let type_name = std::any::type_name::<T>();
        if self.deleters.contains_key(type_name) {
            return;
        }
        log::trace!("registering deleter for {type_name}");
        self.deleters.insert(
            type_name.to_owned(),
            ResourceDeleter {
                make_run_fn: Box::new(|store_path, resource_id| {
                    Box::new(move |provider: &P| {
                        Box::pin(async move {
                            let (local, remote): (T, T::Output) =
                                Self::read_from_store(&store_path, &resource_id)?;
                            log::info!("destroy '{resource_id}' (orphan auto-delete):");
                            local.delete(provider, &remote).await.map_err(|error| {
                                Error::Destroy {
                                    name: resource_id.clone(),
                                    error: Box::new(error),
                                }
                            })?;
                            let path = store_file_path(&resource_id, &store_path);
                            log::info!("  removing {resource_id} store file {path:?}");
                            tokio::fs::remove_file(&path)
                                .await
                                .context(StoreFileDeleteSnafu { path })?;
                            log::info!("  {resource_id} destroyed");
                            Ok(())
                        }) as Pin<Box<dyn Future<Output = Result<()>> + '_>>
                    })
                }),
            },
        );
    }

    /// Register a resource type for automatic orphan detection and deletion.
    ///
    /// When [`Store::plan`] discovers a store file whose `type_name` matches
    /// this type but no corresponding [`Store::resource`] or
    /// [`Store::destroy`] call was made, it will schedule the resource for
    /// automatic deletion.
    ///
    /// Resource types are registered automatically whenever they are
    /// declared, so this is only needed for types that are **not** declared
    /// in the current run but may still have store files from a previous
    /// apply.
    pub fn register<T>(&mut self) -> &mut Self
    where
        T: Resource<Provider = P>,
    {
        self.ensure_registered::<T>();
        self
    }

    fn read_file<T>(&self, id: &str) -> Result<(T, T::Output), Error>
    where
        T: Resource<Provider = P>,
    {
        Self::read_from_store(&self.path, id)
    }

    /// Returns the graph keys of the given dependencies, which must already
    /// be declared.
    fn dependency_keys(&self, dependencies: Dependencies) -> Result<Vec<usize>> {
        let mut reads = vec![];
        for dep in dependencies {
            let var = self
                .remotes
                .get(&dep)
                .context(MissingResourceSnafu { name: dep })?;
            reads.push(var.key);
        }
        Ok(reads)
    }

    fn validate<T>(id: &str, local_definition: &T) -> Result<()>
    where
        T: Resource<Provider = P>,
    {
        local_definition.validate().map_err(|error| {
            log::error!("'{id}' is invalid: {error}");
            Error::Invalid {
                name: id.to_owned(),
                error: Box::new(error),
            }
        })
    }

    fn define_resource<T>(
        &mut self,
        id: &str,
        local_definition: T,
        action: Action,
        import_id: Option<String>,
        previously_stored: Option<(T, T::Output)>,
    ) -> Result<StoreResource<T, T::Output>, Error>
    where
        T: Resource<Provider = P>,
    {
        self.ensure_registered::<T>();
        let ty = std::any::type_name::<T>();
        let (remote_var, rez) = self.remotes.dequeue_var::<T::Output>(id, ty, action)?;
        let (local_definition_store, output) = previously_stored.unzip();
        remote_var.set(output);

        let reads = self.dependency_keys(local_definition.dependencies())?;
        let run: StoreNodeRunFn<T::Provider> = Box::new({
            let run_action = (
                self.path.clone(),
                id.to_owned(),
                self.refresh,
                import_id,
                local_definition.clone(),
                local_definition_store,
                remote_var.clone(),
            );
            move |provider: &T::Provider| {
                let (
                    store_path,
                    resource_id,
                    refresh,
                    import_id,
                    local_definition_code,
                    local_definition_store,
                    remote_var,
                ) = run_action;
                Box::pin(
                    RunAction {
                        provider,
                        store_path,
                        resource_id,
                        action,
                        refresh,
                        import_id,
                        local_definition_code,
                        local_definition_store,
                        remote_var,
                    }
                    .run(),
                )
            }
        });

        log::debug!("adding main node {action} {id}");
        let node_name = format!("{action} {id}");
        let dag_node = dagga::Node::new(StoreNode { run })
            .with_name(node_name)
            .with_reads(reads);
        log::debug!("  with result {rez}");
        self.graph.add_node(dag_node.with_result(rez));

        Ok(StoreResource {
            name: id.to_owned(),
            local_definition,
            action,
            remote_var,
        })
    }

    /// Read the stored previous definition and determine the action.
    fn determine_action_from_previously_stored<T>(
        &self,
        local_definition: &T,
        id: &str,
    ) -> Result<PreviouslyStored<T>, Error>
    where
        T: Resource<Provider = P>,
    {
        match self.read_file(id) {
            Ok((stored_definition, output)) => {
                log::debug!("  {output:?}");
                let action = if local_definition.should_replace(&stored_definition) {
                    log::debug!("  local resource can't be updated in place, replacing it");
                    Action::Replace
                } else if *local_definition != stored_definition {
                    log::debug!("  local resource has changed, so this remote is now stale");
                    Action::Update
                } else {
                    // Check if any upstream dependencies are "stale" (updated or replaced),
                    // which would cause this resource to possibly require an update.
                    let mut may_need_update = false;
                    for dep in local_definition.dependencies() {
                        let var = self.remotes.get(&dep).context(LoadSnafu { name: dep })?;
                        if var.action != Action::Load {
                            may_need_update = true;
                            break;
                        }
                    }
                    if may_need_update {
                        Action::Update
                    } else {
                        Action::Load
                    }
                };

                Ok(PreviouslyStored {
                    action,
                    resource: Some((stored_definition, output)),
                })
            }
            Err(Error::MissingStoreFile { id }) => {
                log::debug!("store file '{id}' does not exist, creating a new resource");
                Ok(PreviouslyStored {
                    action: Action::Create,
                    resource: None,
                })
            }
            Err(e) => {
                log::error!("could not define resource '{id}': {e}");
                Err(e)
            }
        }
    }

    /// Defines a resource.
    ///
    /// Depending on the result of comparing `local_definition` to the one on
    /// file (if it exists), the resource is either created, updated in
    /// place, replaced or simply loaded. The result is stored to a file.
    ///
    /// To import an existing resource from a platform, use [`Store::import`].
    pub fn resource<T>(
        &mut self,
        id: impl AsRef<str>,
        local_definition: T,
    ) -> Result<StoreResource<T, T::Output>, Error>
    where
        T: Resource<Provider = P>,
    {
        let id = id.as_ref();
        Self::validate(id, &local_definition)?;
        let PreviouslyStored { action, resource } =
            self.determine_action_from_previously_stored(&local_definition, id)?;
        self.define_resource(id, local_definition, action, None, resource)
    }

    /// Defines a pre-existing resource, importing it from the platform by
    /// its platform identifier.
    ///
    /// If the platform's copy differs from `local_definition` it is updated
    /// to match during the same apply.
    ///
    /// This only needs to be used once. After the resource is imported and
    /// stored to a file, declare it with [`Store::resource`].
    pub fn import<T>(
        &mut self,
        id: impl AsRef<str>,
        local_definition: T,
        remote_id: impl Into<String>,
    ) -> Result<StoreResource<T, T::Output>, Error>
    where
        T: Resource<Provider = P>,
    {
        let id = id.as_ref();
        Self::validate(id, &local_definition)?;
        self.define_resource(
            id,
            local_definition,
            Action::Read,
            Some(remote_id.into()),
            None,
        )
    }

    /// Destroys a resource.
    pub fn destroy<T>(&mut self, id: impl AsRef<str>) -> Result<DestroyResource<T>, Error>
    where
        T: Resource<Provider = P>,
    {
        self.ensure_registered::<T>();
        let id = id.as_ref();
        let (local, remote) = self.read_file::<T>(id)?;
        let ty = std::any::type_name::<T>();
        let (remote_var, rez) = self
            .remotes
            .dequeue_var::<T::Output>(id, ty, Action::Destroy)?;
        remote_var.set(Some(remote.clone()));
        let reads = self.dependency_keys(local.dependencies())?;
        {
            // Destruction requires a load to introduce the resource (for the DAG)
            log::debug!("adding node {} {id}", Action::Load);
            let load_node = dagga::Node::new(StoreNode {
                run: noop_run_fn(format!("loaded '{id}' for destruction")),
            })
            .with_name(format!("load {id}"))
            .with_reads(reads.clone())
            .with_result(rez);
            self.graph.add_node(load_node);
        }
        {
            log::debug!("adding node {} {id}", Action::Destroy);
            let run: StoreNodeRunFn<P> = Box::new({
                let resource_id = id.to_owned();
                let local = local.clone();
                let store_path = self.path.clone();
                let remote_var = remote_var.clone();
                move |provider| {
                    Box::pin(
                        RunAction {
                            provider,
                            store_path,
                            resource_id,
                            action: Action::Destroy,
                            refresh: false,
                            import_id: None,
                            local_definition_code: local,
                            local_definition_store: None,
                            remote_var,
                        }
                        .run(),
                    )
                }
            });
            self.graph.add_node(
                dagga::Node::new(StoreNode { run })
                    .with_name(format!("destroy {id}"))
                    .with_reads(reads)
                    .with_move(rez),
            );
        }

        Ok(DestroyResource { local, remote })
    }

    /// Scans the store directory for resources that are stored but not
    /// declared in this run.
    fn scan_orphans(&self) -> Result<Vec<InertStoreResource>> {
        let mut orphans = vec![];
        let store_dir = &self.path;
        if !store_dir.exists() {
            return Ok(orphans);
        }
        let declared_ids = self.remotes.declared_ids();
        let entries = std::fs::read_dir(store_dir).context(ScanStoreDirSnafu { path: store_dir })?;
        for entry in entries {
            let entry = entry.context(ScanStoreDirSnafu { path: store_dir })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(file_stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if declared_ids.contains(file_stem) {
                continue;
            }
            let mut inert = InertStoreResource::read(file_stem, store_dir)?;
            // The file name is authoritative.
            inert.name = file_stem.to_owned();
            orphans.push(inert);
        }
        orphans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(orphans)
    }

    /// Scan the store directory and build an execution plan.
    ///
    /// Compares declared resources (from [`Store::resource`],
    /// [`Store::destroy`], etc.) against store files on disk. Resources
    /// found on disk but not declared are flagged as orphans.
    ///
    /// Orphans whose types are registered are automatically scheduled for
    /// deletion, after anything that depends on them. Unregistered orphans
    /// produce warnings.
    pub fn plan(&mut self) -> Result<Plan<P>> {
        let mut actions = Vec::new();
        let mut warnings = Vec::new();

        for (id, var) in self.remotes.iter() {
            actions.push(PlannedAction {
                id: id.clone(),
                action: var.action,
                type_name: Some(var.ty.to_owned()),
                is_orphan: false,
            });
        }

        let mut deletable = vec![];
        for inert in self.scan_orphans()? {
            let file_stem = inert.name.clone();
            match inert.type_name.as_deref() {
                Some(tn) if self.deleters.contains_key(tn) => {
                    log::info!(
                        "orphan detected: '{file_stem}' (type: {tn}), scheduling auto-delete"
                    );
                    // Register every orphan before building nodes, so that orphans can
                    // be ordered against each other.
                    let (remote_var, rez) = self.remotes.dequeue_var::<serde_json::Value>(
                        &file_stem,
                        "orphan",
                        Action::Destroy,
                    )?;
                    remote_var.set(Some(inert.remote.clone()));
                    deletable.push((inert, rez));
                }
                _ => {
                    // Can't auto-delete: the resource type wasn't used in this run
                    // and wasn't registered, so there is no deleter.
                    let msg = match &inert.type_name {
                        Some(tn) => format!(
                            "Orphaned resource '{file_stem}' (type: {tn}) found in the store \
                            directory but its type is not known to this run. Register the \
                            type to enable automatic deletion, or destroy it explicitly."
                        ),
                        None => format!(
                            "Orphaned resource '{file_stem}' found in the store directory but \
                            its store file has no type_name. Destroy it explicitly."
                        ),
                    };
                    log::warn!("{msg}");
                    warnings.push(msg);
                }
            }
        }

        for (inert, rez) in deletable {
            let file_stem = inert.name;
            let type_name = inert.type_name.unwrap_or_default();
            let dep_keys: Vec<usize> = inert
                .dependencies
                .iter()
                .filter_map(|dep| self.remotes.get(dep).map(|v| v.key))
                .collect();

            let load_node = dagga::Node::new(StoreNode {
                run: noop_run_fn(format!("loading orphan '{file_stem}' for deletion")),
            })
            .with_name(format!("load {file_stem}"))
            .with_reads(dep_keys.clone())
            .with_result(rez);
            self.graph.add_node(load_node);

            let run = match self.deleters.get(&type_name) {
                Some(deleter) => (deleter.make_run_fn)(self.path.clone(), file_stem.clone()),
                None => continue,
            };
            let destroy_node = dagga::Node::new(StoreNode { run })
                .with_name(format!("destroy {file_stem}"))
                .with_reads(dep_keys)
                .with_move(rez);
            self.graph.add_node(destroy_node);

            actions.push(PlannedAction {
                id: file_stem,
                action: Action::Destroy,
                type_name: Some(type_name),
                is_orphan: true,
            });
        }

        let graph = std::mem::take(&mut self.graph);
        let schedule = graph
            .build_schedule()
            .map_err(|e| Error::Schedule { msg: e.to_string() })?;

        // Reorder actions to match the schedule's execution order.
        // Node names are "{action} {id}". The first occurrence of an id in
        // schedule order is the canonical position for that action.
        let mut ordered_actions = Vec::with_capacity(actions.len());
        let mut seen = std::collections::HashSet::new();
        for batch in &schedule.batches {
            for node in batch {
                let id = node
                    .name()
                    .split_once(' ')
                    .map(|(_, id)| id)
                    .unwrap_or(node.name());
                if seen.insert(id.to_owned()) {
                    if let Some(pos) = actions.iter().position(|a| a.id == id) {
                        ordered_actions.push(actions.remove(pos));
                    }
                }
            }
        }
        ordered_actions.extend(actions);

        Ok(Plan {
            actions: ordered_actions,
            warnings,
            refresh: self.refresh,
            schedule,
        })
    }

    /// Execute a plan previously built by [`Store::plan`].
    pub async fn apply(&mut self, plan: Plan<P>) -> Result<()> {
        for (i, batch) in plan.schedule.batches.into_iter().enumerate() {
            for (j, node) in batch.into_iter().enumerate() {
                log::debug!("applying node {j}, batch {i}: {}", node.name());
                let store_node = node.into_inner();
                (store_node.run)(&self.provider).await?;
            }
        }
        Ok(())
    }
}
