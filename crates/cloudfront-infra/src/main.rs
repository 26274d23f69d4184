//! Manages CloudFront configuration objects declared in a TOML file.
//!
//! ```sh
//! cloudfront-infra -v plan
//! cloudfront-infra apply --refresh
//! cloudfront-infra import cache-policy optimized 658327ea-f89d-4fab-a63d-7e88639e58f6
//! cloudfront-infra schema function
//! cloudfront-infra destroy --force
//! ```
//!
//! Each table of the configuration holds the resources of one kind, keyed by
//! a name that is unique within the kind:
//!
//! ```toml
//! region = "us-east-1"
//!
//! [cache_policy.static]
//! name = "static-assets"
//! min_ttl = 60
//!
//! [cache_policy.static.parameters_in_cache_key_and_forwarded_to_origin]
//! cookies_config = { cookie_behavior = "none" }
//! headers_config = { header_behavior = "none" }
//! query_strings_config = { query_string_behavior = "none" }
//!
//! [function.rewrite]
//! name = "rewrite-index"
//! runtime = "cloudfront-js-2.0"
//! code_file = "functions/rewrite.js"
//! ```
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tele::{
    aws::cloudfront::{
        self, function::Runtime, schema::Schema, CachePolicy, CloudFront, Function,
        MonitoringSubscription, OriginRequestPolicy, PublicKey, ResponseHeadersPolicy,
    },
    Plan, Resource, Store,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ResourceKind {
    CachePolicy,
    OriginRequestPolicy,
    ResponseHeadersPolicy,
    PublicKey,
    Function,
    MonitoringSubscription,
}

impl ResourceKind {
    /// The configuration table of this kind.
    fn table(self) -> &'static str {
        match self {
            ResourceKind::CachePolicy => "cache_policy",
            ResourceKind::OriginRequestPolicy => "origin_request_policy",
            ResourceKind::ResponseHeadersPolicy => "response_headers_policy",
            ResourceKind::PublicKey => "public_key",
            ResourceKind::Function => "function",
            ResourceKind::MonitoringSubscription => "monitoring_subscription",
        }
    }

    fn schema(self) -> &'static Schema {
        match self {
            ResourceKind::CachePolicy => &cloudfront::cache_policy::SCHEMA,
            ResourceKind::OriginRequestPolicy => &cloudfront::origin_request_policy::SCHEMA,
            ResourceKind::ResponseHeadersPolicy => &cloudfront::response_headers_policy::SCHEMA,
            ResourceKind::PublicKey => &cloudfront::public_key::SCHEMA,
            ResourceKind::Function => &cloudfront::function::SCHEMA,
            ResourceKind::MonitoringSubscription => &cloudfront::monitoring_subscription::SCHEMA,
        }
    }

    /// The name of a resource of this kind in the store.
    fn store_name(self, name: &str) -> String {
        format!("{}-{name}", self.table().replace('_', "-"))
    }
}

fn default_publish() -> bool {
    true
}

/// A function whose code is given inline or read from a file.
#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct FunctionDefinition {
    name: String,
    runtime: Runtime,
    #[serde(default)]
    comment: String,
    #[serde(default = "default_publish")]
    publish: bool,
    code: Option<String>,
    /// Relative to the configuration file.
    code_file: Option<PathBuf>,
}

impl FunctionDefinition {
    fn load(self, config_dir: &Path) -> anyhow::Result<Function> {
        let code = match (self.code, self.code_file) {
            (Some(code), None) => code,
            (None, Some(file)) => {
                let path = config_dir.join(file);
                std::fs::read_to_string(&path)
                    .with_context(|| format!("could not read function code from {path:?}"))?
            }
            (Some(_), Some(_)) => {
                anyhow::bail!("function '{}' has both 'code' and 'code_file'", self.name)
            }
            (None, None) => {
                anyhow::bail!("function '{}' needs one of 'code' or 'code_file'", self.name)
            }
        };
        Ok(Function {
            code,
            comment: self.comment,
            name: self.name,
            publish: self.publish,
            runtime: self.runtime,
        })
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    /// Overridden by `--state-dir`.
    state_dir: Option<PathBuf>,
    region: Option<String>,
    profile: Option<String>,
    #[serde(default)]
    cache_policy: BTreeMap<String, CachePolicy>,
    #[serde(default)]
    origin_request_policy: BTreeMap<String, OriginRequestPolicy>,
    #[serde(default)]
    response_headers_policy: BTreeMap<String, ResponseHeadersPolicy>,
    #[serde(default)]
    public_key: BTreeMap<String, PublicKey>,
    #[serde(default)]
    function: BTreeMap<String, FunctionDefinition>,
    #[serde(default)]
    monitoring_subscription: BTreeMap<String, MonitoringSubscription>,
}

impl Config {
    fn read(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("could not read configuration {path:?}"))?;
        toml::from_str(&contents).with_context(|| format!("could not parse {path:?}"))
    }
}

/// A resource to import instead of create.
struct Import {
    kind: ResourceKind,
    name: String,
    id: String,
}

/// Declares the definitions of one kind, returning whether the import
/// target was among them.
fn declare_kind<T>(
    store: &mut Store<CloudFront>,
    kind: ResourceKind,
    definitions: impl IntoIterator<Item = (String, T)>,
    import: Option<&Import>,
) -> anyhow::Result<bool>
where
    T: Resource<Provider = CloudFront>,
{
    let mut imported = false;
    for (name, definition) in definitions {
        let id = kind.store_name(&name);
        match import {
            Some(import) if import.kind == kind && import.name == name => {
                store.import(&id, definition, import.id.clone())?;
                imported = true;
            }
            _ => {
                store.resource(&id, definition)?;
            }
        }
    }
    Ok(imported)
}

fn declare(
    store: &mut Store<CloudFront>,
    config: Config,
    config_dir: &Path,
    import: Option<&Import>,
) -> anyhow::Result<()> {
    let functions = config
        .function
        .into_iter()
        .map(|(name, definition)| Ok((name, definition.load(config_dir)?)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let imported = [
        declare_kind(store, ResourceKind::CachePolicy, config.cache_policy, import)?,
        declare_kind(
            store,
            ResourceKind::OriginRequestPolicy,
            config.origin_request_policy,
            import,
        )?,
        declare_kind(
            store,
            ResourceKind::ResponseHeadersPolicy,
            config.response_headers_policy,
            import,
        )?,
        declare_kind(store, ResourceKind::PublicKey, config.public_key, import)?,
        declare_kind(store, ResourceKind::Function, functions, import)?,
        declare_kind(
            store,
            ResourceKind::MonitoringSubscription,
            config.monitoring_subscription,
            import,
        )?,
    ];

    if let Some(import) = import {
        anyhow::ensure!(
            imported.contains(&true),
            "there is no [{}.{}] in the configuration to import into",
            import.kind.table(),
            import.name
        );
    }
    Ok(())
}

#[derive(Subcommand)]
enum Command {
    /// Show what would change without applying.
    ///
    /// Only the store is consulted, CloudFront is not read.
    Plan,
    /// Plan and apply changes.
    Apply {
        /// Read every stored resource back from CloudFront, re-creating
        /// what was deleted and reverting drift.
        #[clap(long)]
        refresh: bool,
    },
    /// Delete every stored resource.
    Destroy {
        /// Required to actually delete, otherwise the plan is only printed.
        #[clap(long, short)]
        force: bool,
    },
    /// Adopt an existing resource under the name of its definition.
    Import {
        kind: ResourceKind,
        /// The key of the definition in the configuration.
        name: String,
        /// The CloudFront id, function name or distribution id.
        id: String,
    },
    /// Print the attributes of a resource kind.
    Schema { kind: ResourceKind },
}

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Sets the verbosity level
    #[clap(short, action = clap::ArgAction::Count, global = true)]
    verbosity: u8,

    /// The TOML configuration declaring the resources.
    #[clap(long, env = "CLOUDFRONT_INFRA_CONFIG", default_value = "infra.toml")]
    config: PathBuf,

    /// Directory of the store files.
    #[clap(long, env = "CLOUDFRONT_INFRA_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

async fn run(store: &mut Store<CloudFront>, plan: Plan<CloudFront>) -> anyhow::Result<()> {
    println!("Plan:\n{plan}");
    if plan.has_changes() || plan.refresh {
        println!("Applying...");
        store.apply(plan).await?;
        println!("Done.");
    }
    Ok(())
}

#[::tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli {
        verbosity,
        config: config_path,
        state_dir,
        command,
    } = Cli::parse();

    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("tele", level)
        .filter_module("cloudfront_infra", level)
        .init();

    if let Command::Schema { kind } = command {
        print!("{}", kind.schema());
        return Ok(());
    }

    let config = Config::read(&config_path)?;
    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let state_dir = state_dir
        .or_else(|| config.state_dir.clone())
        .unwrap_or_else(|| config_dir.join("state"));
    log::debug!("using store directory {state_dir:?}");

    let sdk_config = tele::aws::load_config(config.region.clone(), config.profile.clone()).await;
    let refresh = matches!(command, Command::Apply { refresh: true });
    let mut store = Store::new(&state_dir, CloudFront::new(&sdk_config)).with_refresh(refresh);
    cloudfront::register_all(&mut store);

    match command {
        Command::Plan => {
            declare(&mut store, config, &config_dir, None)?;
            println!("Plan:\n{}", store.plan()?);
        }
        Command::Apply { .. } => {
            declare(&mut store, config, &config_dir, None)?;
            let plan = store.plan()?;
            run(&mut store, plan).await?;
        }
        Command::Import { kind, name, id } => {
            let import = Import { kind, name, id };
            declare(&mut store, config, &config_dir, Some(&import))?;
            let plan = store.plan()?;
            run(&mut store, plan).await?;
        }
        Command::Destroy { force } => {
            // Nothing is declared, so every stored resource is an orphan.
            let plan = store.plan()?;
            if force {
                run(&mut store, plan).await?;
            } else {
                println!("Plan:\n{plan}");
                println!("Please call `destroy --force` to delete these resources.");
            }
        }
        Command::Schema { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    const CONFIG: &str = r#"
        region = "eu-west-1"

        [cache_policy.static]
        name = "static-assets"
        min_ttl = 60

        [cache_policy.static.parameters_in_cache_key_and_forwarded_to_origin]
        cookies_config = { cookie_behavior = "none" }
        headers_config = { header_behavior = "none" }
        query_strings_config = { query_string_behavior = "none" }

        [function.rewrite]
        name = "rewrite-index"
        runtime = "cloudfront-js-2.0"
        code = "function handler(event) { return event.request; }"

        [monitoring_subscription.site]
        distribution_id = "E2QWRUHAPOMQZL"
        monitoring_subscription.realtime_metrics_subscription_config.realtime_metrics_subscription_status = "Enabled"
    "#;

    #[test]
    fn config_tables_are_keyed_by_kind() {
        let config: Config = toml::from_str(CONFIG).unwrap();
        assert_eq!(Some("eu-west-1"), config.region.as_deref());
        assert_eq!(60, config.cache_policy["static"].min_ttl);
        assert!(config.public_key.is_empty());
        let function = config
            .function
            .into_values()
            .next()
            .unwrap()
            .load(Path::new("."))
            .unwrap();
        assert!(function.publish);
        assert_eq!(Runtime::CloudfrontJs20, function.runtime);
    }

    #[test]
    fn function_code_comes_from_exactly_one_place() {
        let both: FunctionDefinition = toml::from_str(
            r#"
            name = "f"
            runtime = "cloudfront-js-1.0"
            code = "x"
            code_file = "f.js"
            "#,
        )
        .unwrap();
        assert!(both.load(Path::new(".")).is_err());

        let neither: FunctionDefinition =
            toml::from_str("name = \"f\"\nruntime = \"cloudfront-js-1.0\"").unwrap();
        let err = neither.load(Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("needs one of"), "{err}");
    }

    #[test]
    fn store_names_are_unique_across_kinds() {
        let names: Vec<_> = ResourceKind::value_variants()
            .iter()
            .map(|kind| kind.store_name("main"))
            .collect();
        assert_eq!("cache-policy-main", names[0]);
        let unique: std::collections::BTreeSet<_> = names.iter().collect();
        assert_eq!(names.len(), unique.len());
    }

    #[test]
    fn only_apply_reads_cloudfront_back() {
        assert!(Cli::try_parse_from(["cloudfront-infra", "plan", "--refresh"]).is_err());
        let cli = Cli::try_parse_from(["cloudfront-infra", "apply", "--refresh"]).unwrap();
        assert!(matches!(cli.command, Command::Apply { refresh: true }));
    }
}
