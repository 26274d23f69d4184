//! Lifecycle tests of the CloudFront resources against an in-memory API.
use std::path::PathBuf;

use super::{
    cache_policy::{CookieBehavior, QueryStringBehavior},
    fake::FakeCloudFront,
    function::Runtime,
    monitoring_subscription::SubscriptionStatus,
    policy::CookiesConfig,
    response_headers_policy::{
        FrameOption, FrameOptions, SecurityHeadersConfig, ServerTimingHeadersConfig,
    },
    *,
};
use crate::{Action, Resource};

struct Fixture {
    fake: FakeCloudFront,
    path: PathBuf,
}

impl Fixture {
    fn new(name: &str) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let path = std::env::temp_dir()
            .join("tele-cloudfront-tests")
            .join(name);
        let _ = std::fs::remove_dir_all(&path);
        Fixture {
            fake: FakeCloudFront::default(),
            path,
        }
    }

    fn store(&self) -> Store<CloudFront> {
        let mut store = Store::new(&self.path, CloudFront::from_api(self.fake.clone()));
        register_all(&mut store);
        store
    }

    fn calls(&self) -> Vec<&'static str> {
        self.fake.state().calls.clone()
    }

    fn stored(&self, name: &str) -> serde_json::Value {
        let contents = std::fs::read_to_string(self.path.join(format!("{name}.json"))).unwrap();
        serde_json::from_str(&contents).unwrap()
    }

    fn stored_remote(&self, name: &str, key: &str) -> String {
        self.stored(name)["remote"][key]
            .as_str()
            .unwrap_or_default()
            .to_owned()
    }

    fn is_stored(&self, name: &str) -> bool {
        self.path.join(format!("{name}.json")).exists()
    }
}

async fn apply(mut store: Store<CloudFront>) {
    let plan = store.plan().unwrap();
    log::info!("plan:\n{plan}");
    store.apply(plan).await.unwrap();
}

fn cache_policy(comment: &str) -> CachePolicy {
    let mut policy = CachePolicy::new("assets");
    policy.comment = Some(comment.to_owned());
    let params = &mut policy.parameters_in_cache_key_and_forwarded_to_origin;
    params.cookies_config = CookiesConfig {
        cookie_behavior: CookieBehavior::Whitelist,
        cookies: Some(["session".to_owned()].into_iter().collect()),
    };
    params.enable_accept_encoding_brotli = true;
    params.query_strings_config.query_string_behavior = QueryStringBehavior::All;
    policy
}

fn origin_request_policy() -> OriginRequestPolicy {
    serde_json::from_value(serde_json::json!({
        "name": "forward-everything",
        "cookies_config": {"cookie_behavior": "all"},
        "headers_config": {"header_behavior": "allViewer"},
        "query_strings_config": {"query_string_behavior": "all"}
    }))
    .unwrap()
}

fn response_headers_policy() -> ResponseHeadersPolicy {
    ResponseHeadersPolicy {
        name: "security".into(),
        security_headers_config: Some(SecurityHeadersConfig {
            frame_options: Some(FrameOptions {
                frame_option: FrameOption::Deny,
                r#override: true,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn public_key() -> PublicKey {
    PublicKey {
        encoded_key: "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n".into(),
        ..Default::default()
    }
}

fn function(code: &str) -> Function {
    Function {
        code: code.to_owned(),
        comment: "rewrites directory requests".into(),
        name: "index-rewrite".into(),
        publish: true,
        runtime: Runtime::CloudfrontJs20,
    }
}

#[tokio::test]
async fn cache_policy_create_load_update_destroy() {
    let fx = Fixture::new("cache_policy_lifecycle");

    let mut store = fx.store();
    let policy = store.resource("cache", cache_policy("v1")).unwrap();
    assert_eq!(Action::Create, policy.action());
    apply(store).await;
    assert_eq!(vec!["CreateCachePolicy", "GetCachePolicy"], fx.calls());
    let id = fx.stored_remote("cache", "id");
    let etag = fx.stored_remote("cache", "etag");
    assert!(!id.is_empty());

    // unchanged, nothing is sent
    let mut store = fx.store();
    let policy = store.resource("cache", cache_policy("v1")).unwrap();
    assert_eq!(Action::Load, policy.action());
    apply(store).await;
    assert_eq!(2, fx.calls().len());

    let mut store = fx.store();
    let policy = store.resource("cache", cache_policy("v2")).unwrap();
    assert_eq!(Action::Update, policy.action());
    apply(store).await;
    assert_eq!(1, fx.fake.state().count("UpdateCachePolicy"));
    assert_eq!(id, fx.stored_remote("cache", "id"));
    assert_ne!(etag, fx.stored_remote("cache", "etag"));
    {
        let state = fx.fake.state();
        let (_, config) = &state.cache_policies.rows[&id];
        assert_eq!(Some("v2"), config.comment());
    }

    // declaring nothing deletes the orphan
    apply(fx.store()).await;
    assert_eq!(1, fx.fake.state().count("DeleteCachePolicy"));
    assert!(fx.fake.state().cache_policies.rows.is_empty());
    assert!(!fx.is_stored("cache"));
}

#[tokio::test]
async fn refresh_recreates_vanished_and_reverts_drift() {
    let fx = Fixture::new("refresh");

    let mut store = fx.store();
    store.resource("origin", origin_request_policy()).unwrap();
    apply(store).await;
    let first_id = fx.stored_remote("origin", "id");

    // without refresh the store is trusted
    fx.fake.state().origin_request_policies.rows.clear();
    let mut store = fx.store();
    store.resource("origin", origin_request_policy()).unwrap();
    apply(store).await;
    assert_eq!(first_id, fx.stored_remote("origin", "id"));

    let mut store = fx.store().with_refresh(true);
    store.resource("origin", origin_request_policy()).unwrap();
    apply(store).await;
    let second_id = fx.stored_remote("origin", "id");
    assert_ne!(first_id, second_id);
    assert_eq!(2, fx.fake.state().count("CreateOriginRequestPolicy"));

    fx.fake
        .state()
        .origin_request_policies
        .tamper(&second_id, "ETAG-CONSOLE", |config| {
            let mut policy = OriginRequestPolicy::flatten(config).unwrap();
            policy.comment = Some("edited in the console".into());
            policy.expand().unwrap()
        });
    let mut store = fx.store().with_refresh(true);
    store.resource("origin", origin_request_policy()).unwrap();
    apply(store).await;
    let state = fx.fake.state();
    assert_eq!(1, state.count("UpdateOriginRequestPolicy"));
    let (etag, config) = &state.origin_request_policies.rows[&second_id];
    assert_ne!("ETAG-CONSOLE", etag);
    assert_eq!(None, config.comment());
}

#[tokio::test]
async fn invalid_definitions_never_reach_the_api() {
    let fx = Fixture::new("invalid");
    let mut store = fx.store();

    let empty = ResponseHeadersPolicy {
        name: "empty".into(),
        ..Default::default()
    };
    let err = store.resource("empty", empty).unwrap_err();
    assert!(matches!(err, crate::Error::Invalid { .. }), "{err}");

    let timing = ResponseHeadersPolicy {
        name: "timing".into(),
        server_timing_headers_config: Some(ServerTimingHeadersConfig {
            enabled: true,
            sampling_rate: -1.0,
        }),
        ..Default::default()
    };
    assert!(store.resource("timing", timing).is_err());

    store.resource("security", response_headers_policy()).unwrap();
    apply(store).await;
    assert_eq!(
        vec!["CreateResponseHeadersPolicy", "GetResponseHeadersPolicy"],
        fx.calls()
    );
}

#[tokio::test]
async fn public_key_keeps_its_identity_until_the_key_changes() {
    let fx = Fixture::new("public_key");

    let mut store = fx.store();
    store.resource("key", public_key()).unwrap();
    apply(store).await;
    let id = fx.stored_remote("key", "id");
    let name = fx.stored_remote("key", "name");
    let caller_reference = fx.stored_remote("key", "caller_reference");
    assert!(name.starts_with("tf-"), "{name}");
    assert_eq!("tf-", fx.stored_remote("key", "name_prefix"));

    let mut store = fx.store();
    let key = store
        .resource(
            "key",
            PublicKey {
                comment: Some("signs downloads".into()),
                ..public_key()
            },
        )
        .unwrap();
    assert_eq!(Action::Update, key.action());
    apply(store).await;
    assert_eq!(id, fx.stored_remote("key", "id"));
    assert_eq!(name, fx.stored_remote("key", "name"));
    assert_eq!(caller_reference, fx.stored_remote("key", "caller_reference"));

    let mut store = fx.store();
    let key = store
        .resource(
            "key",
            PublicKey {
                comment: Some("signs downloads".into()),
                encoded_key: "-----BEGIN PUBLIC KEY-----\nBBBB\n-----END PUBLIC KEY-----\n"
                    .into(),
                ..public_key()
            },
        )
        .unwrap();
    assert_eq!(Action::Replace, key.action());
    apply(store).await;
    let state = fx.fake.state();
    assert_eq!(1, state.count("DeletePublicKey"));
    assert!(!state.public_keys.rows.contains_key(&id));
    assert_eq!(1, state.public_keys.rows.len());
    assert_ne!(id, fx.stored_remote("key", "id"));
}

#[tokio::test]
async fn function_is_published_after_changes() {
    let fx = Fixture::new("function");

    let mut store = fx.store();
    store
        .resource("fn", function("function handler(e) { return e.request; }"))
        .unwrap();
    apply(store).await;
    assert_eq!(1, fx.fake.state().count("PublishFunction"));
    let live = fx.stored_remote("fn", "live_stage_etag");
    assert!(!live.is_empty());
    assert_eq!(
        crate::utils::sha256_hex("function handler(e) { return e.request; }"),
        fx.stored_remote("fn", "code_sha256")
    );

    let mut store = fx.store();
    store
        .resource("fn", function("function handler(e) { return e.response; }"))
        .unwrap();
    apply(store).await;
    {
        let state = fx.fake.state();
        assert_eq!(1, state.count("UpdateFunction"));
        assert_eq!(2, state.count("PublishFunction"));
        let (_, _, code) = state.functions["index-rewrite"].live.as_ref().unwrap();
        assert_eq!(b"function handler(e) { return e.response; }".to_vec(), *code);
    }
    assert_ne!(live, fx.stored_remote("fn", "live_stage_etag"));

    // only the publish flag changes, the code is left alone
    let unpublished = Function {
        publish: false,
        ..function("function handler(e) { return e.response; }")
    };
    let mut store = fx.store();
    let f = store.resource("fn", unpublished).unwrap();
    assert_eq!(Action::Update, f.action());
    apply(store).await;
    let state = fx.fake.state();
    assert_eq!(1, state.count("UpdateFunction"));
    assert_eq!(2, state.count("PublishFunction"));
}

#[tokio::test]
async fn unpublished_function_has_no_live_stage() {
    let fx = Fixture::new("unpublished_function");
    let mut store = fx.store();
    store
        .resource(
            "fn",
            Function {
                publish: false,
                ..function("function handler(e) { return e.request; }")
            },
        )
        .unwrap();
    apply(store).await;
    assert_eq!(0, fx.fake.state().count("PublishFunction"));
    assert!(fx.stored("fn")["remote"]["live_stage_etag"].is_null());
}

#[tokio::test]
async fn monitoring_subscription_imports_by_distribution_id() {
    let fx = Fixture::new("monitoring_import");
    let existing = monitoring_subscription::Subscription::new(SubscriptionStatus::Enabled);
    fx.fake
        .state()
        .subscriptions
        .insert("E1ABCDEF".into(), existing.expand().unwrap());

    let mut store = fx.store();
    let subscription = store
        .import(
            "metrics",
            MonitoringSubscription::new("E1ABCDEF".to_owned(), SubscriptionStatus::Enabled),
            "E1ABCDEF",
        )
        .unwrap();
    assert_eq!(Action::Read, subscription.action());
    apply(store).await;
    assert_eq!(vec!["GetMonitoringSubscription"], fx.calls());
    assert_eq!("E1ABCDEF", fx.stored_remote("metrics", "distribution_id"));

    // imported resources are declared normally afterwards
    let mut store = fx.store();
    let subscription = store
        .resource(
            "metrics",
            MonitoringSubscription::new("E1ABCDEF".to_owned(), SubscriptionStatus::Disabled),
        )
        .unwrap();
    assert_eq!(Action::Update, subscription.action());
    apply(store).await;
    let state = fx.fake.state();
    let stored = monitoring_subscription::Subscription::flatten(&state.subscriptions["E1ABCDEF"])
        .unwrap();
    assert_eq!(SubscriptionStatus::Disabled, stored.status());
}

#[tokio::test]
async fn imported_policy_is_brought_in_line_and_then_left_alone() {
    let fx = Fixture::new("import_reconciles");
    fx.fake.state().cache_policies.rows.insert(
        "CP-CONSOLE".into(),
        (
            "ETAG-CONSOLE".into(),
            cache_policy("made in the console").expand().unwrap(),
        ),
    );

    let mut store = fx.store();
    let policy = store
        .import("cache", cache_policy("declared"), "CP-CONSOLE")
        .unwrap();
    assert_eq!(Action::Read, policy.action());
    apply(store).await;
    {
        let state = fx.fake.state();
        assert_eq!(1, state.count("UpdateCachePolicy"));
        assert_eq!(0, state.count("CreateCachePolicy"));
        let (etag, config) = &state.cache_policies.rows["CP-CONSOLE"];
        assert_ne!("ETAG-CONSOLE", etag);
        assert_eq!(Some("declared"), config.comment());
        assert_eq!(etag, &fx.stored_remote("cache", "etag"));
    }
    assert_eq!("CP-CONSOLE", fx.stored_remote("cache", "id"));

    // the next run finds nothing to do
    let calls = fx.calls().len();
    let mut store = fx.store();
    let policy = store.resource("cache", cache_policy("declared")).unwrap();
    assert_eq!(Action::Load, policy.action());
    apply(store).await;
    assert_eq!(calls, fx.calls().len());
}

#[tokio::test]
async fn subscription_import_must_name_the_declared_distribution() {
    let fx = Fixture::new("import_other_distribution");
    let existing = monitoring_subscription::Subscription::new(SubscriptionStatus::Enabled);
    fx.fake
        .state()
        .subscriptions
        .insert("E2".into(), existing.expand().unwrap());

    let mut store = fx.store();
    store
        .import(
            "metrics",
            MonitoringSubscription::new("E1".to_owned(), SubscriptionStatus::Enabled),
            "E2",
        )
        .unwrap();
    let plan = store.plan().unwrap();
    let err = store.apply(plan).await.unwrap_err();
    assert!(err.to_string().contains("distribution_id"), "{err}");
    assert!(!fx.is_stored("metrics"));
    let state = fx.fake.state();
    assert_eq!(0, state.count("CreateMonitoringSubscription"));
    assert_eq!(vec!["E2"], state.subscriptions.keys().collect::<Vec<_>>());
}

#[tokio::test]
async fn importing_nothing_is_an_error() {
    let fx = Fixture::new("import_missing");
    let mut store = fx.store();
    store
        .import(
            "metrics",
            MonitoringSubscription::new("E404".to_owned(), SubscriptionStatus::Enabled),
            "E404",
        )
        .unwrap();
    let plan = store.plan().unwrap();
    let err = store.apply(plan).await.unwrap_err();
    assert!(matches!(err, crate::Error::ImportMissing { .. }), "{err}");
    assert!(!fx.is_stored("metrics"));
}

#[tokio::test]
async fn deleting_what_is_already_gone_succeeds() {
    let fx = Fixture::new("already_gone");
    let mut store = fx.store();
    store.resource("cache", cache_policy("v1")).unwrap();
    store.resource("key", public_key()).unwrap();
    apply(store).await;

    fx.fake.state().cache_policies.rows.clear();
    let mut store = fx.store();
    store.destroy::<CachePolicy>("cache").unwrap();
    store.destroy::<PublicKey>("key").unwrap();
    apply(store).await;
    assert!(!fx.is_stored("cache"));
    assert!(!fx.is_stored("key"));
    assert!(fx.fake.state().public_keys.rows.is_empty());
}

#[tokio::test]
async fn stale_etags_are_rejected() {
    let fx = Fixture::new("stale_etag");
    let mut store = fx.store();
    store.resource("security", response_headers_policy()).unwrap();
    apply(store).await;
    let id = fx.stored_remote("security", "id");
    fx.fake
        .state()
        .response_headers_policies
        .tamper(&id, "ETAG-ELSEWHERE", Clone::clone);

    let mut store = fx.store();
    store
        .resource(
            "security",
            ResponseHeadersPolicy {
                comment: Some("now with a comment".into()),
                ..response_headers_policy()
            },
        )
        .unwrap();
    let plan = store.plan().unwrap();
    let err = store.apply(plan).await.unwrap_err();
    assert!(err.to_string().contains("PreconditionFailed"), "{err}");
}

#[test]
fn every_stored_attribute_is_in_the_schema() {
    fn check<T: Resource>(schema: &schema::Schema, definition: &T) {
        let value = serde_json::to_value(definition).unwrap();
        for key in value.as_object().unwrap().keys() {
            let attribute = schema
                .attribute(key)
                .unwrap_or_else(|| panic!("{} is missing '{key}'", schema.type_name));
            assert!(attribute.is_configurable(), "{key} is computed");
        }
    }

    check(&cache_policy::SCHEMA, &cache_policy("all"));
    check(&origin_request_policy::SCHEMA, &origin_request_policy());
    check(&response_headers_policy::SCHEMA, &response_headers_policy());
    check(
        &public_key::SCHEMA,
        &PublicKey {
            comment: Some("c".into()),
            name: Some("n".into()),
            ..public_key()
        },
    );
    check(&function::SCHEMA, &function("code"));
    check(
        &monitoring_subscription::SCHEMA,
        &MonitoringSubscription::new("E1".to_owned(), SubscriptionStatus::Enabled),
    );

    let mut names: Vec<_> = schemas().iter().map(|s| s.type_name).collect();
    names.sort();
    names.dedup();
    assert_eq!(6, names.len());
}
