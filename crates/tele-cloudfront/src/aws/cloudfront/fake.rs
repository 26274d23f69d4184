//! An in-memory CloudFront, for tests.
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use aws_sdk_cloudfront::types::{
    CachePolicyConfig, FunctionConfig, FunctionStage, MonitoringSubscription,
    OriginRequestPolicyConfig, PublicKeyConfig, ResponseHeadersPolicyConfig,
};

use super::api::{ApiError, CloudFrontApi, FunctionDescription, Versioned};

fn not_found(operation: &'static str, id: &str) -> ApiError {
    ApiError::NotFound {
        operation,
        code: "NoSuchResource".into(),
        message: format!("{id} was not found"),
    }
}

fn precondition_failed(operation: &'static str, if_match: &str) -> ApiError {
    ApiError::Service {
        operation,
        code: "PreconditionFailed".into(),
        message: format!("IfMatch '{if_match}' does not match the current ETag"),
    }
}

/// Configuration objects keyed by id, along with their current ETag.
pub struct Table<T> {
    pub rows: BTreeMap<String, (String, T)>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Table {
            rows: BTreeMap::new(),
        }
    }
}

impl<T: Clone> Table<T> {
    fn get(&self, operation: &'static str, id: &str) -> Result<Versioned<T>, ApiError> {
        let (etag, value) = self.rows.get(id).ok_or_else(|| not_found(operation, id))?;
        Ok(Versioned {
            id: id.to_owned(),
            etag: etag.clone(),
            value: value.clone(),
        })
    }

    fn put(&mut self, id: String, etag: String, value: T) -> Versioned<T> {
        self.rows.insert(id.clone(), (etag.clone(), value.clone()));
        Versioned { id, etag, value }
    }

    fn check(&self, operation: &'static str, id: &str, if_match: &str) -> Result<(), ApiError> {
        let (etag, _) = self.rows.get(id).ok_or_else(|| not_found(operation, id))?;
        if etag != if_match {
            return Err(precondition_failed(operation, if_match));
        }
        Ok(())
    }

    fn delete(&mut self, operation: &'static str, id: &str, if_match: &str) -> Result<(), ApiError> {
        self.check(operation, id, if_match)?;
        self.rows.remove(id);
        Ok(())
    }

    /// Changes a stored object behind the back of the store, as someone
    /// using the console would.
    pub fn tamper(&mut self, id: &str, etag: &str, f: impl FnOnce(&T) -> T) {
        if let Some(row) = self.rows.get_mut(id) {
            row.1 = f(&row.1);
            row.0 = etag.to_owned();
        }
    }
}

pub struct FakeFunction {
    pub etag: String,
    pub config: FunctionConfig,
    pub code: Vec<u8>,
    pub status: String,
    pub live: Option<(String, FunctionConfig, Vec<u8>)>,
}

#[derive(Default)]
pub struct State {
    counter: usize,
    pub calls: Vec<&'static str>,
    pub cache_policies: Table<CachePolicyConfig>,
    pub origin_request_policies: Table<OriginRequestPolicyConfig>,
    pub response_headers_policies: Table<ResponseHeadersPolicyConfig>,
    pub public_keys: Table<PublicKeyConfig>,
    pub functions: BTreeMap<String, FakeFunction>,
    pub subscriptions: BTreeMap<String, MonitoringSubscription>,
}

impl State {
    fn call(&mut self, operation: &'static str) {
        log::trace!("fake cloudfront: {operation}");
        self.calls.push(operation);
    }

    fn next(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}{:04}", self.counter)
    }

    fn etag(&mut self) -> String {
        self.next("ETAG")
    }

    /// Number of calls made to the given operation.
    pub fn count(&self, operation: &str) -> usize {
        self.calls.iter().filter(|call| **call == operation).count()
    }
}

fn describe(name: &str, function: &FakeFunction, stage: FunctionStage) -> FunctionDescription {
    let (etag, config) = match (&stage, &function.live) {
        (FunctionStage::Live, Some((etag, config, _))) => (etag.clone(), config.clone()),
        _ => (function.etag.clone(), function.config.clone()),
    };
    FunctionDescription {
        name: name.to_owned(),
        arn: format!("arn:aws:cloudfront::000000000000:function/{name}"),
        status: Some(function.status.clone()),
        stage,
        etag,
        config,
    }
}

/// A [`CloudFrontApi`] keeping everything in memory.
///
/// Clones share their state, so a test can keep one to look inside after
/// handing another to a [`super::CloudFront`].
#[derive(Clone, Default)]
pub struct FakeCloudFront {
    state: Arc<Mutex<State>>,
}

impl FakeCloudFront {
    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl CloudFrontApi for FakeCloudFront {
    async fn create_cache_policy(
        &self,
        config: CachePolicyConfig,
    ) -> Result<Versioned<CachePolicyConfig>, ApiError> {
        let mut state = self.state();
        state.call("CreateCachePolicy");
        let (id, etag) = (state.next("CP"), state.etag());
        Ok(state.cache_policies.put(id, etag, config))
    }

    async fn get_cache_policy(&self, id: &str) -> Result<Versioned<CachePolicyConfig>, ApiError> {
        let mut state = self.state();
        state.call("GetCachePolicy");
        state.cache_policies.get("GetCachePolicy", id)
    }

    async fn update_cache_policy(
        &self,
        id: &str,
        if_match: &str,
        config: CachePolicyConfig,
    ) -> Result<Versioned<CachePolicyConfig>, ApiError> {
        let mut state = self.state();
        state.call("UpdateCachePolicy");
        state.cache_policies.check("UpdateCachePolicy", id, if_match)?;
        let etag = state.etag();
        Ok(state.cache_policies.put(id.to_owned(), etag, config))
    }

    async fn delete_cache_policy(&self, id: &str, if_match: &str) -> Result<(), ApiError> {
        let mut state = self.state();
        state.call("DeleteCachePolicy");
        state.cache_policies.delete("DeleteCachePolicy", id, if_match)
    }

    async fn create_origin_request_policy(
        &self,
        config: OriginRequestPolicyConfig,
    ) -> Result<Versioned<OriginRequestPolicyConfig>, ApiError> {
        let mut state = self.state();
        state.call("CreateOriginRequestPolicy");
        let (id, etag) = (state.next("ORP"), state.etag());
        Ok(state.origin_request_policies.put(id, etag, config))
    }

    async fn get_origin_request_policy(
        &self,
        id: &str,
    ) -> Result<Versioned<OriginRequestPolicyConfig>, ApiError> {
        let mut state = self.state();
        state.call("GetOriginRequestPolicy");
        state
            .origin_request_policies
            .get("GetOriginRequestPolicy", id)
    }

    async fn update_origin_request_policy(
        &self,
        id: &str,
        if_match: &str,
        config: OriginRequestPolicyConfig,
    ) -> Result<Versioned<OriginRequestPolicyConfig>, ApiError> {
        let mut state = self.state();
        state.call("UpdateOriginRequestPolicy");
        state
            .origin_request_policies
            .check("UpdateOriginRequestPolicy", id, if_match)?;
        let etag = state.etag();
        Ok(state
            .origin_request_policies
            .put(id.to_owned(), etag, config))
    }

    async fn delete_origin_request_policy(
        &self,
        id: &str,
        if_match: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state();
        state.call("DeleteOriginRequestPolicy");
        state
            .origin_request_policies
            .delete("DeleteOriginRequestPolicy", id, if_match)
    }

    async fn create_response_headers_policy(
        &self,
        config: ResponseHeadersPolicyConfig,
    ) -> Result<Versioned<ResponseHeadersPolicyConfig>, ApiError> {
        let mut state = self.state();
        state.call("CreateResponseHeadersPolicy");
        let (id, etag) = (state.next("RHP"), state.etag());
        Ok(state.response_headers_policies.put(id, etag, config))
    }

    async fn get_response_headers_policy(
        &self,
        id: &str,
    ) -> Result<Versioned<ResponseHeadersPolicyConfig>, ApiError> {
        let mut state = self.state();
        state.call("GetResponseHeadersPolicy");
        state
            .response_headers_policies
            .get("GetResponseHeadersPolicy", id)
    }

    async fn update_response_headers_policy(
        &self,
        id: &str,
        if_match: &str,
        config: ResponseHeadersPolicyConfig,
    ) -> Result<Versioned<ResponseHeadersPolicyConfig>, ApiError> {
        let mut state = self.state();
        state.call("UpdateResponseHeadersPolicy");
        state
            .response_headers_policies
            .check("UpdateResponseHeadersPolicy", id, if_match)?;
        let etag = state.etag();
        Ok(state
            .response_headers_policies
            .put(id.to_owned(), etag, config))
    }

    async fn delete_response_headers_policy(
        &self,
        id: &str,
        if_match: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state();
        state.call("DeleteResponseHeadersPolicy");
        state
            .response_headers_policies
            .delete("DeleteResponseHeadersPolicy", id, if_match)
    }

    async fn create_public_key(
        &self,
        config: PublicKeyConfig,
    ) -> Result<Versioned<PublicKeyConfig>, ApiError> {
        let mut state = self.state();
        state.call("CreatePublicKey");
        let (id, etag) = (state.next("K"), state.etag());
        Ok(state.public_keys.put(id, etag, config))
    }

    async fn get_public_key(&self, id: &str) -> Result<Versioned<PublicKeyConfig>, ApiError> {
        let mut state = self.state();
        state.call("GetPublicKey");
        state.public_keys.get("GetPublicKey", id)
    }

    async fn update_public_key(
        &self,
        id: &str,
        if_match: &str,
        config: PublicKeyConfig,
    ) -> Result<Versioned<PublicKeyConfig>, ApiError> {
        let mut state = self.state();
        state.call("UpdatePublicKey");
        state.public_keys.check("UpdatePublicKey", id, if_match)?;
        let etag = state.etag();
        Ok(state.public_keys.put(id.to_owned(), etag, config))
    }

    async fn delete_public_key(&self, id: &str, if_match: &str) -> Result<(), ApiError> {
        let mut state = self.state();
        state.call("DeletePublicKey");
        state.public_keys.delete("DeletePublicKey", id, if_match)
    }

    async fn create_function(
        &self,
        name: &str,
        config: FunctionConfig,
        code: Vec<u8>,
    ) -> Result<FunctionDescription, ApiError> {
        const OP: &str = "CreateFunction";
        let mut state = self.state();
        state.call(OP);
        if state.functions.contains_key(name) {
            return Err(ApiError::Service {
                operation: OP,
                code: "FunctionAlreadyExists".into(),
                message: format!("{name} already exists"),
            });
        }
        let function = FakeFunction {
            etag: state.etag(),
            config,
            code,
            status: "UNPUBLISHED".into(),
            live: None,
        };
        let description = describe(name, &function, FunctionStage::Development);
        state.functions.insert(name.to_owned(), function);
        Ok(description)
    }

    async fn describe_function(
        &self,
        name: &str,
        stage: FunctionStage,
    ) -> Result<FunctionDescription, ApiError> {
        const OP: &str = "DescribeFunction";
        let mut state = self.state();
        state.call(OP);
        let function = state.functions.get(name).ok_or_else(|| not_found(OP, name))?;
        if stage == FunctionStage::Live && function.live.is_none() {
            return Err(not_found(OP, name));
        }
        Ok(describe(name, function, stage))
    }

    async fn get_function_code(
        &self,
        name: &str,
        stage: FunctionStage,
    ) -> Result<Vec<u8>, ApiError> {
        const OP: &str = "GetFunction";
        let mut state = self.state();
        state.call(OP);
        let function = state.functions.get(name).ok_or_else(|| not_found(OP, name))?;
        match (stage, &function.live) {
            (FunctionStage::Live, Some((_, _, code))) => Ok(code.clone()),
            (FunctionStage::Live, None) => Err(not_found(OP, name)),
            _ => Ok(function.code.clone()),
        }
    }

    async fn update_function(
        &self,
        name: &str,
        if_match: &str,
        config: FunctionConfig,
        code: Vec<u8>,
    ) -> Result<FunctionDescription, ApiError> {
        const OP: &str = "UpdateFunction";
        let mut state = self.state();
        state.call(OP);
        let etag = state.etag();
        let function = state
            .functions
            .get_mut(name)
            .ok_or_else(|| not_found(OP, name))?;
        if function.etag != if_match {
            return Err(precondition_failed(OP, if_match));
        }
        function.etag = etag;
        function.config = config;
        function.code = code;
        function.status = "UNPUBLISHED".into();
        Ok(describe(name, function, FunctionStage::Development))
    }

    async fn publish_function(
        &self,
        name: &str,
        if_match: &str,
    ) -> Result<FunctionDescription, ApiError> {
        const OP: &str = "PublishFunction";
        let mut state = self.state();
        state.call(OP);
        let etag = state.etag();
        let function = state
            .functions
            .get_mut(name)
            .ok_or_else(|| not_found(OP, name))?;
        if function.etag != if_match {
            return Err(precondition_failed(OP, if_match));
        }
        function.live = Some((etag, function.config.clone(), function.code.clone()));
        function.status = "UNASSOCIATED".into();
        let mut description = describe(name, function, FunctionStage::Live);
        description.etag = String::new();
        Ok(description)
    }

    async fn delete_function(&self, name: &str, if_match: &str) -> Result<(), ApiError> {
        const OP: &str = "DeleteFunction";
        let mut state = self.state();
        state.call(OP);
        let function = state.functions.get(name).ok_or_else(|| not_found(OP, name))?;
        if function.etag != if_match {
            return Err(precondition_failed(OP, if_match));
        }
        state.functions.remove(name);
        Ok(())
    }

    async fn create_monitoring_subscription(
        &self,
        distribution_id: &str,
        subscription: MonitoringSubscription,
    ) -> Result<MonitoringSubscription, ApiError> {
        let mut state = self.state();
        state.call("CreateMonitoringSubscription");
        state
            .subscriptions
            .insert(distribution_id.to_owned(), subscription.clone());
        Ok(subscription)
    }

    async fn get_monitoring_subscription(
        &self,
        distribution_id: &str,
    ) -> Result<MonitoringSubscription, ApiError> {
        const OP: &str = "GetMonitoringSubscription";
        let mut state = self.state();
        state.call(OP);
        state
            .subscriptions
            .get(distribution_id)
            .cloned()
            .ok_or_else(|| not_found(OP, distribution_id))
    }

    async fn delete_monitoring_subscription(
        &self,
        distribution_id: &str,
    ) -> Result<(), ApiError> {
        const OP: &str = "DeleteMonitoringSubscription";
        let mut state = self.state();
        state.call(OP);
        state
            .subscriptions
            .remove(distribution_id)
            .map(|_| ())
            .ok_or_else(|| not_found(OP, distribution_id))
    }
}
