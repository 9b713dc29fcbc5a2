//! Self-contained [`ApimBackend`] holding APIM entities in memory.
//!
//! Used by `--offline` runs and tests. It enforces the referential checks
//! Azure enforces (unknown APIs, products and version sets are `NotFound`)
//! but does not interpret imported contracts.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::RwLock;

use crate::azure::error::{ApimError, ApimResult};
use crate::azure::models::{
    ApiCreateOrUpdate, ApiInfo, ApiOperationInfo, ApiProperties, ApiRevision, ApiVersionSetInfo,
    ApiVersionSetProperties, BackendInfo, ProductInfo, ProductProperties, ServiceTarget,
    SubscriptionCreate, SubscriptionInfo, SubscriptionKeys, SubscriptionProperties,
};
use crate::azure::ApimBackend;

const REVISION_SEPARATOR: &str = ";rev=";

#[derive(Default)]
struct State {
    apis: BTreeMap<String, ApiInfo>,
    revisions: BTreeMap<String, Vec<ApiRevision>>,
    operations: BTreeMap<String, Vec<ApiOperationInfo>>,
    version_sets: BTreeMap<String, ApiVersionSetInfo>,
    products: BTreeMap<String, ProductInfo>,
    product_apis: BTreeSet<(String, String)>,
    subscriptions: BTreeMap<String, (SubscriptionInfo, SubscriptionKeys)>,
    backends: BTreeMap<String, BackendInfo>,
}

impl State {
    fn api(&self, api_id: &str) -> ApimResult<&ApiInfo> {
        self.apis
            .get(api_id)
            .ok_or_else(|| ApimError::not_found("API", api_id))
    }

    fn product(&self, product_id: &str) -> ApimResult<&ProductInfo> {
        self.products
            .get(product_id)
            .ok_or_else(|| ApimError::not_found("Product", product_id))
    }

    fn insert_api(&mut self, api: ApiInfo) {
        let revision = ApiRevision {
            api_id: Some(format!("/apis/{}{REVISION_SEPARATOR}1", api.name)),
            api_revision: Some("1".to_string()),
            is_current: Some(true),
            is_online: Some(true),
            ..ApiRevision::default()
        };
        self.revisions.insert(api.name.clone(), vec![revision]);
        self.apis.insert(api.name.clone(), api);
    }
}

fn validation_error(message: impl Into<String>) -> ApimError {
    ApimError::Api {
        status: StatusCode::BAD_REQUEST.as_u16(),
        code: "ValidationError".to_string(),
        message: message.into(),
    }
}

/// Returns the entity name from a resource ID (`/apis/echo` → `echo`).
fn last_segment(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

fn new_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// In-memory APIM instance.
pub struct InMemoryApim {
    service_name: String,
    state: RwLock<State>,
}

impl Default for InMemoryApim {
    fn default() -> Self {
        Self::new("in-memory")
    }
}

impl InMemoryApim {
    /// Creates an empty instance.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            state: RwLock::new(State::default()),
        }
    }

    /// Seeds an API as its first, current revision.
    #[must_use]
    pub fn with_api(mut self, api: ApiInfo) -> Self {
        self.state.get_mut().insert_api(api);
        self
    }

    /// Seeds an operation on an API.
    #[must_use]
    pub fn with_operation(mut self, api_id: &str, operation: ApiOperationInfo) -> Self {
        self.state
            .get_mut()
            .operations
            .entry(api_id.to_string())
            .or_default()
            .push(operation);
        self
    }

    /// Seeds a product.
    #[must_use]
    pub fn with_product(mut self, product: ProductInfo) -> Self {
        self.state
            .get_mut()
            .products
            .insert(product.name.clone(), product);
        self
    }

    /// Seeds a backend.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendInfo) -> Self {
        self.state
            .get_mut()
            .backends
            .insert(backend.name.clone(), backend);
        self
    }

    fn revision_view(api: &ApiInfo, revision: &ApiRevision, full_id: &str) -> ApiInfo {
        let mut view = api.clone();
        view.id = format!("/apis/{full_id}");
        view.name = full_id.to_string();
        view.properties.api_revision.clone_from(&revision.api_revision);
        view.properties.is_current = revision.is_current;
        view.properties.is_online = revision.is_online;
        view
    }

    fn create_revision(
        state: &mut State,
        base: &str,
        revision: &str,
        body: &ApiCreateOrUpdate,
    ) -> ApimResult<ApiInfo> {
        if revision.parse::<u32>().map_or(true, |n| n == 0) {
            return Err(validation_error(format!(
                "Revision '{revision}' must be a positive integer"
            )));
        }

        let api = state.api(base)?.clone();
        let full_id = format!("{base}{REVISION_SEPARATOR}{revision}");
        let revisions = state.revisions.entry(base.to_string()).or_default();

        let index = match revisions
            .iter()
            .position(|r| r.api_revision.as_deref() == Some(revision))
        {
            Some(index) => index,
            None => {
                revisions.push(ApiRevision {
                    api_id: Some(format!("/apis/{full_id}")),
                    api_revision: Some(revision.to_string()),
                    is_current: Some(false),
                    is_online: Some(true),
                    ..ApiRevision::default()
                });
                revisions.len() - 1
            }
        };

        if let Some(description) = &body.api_revision_description {
            revisions[index].description = Some(description.clone());
        }

        Ok(Self::revision_view(&api, &revisions[index], &full_id))
    }

    fn create_api(state: &mut State, api_id: &str, body: &ApiCreateOrUpdate) -> ApimResult<ApiInfo> {
        if let Some(set_id) = &body.api_version_set_id {
            let name = last_segment(set_id);
            if !state.version_sets.contains_key(name) {
                return Err(ApimError::not_found("API version set", name));
            }
        }

        let existing = state.apis.get(api_id).cloned();
        let source = match &body.source_api_id {
            Some(source_id) => {
                let name = last_segment(source_id);
                Some(state.api(name)?.clone())
            }
            None => None,
        };

        let mut properties = existing
            .as_ref()
            .or(source.as_ref())
            .map_or_else(ApiProperties::default, |api| api.properties.clone());

        if existing.is_none() {
            properties.api_version = None;
            properties.api_version_set_id = None;
            properties.api_revision = Some("1".to_string());
            properties.is_current = Some(true);
            properties.is_online = Some(true);
        }

        macro_rules! apply {
            ($($field:ident),*) => {
                $(if let Some(value) = &body.$field {
                    properties.$field = Some(value.clone());
                })*
            };
        }
        apply!(
            display_name,
            path,
            description,
            service_url,
            api_type,
            api_version,
            api_version_set_id,
            subscription_required
        );
        if !body.protocols.is_empty() {
            properties.protocols.clone_from(&body.protocols);
        }
        if properties.protocols.is_empty() {
            properties.protocols = vec!["https".to_string()];
        }
        if properties.api_type.is_none() {
            properties.api_type = Some("http".to_string());
        }

        if properties.display_name.is_none() {
            return Err(validation_error("displayName is required"));
        }
        if properties.path.is_none() {
            return Err(validation_error("path is required"));
        }

        let api = ApiInfo {
            id: format!("/apis/{api_id}"),
            name: api_id.to_string(),
            properties,
        };

        if existing.is_some() {
            state.apis.insert(api_id.to_string(), api.clone());
        } else {
            if let Some(source) = &source {
                let operations = state.operations.get(&source.name).cloned().unwrap_or_default();
                state.operations.insert(api_id.to_string(), operations);
            }
            state.insert_api(api.clone());
        }

        Ok(api)
    }
}

#[async_trait]
impl ApimBackend for InMemoryApim {
    fn target(&self) -> ServiceTarget {
        ServiceTarget {
            kind: "in-memory",
            service_name: self.service_name.clone(),
            subscription_id: None,
            resource_group: None,
            management_endpoint: None,
            api_version: None,
        }
    }

    async fn list_apis(&self) -> ApimResult<Vec<ApiInfo>> {
        Ok(self.state.read().await.apis.values().cloned().collect())
    }

    async fn get_api(&self, api_id: &str) -> ApimResult<ApiInfo> {
        let state = self.state.read().await;

        let Some((base, revision)) = api_id.split_once(REVISION_SEPARATOR) else {
            return state.api(api_id).cloned();
        };

        let api = state.api(base)?;
        state
            .revisions
            .get(base)
            .and_then(|revisions| {
                revisions
                    .iter()
                    .find(|r| r.api_revision.as_deref() == Some(revision))
            })
            .map(|r| Self::revision_view(api, r, api_id))
            .ok_or_else(|| ApimError::not_found("API revision", api_id))
    }

    async fn create_or_update_api(
        &self,
        api_id: &str,
        api: &ApiCreateOrUpdate,
    ) -> ApimResult<ApiInfo> {
        let mut state = self.state.write().await;
        match api_id.split_once(REVISION_SEPARATOR) {
            Some((base, revision)) => Self::create_revision(&mut state, base, revision, api),
            None => Self::create_api(&mut state, api_id, api),
        }
    }

    async fn list_api_revisions(&self, api_id: &str) -> ApimResult<Vec<ApiRevision>> {
        let state = self.state.read().await;
        state.api(api_id)?;
        Ok(state.revisions.get(api_id).cloned().unwrap_or_default())
    }

    async fn list_api_operations(&self, api_id: &str) -> ApimResult<Vec<ApiOperationInfo>> {
        let state = self.state.read().await;
        state.api(api_id)?;
        Ok(state.operations.get(api_id).cloned().unwrap_or_default())
    }

    async fn create_or_update_version_set(
        &self,
        version_set_id: &str,
        version_set: &ApiVersionSetProperties,
    ) -> ApimResult<ApiVersionSetInfo> {
        let info = ApiVersionSetInfo {
            id: format!("/apiVersionSets/{version_set_id}"),
            name: version_set_id.to_string(),
            properties: version_set.clone(),
        };
        self.state
            .write()
            .await
            .version_sets
            .insert(version_set_id.to_string(), info.clone());
        Ok(info)
    }

    async fn list_products(&self) -> ApimResult<Vec<ProductInfo>> {
        Ok(self.state.read().await.products.values().cloned().collect())
    }

    async fn get_product(&self, product_id: &str) -> ApimResult<ProductInfo> {
        self.state.read().await.product(product_id).cloned()
    }

    async fn create_or_update_product(
        &self,
        product_id: &str,
        product: &ProductProperties,
    ) -> ApimResult<ProductInfo> {
        if product.display_name.is_none() {
            return Err(validation_error("displayName is required"));
        }

        let mut properties = product.clone();
        properties.state.get_or_insert_with(|| "notPublished".to_string());
        properties.subscription_required.get_or_insert(true);

        let info = ProductInfo {
            id: format!("/products/{product_id}"),
            name: product_id.to_string(),
            properties,
        };
        self.state
            .write()
            .await
            .products
            .insert(product_id.to_string(), info.clone());
        Ok(info)
    }

    async fn add_api_to_product(&self, product_id: &str, api_id: &str) -> ApimResult<ApiInfo> {
        let mut state = self.state.write().await;
        state.product(product_id)?;
        let api = state.api(api_id)?.clone();
        state
            .product_apis
            .insert((product_id.to_string(), api_id.to_string()));
        Ok(api)
    }

    async fn list_api_products(&self, api_id: &str) -> ApimResult<Vec<ProductInfo>> {
        let state = self.state.read().await;
        state.api(api_id)?;
        Ok(state
            .product_apis
            .iter()
            .filter(|(_, api)| api == api_id)
            .filter_map(|(product, _)| state.products.get(product).cloned())
            .collect())
    }

    async fn list_subscriptions(&self) -> ApimResult<Vec<SubscriptionInfo>> {
        Ok(self
            .state
            .read()
            .await
            .subscriptions
            .values()
            .map(|(info, _)| info.clone())
            .collect())
    }

    async fn get_subscription(&self, subscription_id: &str) -> ApimResult<SubscriptionInfo> {
        self.state
            .read()
            .await
            .subscriptions
            .get(subscription_id)
            .map(|(info, _)| info.clone())
            .ok_or_else(|| ApimError::not_found("Subscription", subscription_id))
    }

    async fn create_or_update_subscription(
        &self,
        subscription_id: &str,
        subscription: &SubscriptionCreate,
    ) -> ApimResult<SubscriptionInfo> {
        let mut state = self.state.write().await;

        let scope = subscription.scope.as_str();
        if let Some(product_id) = scope.strip_prefix("/products/") {
            state.product(product_id)?;
        } else if let Some(api_id) = scope.strip_prefix("/apis/") {
            state.api(api_id)?;
        } else if scope != "/apis" {
            return Err(validation_error(format!(
                "Subscription scope '{scope}' must be /apis, /apis/{{apiId}} or /products/{{productId}}"
            )));
        }

        let info = SubscriptionInfo {
            id: format!("/subscriptions/{subscription_id}"),
            name: subscription_id.to_string(),
            properties: SubscriptionProperties {
                display_name: Some(subscription.display_name.clone()),
                scope: Some(subscription.scope.clone()),
                state: Some(
                    subscription
                        .state
                        .clone()
                        .unwrap_or_else(|| "submitted".to_string()),
                ),
                owner_id: subscription.owner_id.clone(),
                ..SubscriptionProperties::default()
            },
        };

        let keys = state
            .subscriptions
            .get(subscription_id)
            .map_or_else(
                || SubscriptionKeys {
                    primary_key: Some(new_key()),
                    secondary_key: Some(new_key()),
                },
                |(_, keys)| keys.clone(),
            );

        state
            .subscriptions
            .insert(subscription_id.to_string(), (info.clone(), keys));
        Ok(info)
    }

    async fn list_subscription_secrets(
        &self,
        subscription_id: &str,
    ) -> ApimResult<SubscriptionKeys> {
        self.state
            .read()
            .await
            .subscriptions
            .get(subscription_id)
            .map(|(_, keys)| keys.clone())
            .ok_or_else(|| ApimError::not_found("Subscription", subscription_id))
    }

    async fn list_backends(&self) -> ApimResult<Vec<BackendInfo>> {
        Ok(self.state.read().await.backends.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_api() -> ApiInfo {
        ApiInfo {
            id: "/apis/echo".to_string(),
            name: "echo".to_string(),
            properties: ApiProperties {
                display_name: Some("Echo".to_string()),
                path: Some("echo".to_string()),
                ..ApiProperties::default()
            },
        }
    }

    fn starter() -> ProductProperties {
        ProductProperties {
            display_name: Some("Starter".to_string()),
            ..ProductProperties::default()
        }
    }

    #[tokio::test]
    async fn missing_api_is_not_found() {
        let apim = InMemoryApim::default();
        let err = apim.get_api("missing-id").await.unwrap_err();
        assert!(err.to_string().contains("NotFound"));
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn create_api_requires_path() {
        let apim = InMemoryApim::default();
        let body = ApiCreateOrUpdate {
            display_name: Some("Orders".to_string()),
            ..ApiCreateOrUpdate::default()
        };
        let err = apim.create_or_update_api("orders", &body).await.unwrap_err();
        assert!(err.to_string().contains("path is required"));
    }

    #[tokio::test]
    async fn create_from_source_copies_operations() {
        let operation = ApiOperationInfo {
            id: "/apis/echo/operations/get".to_string(),
            name: "get".to_string(),
            properties: crate::azure::models::OperationProperties {
                method: Some("GET".to_string()),
                url_template: Some("/".to_string()),
                ..Default::default()
            },
        };
        let apim = InMemoryApim::default()
            .with_api(echo_api())
            .with_operation("echo", operation);

        let body = ApiCreateOrUpdate {
            source_api_id: Some("/apis/echo".to_string()),
            path: Some("echo-copy".to_string()),
            ..ApiCreateOrUpdate::default()
        };
        let copy = apim.create_or_update_api("echo-copy", &body).await.unwrap();
        assert_eq!(copy.properties.display_name.as_deref(), Some("Echo"));
        assert_eq!(apim.list_api_operations("echo-copy").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn revisions_are_tracked_per_api() {
        let apim = InMemoryApim::default().with_api(echo_api());
        let body = ApiCreateOrUpdate {
            api_revision_description: Some("second".to_string()),
            ..ApiCreateOrUpdate::default()
        };

        let revision = apim.create_or_update_api("echo;rev=2", &body).await.unwrap();
        assert_eq!(revision.name, "echo;rev=2");
        assert_eq!(revision.properties.is_current, Some(false));

        let revisions = apim.list_api_revisions("echo").await.unwrap();
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[1].description.as_deref(), Some("second"));

        assert_eq!(apim.list_apis().await.unwrap().len(), 1);
        assert!(apim.get_api("echo;rev=2").await.is_ok());
        assert!(apim.get_api("echo;rev=9").await.is_err());
    }

    #[tokio::test]
    async fn zero_revision_is_rejected() {
        let apim = InMemoryApim::default().with_api(echo_api());
        let err = apim
            .create_or_update_api("echo;rev=0", &ApiCreateOrUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn unknown_version_set_is_not_found() {
        let apim = InMemoryApim::default();
        let body = ApiCreateOrUpdate {
            display_name: Some("Echo v2".to_string()),
            path: Some("echo".to_string()),
            api_version_set_id: Some("/apiVersionSets/nope".to_string()),
            ..ApiCreateOrUpdate::default()
        };
        let err = apim.create_or_update_api("echo-v2", &body).await.unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn product_defaults_and_links() {
        let apim = InMemoryApim::default().with_api(echo_api());
        let product = apim.create_or_update_product("starter", &starter()).await.unwrap();
        assert_eq!(product.properties.state.as_deref(), Some("notPublished"));
        assert_eq!(product.properties.subscription_required, Some(true));

        apim.add_api_to_product("starter", "echo").await.unwrap();
        let products = apim.list_api_products("echo").await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "starter");

        assert!(apim.add_api_to_product("starter", "missing").await.is_err());
        assert!(apim.add_api_to_product("missing", "echo").await.is_err());
    }

    #[tokio::test]
    async fn subscription_scope_is_checked() {
        let apim = InMemoryApim::default();
        let body = SubscriptionCreate {
            display_name: "Team".to_string(),
            scope: "/products/missing".to_string(),
            ..SubscriptionCreate::default()
        };
        assert!(apim.create_or_update_subscription("s1", &body).await.is_err());

        let body = SubscriptionCreate {
            scope: "/elsewhere".to_string(),
            ..body
        };
        let err = apim.create_or_update_subscription("s1", &body).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn subscription_keys_are_only_listed_on_request() {
        let apim = InMemoryApim::default();
        let body = SubscriptionCreate {
            display_name: "All APIs".to_string(),
            scope: "/apis".to_string(),
            ..SubscriptionCreate::default()
        };
        let created = apim.create_or_update_subscription("s1", &body).await.unwrap();
        assert!(created.properties.primary_key.is_none());
        assert_eq!(created.properties.state.as_deref(), Some("submitted"));

        let keys = apim.list_subscription_secrets("s1").await.unwrap();
        assert_eq!(keys.primary_key.as_ref().map(String::len), Some(32));
        assert_ne!(keys.primary_key, keys.secondary_key);

        apim.create_or_update_subscription("s1", &body).await.unwrap();
        assert_eq!(apim.list_subscription_secrets("s1").await.unwrap(), keys);
    }

    #[test]
    fn last_segment_of_resource_id() {
        assert_eq!(last_segment("/subscriptions/x/apis/echo"), "echo");
        assert_eq!(last_segment("echo"), "echo");
    }
}
