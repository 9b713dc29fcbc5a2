//! [`ApimBackend`] over the Azure Resource Manager REST API.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use crate::azure::client::ArmClient;
use crate::azure::credential::{ClientSecretCredential, TokenCredential};
use crate::azure::error::ApimResult;
use crate::azure::models::{
    ApiCreateOrUpdate, ApiInfo, ApiOperationInfo, ApiProperties, ApiRevision, ApiVersionSetInfo,
    ApiVersionSetProperties, ArmResource, BackendInfo, BackendProperties, OperationProperties,
    ProductInfo, ProductProperties, Resource, ServiceTarget, SubscriptionCreate,
    SubscriptionInfo, SubscriptionKeys, SubscriptionProperties,
};
use crate::azure::ApimBackend;
use crate::config::AzureSettings;

/// ARM request bodies wrap entity fields in `properties`.
#[derive(Serialize)]
struct Envelope<'a, P> {
    properties: &'a P,
}

fn flatten<P>(items: Vec<ArmResource<P>>) -> Vec<Resource<P>> {
    items.into_iter().map(Resource::from).collect()
}

/// Live APIM backend.
pub struct ApimClient {
    arm: ArmClient,
    target: ServiceTarget,
}

impl ApimClient {
    /// Creates a client authenticating with the service principal in
    /// `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the
    /// management endpoint is unusable.
    pub fn new(settings: &AzureSettings) -> ApimResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let credential = Arc::new(ClientSecretCredential::new(http.clone(), settings));
        Self::with_credential(http, credential, settings)
    }

    /// Creates a client with a caller-supplied credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the management endpoint is unusable.
    pub fn with_credential(
        http: reqwest::Client,
        credential: Arc<dyn TokenCredential>,
        settings: &AzureSettings,
    ) -> ApimResult<Self> {
        Ok(Self {
            arm: ArmClient::new(http, credential, settings)?,
            target: ServiceTarget {
                kind: "azure",
                service_name: settings.service_name.clone(),
                subscription_id: Some(settings.subscription_id.clone()),
                resource_group: Some(settings.resource_group.clone()),
                management_endpoint: Some(settings.management_endpoint.clone()),
                api_version: Some(settings.api_version.clone()),
            },
        })
    }
}

#[async_trait]
impl ApimBackend for ApimClient {
    fn target(&self) -> ServiceTarget {
        self.target.clone()
    }

    async fn list_apis(&self) -> ApimResult<Vec<ApiInfo>> {
        let apis: Vec<ArmResource<ApiProperties>> = self.arm.list(&["apis"]).await?;
        Ok(flatten(apis))
    }

    async fn get_api(&self, api_id: &str) -> ApimResult<ApiInfo> {
        let api: ArmResource<ApiProperties> = self.arm.get(&["apis", api_id]).await?;
        Ok(api.into())
    }

    async fn create_or_update_api(
        &self,
        api_id: &str,
        api: &ApiCreateOrUpdate,
    ) -> ApimResult<ApiInfo> {
        let created: ArmResource<ApiProperties> = self
            .arm
            .put(&["apis", api_id], &Envelope { properties: api })
            .await?;
        Ok(created.into())
    }

    async fn list_api_revisions(&self, api_id: &str) -> ApimResult<Vec<ApiRevision>> {
        self.arm.list(&["apis", api_id, "revisions"]).await
    }

    async fn list_api_operations(&self, api_id: &str) -> ApimResult<Vec<ApiOperationInfo>> {
        let operations: Vec<ArmResource<OperationProperties>> =
            self.arm.list(&["apis", api_id, "operations"]).await?;
        Ok(flatten(operations))
    }

    async fn create_or_update_version_set(
        &self,
        version_set_id: &str,
        version_set: &ApiVersionSetProperties,
    ) -> ApimResult<ApiVersionSetInfo> {
        let created: ArmResource<ApiVersionSetProperties> = self
            .arm
            .put(
                &["apiVersionSets", version_set_id],
                &Envelope {
                    properties: version_set,
                },
            )
            .await?;
        Ok(created.into())
    }

    async fn list_products(&self) -> ApimResult<Vec<ProductInfo>> {
        let products: Vec<ArmResource<ProductProperties>> =
            self.arm.list(&["products"]).await?;
        Ok(flatten(products))
    }

    async fn get_product(&self, product_id: &str) -> ApimResult<ProductInfo> {
        let product: ArmResource<ProductProperties> =
            self.arm.get(&["products", product_id]).await?;
        Ok(product.into())
    }

    async fn create_or_update_product(
        &self,
        product_id: &str,
        product: &ProductProperties,
    ) -> ApimResult<ProductInfo> {
        let created: ArmResource<ProductProperties> = self
            .arm
            .put(&["products", product_id], &Envelope { properties: product })
            .await?;
        Ok(created.into())
    }

    async fn add_api_to_product(&self, product_id: &str, api_id: &str) -> ApimResult<ApiInfo> {
        let linked: ArmResource<ApiProperties> = self
            .arm
            .put(&["products", product_id, "apis", api_id], &json!({}))
            .await?;
        Ok(linked.into())
    }

    async fn list_api_products(&self, api_id: &str) -> ApimResult<Vec<ProductInfo>> {
        let products: Vec<ArmResource<ProductProperties>> =
            self.arm.list(&["apis", api_id, "products"]).await?;
        Ok(flatten(products))
    }

    async fn list_subscriptions(&self) -> ApimResult<Vec<SubscriptionInfo>> {
        let subscriptions: Vec<ArmResource<SubscriptionProperties>> =
            self.arm.list(&["subscriptions"]).await?;
        Ok(flatten(subscriptions))
    }

    async fn get_subscription(&self, subscription_id: &str) -> ApimResult<SubscriptionInfo> {
        let subscription: ArmResource<SubscriptionProperties> =
            self.arm.get(&["subscriptions", subscription_id]).await?;
        Ok(subscription.into())
    }

    async fn create_or_update_subscription(
        &self,
        subscription_id: &str,
        subscription: &SubscriptionCreate,
    ) -> ApimResult<SubscriptionInfo> {
        let created: ArmResource<SubscriptionProperties> = self
            .arm
            .put(
                &["subscriptions", subscription_id],
                &Envelope {
                    properties: subscription,
                },
            )
            .await?;
        Ok(created.into())
    }

    async fn list_subscription_secrets(
        &self,
        subscription_id: &str,
    ) -> ApimResult<SubscriptionKeys> {
        self.arm
            .post(&["subscriptions", subscription_id, "listSecrets"])
            .await
    }

    async fn list_backends(&self) -> ApimResult<Vec<BackendInfo>> {
        let backends: Vec<ArmResource<BackendProperties>> =
            self.arm.list(&["backends"]).await?;
        Ok(flatten(backends))
    }
}
