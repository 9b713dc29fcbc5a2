//! Azure API Management access.
//!
//! Tool handlers never talk to Azure directly. They receive an
//! [`ApimBackend`], constructed once at startup and shared read-only:
//!
//! - [`ApimClient`]: the live implementation over the ARM REST API
//! - [`InMemoryApim`]: a self-contained implementation for `--offline`
//!   runs and tests
//!
//! Each method maps to a single APIM management operation. Composite
//! workflows (version set then API, revision numbering) are built by the
//! tool handlers from these primitives.

pub mod apim;
pub mod client;
pub mod credential;
pub mod error;
pub mod memory;
pub mod models;

pub use apim::ApimClient;
pub use error::{ApimError, ApimResult};
pub use memory::InMemoryApim;

use async_trait::async_trait;

use models::{
    ApiCreateOrUpdate, ApiInfo, ApiOperationInfo, ApiRevision, ApiVersionSetInfo,
    ApiVersionSetProperties, BackendInfo, ProductInfo, ProductProperties, ServiceTarget,
    SubscriptionCreate, SubscriptionInfo, SubscriptionKeys,
};

/// The APIM management operations exposed to tool handlers.
#[async_trait]
pub trait ApimBackend: Send + Sync {
    /// Describes the APIM instance this backend manages.
    fn target(&self) -> ServiceTarget;

    /// Lists the current revision of every API.
    async fn list_apis(&self) -> ApimResult<Vec<ApiInfo>>;

    /// Gets one API. `api_id` may carry a `;rev=N` suffix.
    async fn get_api(&self, api_id: &str) -> ApimResult<ApiInfo>;

    /// Creates or updates an API, importing a contract when `format` and
    /// `value` are set.
    async fn create_or_update_api(
        &self,
        api_id: &str,
        api: &ApiCreateOrUpdate,
    ) -> ApimResult<ApiInfo>;

    /// Lists the revisions of an API.
    async fn list_api_revisions(&self, api_id: &str) -> ApimResult<Vec<ApiRevision>>;

    /// Lists the operations of an API.
    async fn list_api_operations(&self, api_id: &str) -> ApimResult<Vec<ApiOperationInfo>>;

    /// Creates or updates an API version set.
    async fn create_or_update_version_set(
        &self,
        version_set_id: &str,
        version_set: &ApiVersionSetProperties,
    ) -> ApimResult<ApiVersionSetInfo>;

    /// Lists products.
    async fn list_products(&self) -> ApimResult<Vec<ProductInfo>>;

    /// Gets one product.
    async fn get_product(&self, product_id: &str) -> ApimResult<ProductInfo>;

    /// Creates or updates a product.
    async fn create_or_update_product(
        &self,
        product_id: &str,
        product: &ProductProperties,
    ) -> ApimResult<ProductInfo>;

    /// Adds an API to a product and returns the linked API.
    async fn add_api_to_product(&self, product_id: &str, api_id: &str) -> ApimResult<ApiInfo>;

    /// Lists the products an API belongs to.
    async fn list_api_products(&self, api_id: &str) -> ApimResult<Vec<ProductInfo>>;

    /// Lists subscriptions. Keys are never included.
    async fn list_subscriptions(&self) -> ApimResult<Vec<SubscriptionInfo>>;

    /// Gets one subscription. Keys are never included.
    async fn get_subscription(&self, subscription_id: &str) -> ApimResult<SubscriptionInfo>;

    /// Creates or updates a subscription.
    async fn create_or_update_subscription(
        &self,
        subscription_id: &str,
        subscription: &SubscriptionCreate,
    ) -> ApimResult<SubscriptionInfo>;

    /// Reads a subscription's keys.
    async fn list_subscription_secrets(
        &self,
        subscription_id: &str,
    ) -> ApimResult<SubscriptionKeys>;

    /// Lists backends.
    async fn list_backends(&self) -> ApimResult<Vec<BackendInfo>>;
}
