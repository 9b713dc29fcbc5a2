//! APIM entities as exposed to MCP clients.
//!
//! ARM wraps every entity as `{id, name, properties: {...}}`. Clients get the
//! flattened form `{id, name, ...properties}`; property names keep ARM's
//! camelCase spelling so results can be compared with the Azure portal and
//! CLI output directly.

use serde::{Deserialize, Serialize};

/// ARM envelope for a resource, as sent over the wire by Azure.
#[derive(Debug, Clone, Deserialize)]
pub struct ArmResource<P> {
    /// Full ARM resource ID.
    pub id: String,
    /// Resource name (the APIM entity identifier).
    pub name: String,
    /// Entity properties.
    pub properties: P,
}

/// Flattened resource returned to MCP clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource<P> {
    /// Full ARM resource ID (or `/kind/name` for the in-memory backend).
    pub id: String,
    /// Entity identifier.
    pub name: String,
    /// Entity properties, flattened into the same object.
    #[serde(flatten)]
    pub properties: P,
}

impl<P> From<ArmResource<P>> for Resource<P> {
    fn from(resource: ArmResource<P>) -> Self {
        Self {
            id: resource.id,
            name: resource.name,
            properties: resource.properties,
        }
    }
}

/// An API.
pub type ApiInfo = Resource<ApiProperties>;
/// A product.
pub type ProductInfo = Resource<ProductProperties>;
/// A subscription.
pub type SubscriptionInfo = Resource<SubscriptionProperties>;
/// A backend.
pub type BackendInfo = Resource<BackendProperties>;
/// An operation of an API.
pub type ApiOperationInfo = Resource<OperationProperties>;
/// An API version set.
pub type ApiVersionSetInfo = Resource<ApiVersionSetProperties>;

/// API contract properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProperties {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// URL suffix relative to the gateway base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Backend service URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    /// Accepted protocols (`http`, `https`, `ws`, `wss`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
    /// API type (`http`, `soap`, `websocket`, `graphql`, `grpc`).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub api_type: Option<String>,
    /// Version label when the API belongs to a version set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Version set resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version_set_id: Option<String>,
    /// Revision number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_revision: Option<String>,
    /// Whether this revision is the current one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_current: Option<bool>,
    /// Whether this revision is reachable through the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
    /// Whether calls need a subscription key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_required: Option<bool>,
}

/// Body of an API create-or-update call, covering plain creation, contract
/// import, versions and revisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCreateOrUpdate {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// URL suffix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Backend service URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    /// Accepted protocols.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
    /// API type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub api_type: Option<String>,
    /// Contract format for imports (`openapi`, `grpc`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Contract content for imports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Version label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Version set resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version_set_id: Option<String>,
    /// Description of the revision being created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_revision_description: Option<String>,
    /// Resource ID of the API to copy operations and settings from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_api_id: Option<String>,
    /// Whether calls need a subscription key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_required: Option<bool>,
}

/// One member of an API's version set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiVersion {
    /// API resource ID.
    pub id: String,
    /// API identifier.
    pub name: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Version label; `None` for the original, unversioned API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Version set resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version_set_id: Option<String>,
    /// URL suffix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Whether this revision is the current one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_current: Option<bool>,
}

impl From<ApiInfo> for ApiVersion {
    fn from(api: ApiInfo) -> Self {
        Self {
            id: api.id,
            name: api.name,
            display_name: api.properties.display_name,
            api_version: api.properties.api_version,
            api_version_set_id: api.properties.api_version_set_id,
            path: api.properties.path,
            is_current: api.properties.is_current,
        }
    }
}

/// A revision of an API. ARM returns these unwrapped, without an envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRevision {
    /// Revision-qualified API identifier, e.g. `/apis/echo;rev=2`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_id: Option<String>,
    /// Revision number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_revision: Option<String>,
    /// Creation timestamp (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    /// Last update timestamp (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_date_time: Option<String>,
    /// Revision description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Gateway URL reaching this specific revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_url: Option<String>,
    /// Whether this revision is reachable through the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
    /// Whether this revision is the current one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_current: Option<bool>,
}

/// API version set properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiVersionSetProperties {
    /// Display name.
    pub display_name: String,
    /// `Segment`, `Header` or `Query`.
    pub versioning_scheme: String,
    /// Header carrying the version for the `Header` scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_header_name: Option<String>,
    /// Query parameter carrying the version for the `Query` scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_query_name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Operation contract properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationProperties {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// HTTP method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// URL template, e.g. `/users/{id}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_template: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Product contract properties; also the body of a product create call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductProperties {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Terms of use shown to developers subscribing to the product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms: Option<String>,
    /// Whether APIs in the product need a subscription key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_required: Option<bool>,
    /// Whether subscriptions need administrator approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_required: Option<bool>,
    /// Maximum simultaneous subscriptions per user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriptions_limit: Option<u32>,
    /// `published` or `notPublished`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Subscription contract properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionProperties {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Scope: `/apis`, `/apis/{apiId}` or `/products/{productId}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// `active`, `suspended`, `submitted`, `rejected`, `cancelled`, `expired`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Owning user resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Creation timestamp (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    /// Primary key, only present when secrets were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    /// Secondary key, only present when secrets were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_key: Option<String>,
}

/// Body of a subscription create call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCreate {
    /// Display name.
    pub display_name: String,
    /// Scope the subscription grants access to.
    pub scope: String,
    /// Initial state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Owning user resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

/// Subscription keys returned by the `listSecrets` action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionKeys {
    /// Primary key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    /// Secondary key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_key: Option<String>,
}

/// Backend contract properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendProperties {
    /// Runtime URL of the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// `http` or `soap`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Management URI of the backing Azure resource, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

/// Non-secret description of the APIM instance a backend talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTarget {
    /// `azure` or `in-memory`.
    pub kind: &'static str,
    /// APIM service name.
    pub service_name: String,
    /// Azure subscription.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    /// Resource group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    /// ARM endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_endpoint: Option<String>,
    /// ARM API version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn arm_envelope_is_flattened() {
        let arm: ArmResource<ApiProperties> = serde_json::from_value(json!({
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.ApiManagement/service/svc/apis/echo",
            "name": "echo",
            "type": "Microsoft.ApiManagement/service/apis",
            "properties": {
                "displayName": "Echo API",
                "path": "echo",
                "protocols": ["https"],
                "type": "http",
                "isCurrent": true,
                "apiRevision": "1"
            }
        }))
        .unwrap();

        let api: ApiInfo = arm.into();
        let value = serde_json::to_value(&api).unwrap();
        assert_eq!(value["name"], "echo");
        assert_eq!(value["displayName"], "Echo API");
        assert_eq!(value["type"], "http");
        assert_eq!(value["isCurrent"], true);
        assert!(value.get("properties").is_none());
        assert!(value.get("serviceUrl").is_none());
    }

    #[test]
    fn flattened_resource_reads_back() {
        let product = ProductInfo {
            id: "/products/starter".to_string(),
            name: "starter".to_string(),
            properties: ProductProperties {
                display_name: Some("Starter".to_string()),
                subscriptions_limit: Some(1),
                ..ProductProperties::default()
            },
        };
        let text = serde_json::to_string(&product).unwrap();
        let back: ProductInfo = serde_json::from_str(&text).unwrap();
        assert_eq!(back, product);
    }

    #[test]
    fn api_version_from_api() {
        let api = ApiInfo {
            id: "/apis/echo-v2".to_string(),
            name: "echo-v2".to_string(),
            properties: ApiProperties {
                api_version: Some("v2".to_string()),
                api_version_set_id: Some("/apiVersionSets/echo-versions".to_string()),
                ..ApiProperties::default()
            },
        };
        let version = ApiVersion::from(api);
        assert_eq!(version.name, "echo-v2");
        assert_eq!(version.api_version.as_deref(), Some("v2"));
    }

    #[test]
    fn import_body_uses_arm_names() {
        let body = ApiCreateOrUpdate {
            format: Some("openapi".to_string()),
            value: Some("openapi: 3.0.0".to_string()),
            api_type: Some("http".to_string()),
            ..ApiCreateOrUpdate::default()
        };
        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value, json!({"type": "http", "format": "openapi", "value": "openapi: 3.0.0"}));
    }
}
