//! Typed tool arguments.
//!
//! Required-key presence is checked against the tool's input schema before
//! these structs are deserialized, so a failure here means a value has the
//! wrong type or an enum value is unknown.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::ToolName;

/// Arguments naming a single API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiIdArgs {
    pub api_id: String,
}

/// Arguments naming a single product.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductIdArgs {
    pub product_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiFromYamlArgs {
    pub api_id: String,
    pub display_name: String,
    pub path: String,
    pub yaml_contract: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default)]
    pub protocols: Option<Vec<String>>,
    #[serde(default)]
    pub subscription_required: Option<bool>,
}

/// How clients select a version within a version set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum VersioningScheme {
    /// `/path/{version}/...`
    #[default]
    Segment,
    /// A request header carries the version.
    Header,
    /// A query parameter carries the version.
    Query,
}

impl VersioningScheme {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Segment => "Segment",
            Self::Header => "Header",
            Self::Query => "Query",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiVersionArgs {
    /// The existing API the new version is derived from.
    pub api_id: String,
    /// Version label, e.g. `v2`.
    pub version_id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub versioning_scheme: Option<VersioningScheme>,
    #[serde(default)]
    pub version_header_name: Option<String>,
    #[serde(default)]
    pub version_query_name: Option<String>,
    #[serde(default)]
    pub version_set_id: Option<String>,
}

/// A revision number given either as `"3"` or `3`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum RevisionNumber {
    Number(u64),
    Text(String),
}

fn revision_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(
        Option::<RevisionNumber>::deserialize(deserializer)?.map(|revision| match revision {
            RevisionNumber::Number(n) => n.to_string(),
            RevisionNumber::Text(s) => s,
        }),
    )
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiRevisionArgs {
    pub api_id: String,
    /// Revision number; the next free number when absent.
    #[serde(default, deserialize_with = "revision_number")]
    pub api_revision: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGrpcApiArgs {
    pub api_id: String,
    pub display_name: String,
    pub path: String,
    pub proto_content: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub service_url: Option<String>,
}

/// Publication state of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProductState {
    Published,
    NotPublished,
}

impl ProductState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::NotPublished => "notPublished",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductArgs {
    pub product_id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subscription_required: Option<bool>,
    #[serde(default)]
    pub approval_required: Option<bool>,
    #[serde(default)]
    pub subscriptions_limit: Option<u32>,
    #[serde(default)]
    pub state: Option<ProductState>,
    #[serde(default)]
    pub terms: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddApiToProductArgs {
    pub product_id: String,
    pub api_id: String,
}

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Suspended,
    Active,
    Expired,
    Submitted,
    Rejected,
    Cancelled,
}

impl SubscriptionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Suspended => "suspended",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Submitted => "submitted",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionArgs {
    pub display_name: String,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub api_id: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<SubscriptionState>,
    #[serde(default)]
    pub owner_id: Option<String>,
}

impl CreateSubscriptionArgs {
    /// The subscription scope: a product, else an API, else an explicit
    /// scope, else all APIs.
    #[must_use]
    pub fn resolved_scope(&self) -> String {
        if let Some(product_id) = &self.product_id {
            format!("/products/{product_id}")
        } else if let Some(api_id) = &self.api_id {
            format!("/apis/{api_id}")
        } else {
            self.scope.clone().unwrap_or_else(|| "/apis".to_string())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSubscriptionArgs {
    pub subscription_id: String,
    #[serde(default)]
    pub include_keys: bool,
}

/// A validated tool call, ready to run.
#[derive(Debug, Clone)]
pub enum ToolInvocation {
    ListApis,
    GetApi(ApiIdArgs),
    CreateApiFromYaml(CreateApiFromYamlArgs),
    CreateApiVersion(CreateApiVersionArgs),
    ListApiVersions(ApiIdArgs),
    CreateApiRevision(CreateApiRevisionArgs),
    ListApiRevisions(ApiIdArgs),
    GetApiOperations(ApiIdArgs),
    CreateGrpcApiFromProto(CreateGrpcApiArgs),
    ListProducts,
    GetProduct(ProductIdArgs),
    CreateProduct(CreateProductArgs),
    AddApiToProduct(AddApiToProductArgs),
    GetApiProducts(ApiIdArgs),
    ListSubscriptions,
    CreateSubscription(CreateSubscriptionArgs),
    GetSubscription(GetSubscriptionArgs),
    ListBackends,
}

impl ToolInvocation {
    /// Deserializes `arguments` into the argument struct of `tool`.
    ///
    /// # Errors
    ///
    /// Returns the serde error if a value has the wrong type.
    pub fn parse(tool: ToolName, arguments: Value) -> Result<Self, serde_json::Error> {
        fn args<T: DeserializeOwned>(arguments: Value) -> Result<T, serde_json::Error> {
            serde_json::from_value(arguments)
        }

        Ok(match tool {
            ToolName::ListApis => Self::ListApis,
            ToolName::GetApi => Self::GetApi(args(arguments)?),
            ToolName::CreateApiFromYaml => Self::CreateApiFromYaml(args(arguments)?),
            ToolName::CreateApiVersion => Self::CreateApiVersion(args(arguments)?),
            ToolName::ListApiVersions => Self::ListApiVersions(args(arguments)?),
            ToolName::CreateApiRevision => Self::CreateApiRevision(args(arguments)?),
            ToolName::ListApiRevisions => Self::ListApiRevisions(args(arguments)?),
            ToolName::GetApiOperations => Self::GetApiOperations(args(arguments)?),
            ToolName::CreateGrpcApiFromProto => Self::CreateGrpcApiFromProto(args(arguments)?),
            ToolName::ListProducts => Self::ListProducts,
            ToolName::GetProduct => Self::GetProduct(args(arguments)?),
            ToolName::CreateProduct => Self::CreateProduct(args(arguments)?),
            ToolName::AddApiToProduct => Self::AddApiToProduct(args(arguments)?),
            ToolName::GetApiProducts => Self::GetApiProducts(args(arguments)?),
            ToolName::ListSubscriptions => Self::ListSubscriptions,
            ToolName::CreateSubscription => Self::CreateSubscription(args(arguments)?),
            ToolName::GetSubscription => Self::GetSubscription(args(arguments)?),
            ToolName::ListBackends => Self::ListBackends,
        })
    }

    /// The tool this invocation belongs to.
    #[must_use]
    pub const fn tool(&self) -> ToolName {
        match self {
            Self::ListApis => ToolName::ListApis,
            Self::GetApi(_) => ToolName::GetApi,
            Self::CreateApiFromYaml(_) => ToolName::CreateApiFromYaml,
            Self::CreateApiVersion(_) => ToolName::CreateApiVersion,
            Self::ListApiVersions(_) => ToolName::ListApiVersions,
            Self::CreateApiRevision(_) => ToolName::CreateApiRevision,
            Self::ListApiRevisions(_) => ToolName::ListApiRevisions,
            Self::GetApiOperations(_) => ToolName::GetApiOperations,
            Self::CreateGrpcApiFromProto(_) => ToolName::CreateGrpcApiFromProto,
            Self::ListProducts => ToolName::ListProducts,
            Self::GetProduct(_) => ToolName::GetProduct,
            Self::CreateProduct(_) => ToolName::CreateProduct,
            Self::AddApiToProduct(_) => ToolName::AddApiToProduct,
            Self::GetApiProducts(_) => ToolName::GetApiProducts,
            Self::ListSubscriptions => ToolName::ListSubscriptions,
            Self::CreateSubscription(_) => ToolName::CreateSubscription,
            Self::GetSubscription(_) => ToolName::GetSubscription,
            Self::ListBackends => ToolName::ListBackends,
        }
    }
}
