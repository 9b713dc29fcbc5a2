//! Static tool definitions advertised by `tools/list`.
//!
//! The `required` list of each input schema is also what argument
//! validation checks against, so the two cannot drift apart.

use serde_json::{json, Value};

use super::{ToolDefinition, ToolName};

fn string(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn boolean(description: &str) -> Value {
    json!({ "type": "boolean", "description": description })
}

const API_ID: &str = "API identifier (the resource name, e.g. 'echo-api')";
const PRODUCT_ID: &str = "Product identifier (the resource name, e.g. 'starter')";

fn api_id_only() -> Value {
    json!({
        "type": "object",
        "properties": { "apiId": string(API_ID) },
        "required": ["apiId"]
    })
}

fn no_arguments() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Returns the definition of `tool`.
#[allow(clippy::too_many_lines)]
#[must_use]
pub fn definition(tool: ToolName) -> ToolDefinition {
    let (description, input_schema) = match tool {
        ToolName::ListApis => (
            "List all APIs in the API Management service. Returns the current revision of each API.",
            no_arguments(),
        ),
        ToolName::GetApi => (
            "Get the details of an API. Append ';rev=N' to the apiId to read a specific revision.",
            api_id_only(),
        ),
        ToolName::CreateApiFromYaml => (
            "Create or update an API by importing an OpenAPI specification in YAML format. \
             Operations are generated from the contract by API Management.",
            json!({
                "type": "object",
                "properties": {
                    "apiId": string(API_ID),
                    "displayName": string("Display name of the API"),
                    "path": string("URL suffix of the API relative to the gateway base URL"),
                    "yamlContract": string("OpenAPI specification (YAML)"),
                    "description": string("Description of the API"),
                    "serviceUrl": string("URL of the backend service implementing the API"),
                    "protocols": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["http", "https", "ws", "wss"] },
                        "description": "Protocols the API is exposed on (default: https)"
                    },
                    "subscriptionRequired": boolean("Whether calls need a subscription key")
                },
                "required": ["apiId", "displayName", "path", "yamlContract"]
            }),
        ),
        ToolName::CreateApiVersion => (
            "Create a new version of an existing API. The API is placed in a version set \
             (created or updated as needed) and the new version copies the source API's operations.",
            json!({
                "type": "object",
                "properties": {
                    "apiId": string("Identifier of the existing API to version"),
                    "versionId": string("Version label, e.g. 'v2'. The new API is named '<apiId>-<versionId>'"),
                    "displayName": string("Display name of the new version"),
                    "description": string("Description of the new version"),
                    "versioningScheme": {
                        "type": "string",
                        "enum": ["Segment", "Header", "Query"],
                        "description": "Where clients put the version (default: Segment)"
                    },
                    "versionHeaderName": string("Header carrying the version (Header scheme, default 'Api-Version')"),
                    "versionQueryName": string("Query parameter carrying the version (Query scheme, default 'api-version')"),
                    "versionSetId": string("Version set identifier (default: the source API's set, else '<apiId>-versions')")
                },
                "required": ["apiId", "versionId", "displayName"]
            }),
        ),
        ToolName::ListApiVersions => (
            "List all versions of an API, i.e. the APIs sharing its version set.",
            api_id_only(),
        ),
        ToolName::CreateApiRevision => (
            "Create a new revision of an API. The revision copies the current revision and is \
             not made current.",
            json!({
                "type": "object",
                "properties": {
                    "apiId": string(API_ID),
                    "apiRevision": {
                        "type": ["string", "integer"],
                        "description": "Revision number (default: next free number)"
                    },
                    "description": string("Description of the revision")
                },
                "required": ["apiId"]
            }),
        ),
        ToolName::ListApiRevisions => ("List all revisions of an API.", api_id_only()),
        ToolName::GetApiOperations => ("List the operations of an API.", api_id_only()),
        ToolName::CreateGrpcApiFromProto => (
            "Create or update a gRPC API by importing a Protobuf (.proto) definition.",
            json!({
                "type": "object",
                "properties": {
                    "apiId": string(API_ID),
                    "displayName": string("Display name of the API"),
                    "path": string("URL suffix of the API relative to the gateway base URL"),
                    "protoContent": string("Protobuf definition (.proto file content)"),
                    "description": string("Description of the API"),
                    "serviceUrl": string("URL of the gRPC backend service")
                },
                "required": ["apiId", "displayName", "path", "protoContent"]
            }),
        ),
        ToolName::ListProducts => (
            "List all products in the API Management service.",
            no_arguments(),
        ),
        ToolName::GetProduct => (
            "Get the details of a product.",
            json!({
                "type": "object",
                "properties": { "productId": string(PRODUCT_ID) },
                "required": ["productId"]
            }),
        ),
        ToolName::CreateProduct => (
            "Create or update a product.",
            json!({
                "type": "object",
                "properties": {
                    "productId": string(PRODUCT_ID),
                    "displayName": string("Display name of the product"),
                    "description": string("Description of the product"),
                    "subscriptionRequired": boolean("Whether APIs in the product need a subscription key (default: true)"),
                    "approvalRequired": boolean("Whether subscriptions need administrator approval"),
                    "subscriptionsLimit": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Maximum number of simultaneous subscriptions per user"
                    },
                    "state": {
                        "type": "string",
                        "enum": ["published", "notPublished"],
                        "description": "Publication state (default: notPublished)"
                    },
                    "terms": string("Terms of use shown to subscribing developers")
                },
                "required": ["productId", "displayName"]
            }),
        ),
        ToolName::AddApiToProduct => (
            "Add an API to a product.",
            json!({
                "type": "object",
                "properties": {
                    "productId": string(PRODUCT_ID),
                    "apiId": string(API_ID)
                },
                "required": ["productId", "apiId"]
            }),
        ),
        ToolName::GetApiProducts => (
            "List the products an API belongs to.",
            api_id_only(),
        ),
        ToolName::ListSubscriptions => (
            "List all subscriptions. Subscription keys are not included.",
            no_arguments(),
        ),
        ToolName::CreateSubscription => (
            "Create a subscription. The scope is the product if productId is given, else the API \
             if apiId is given, else the explicit scope, else all APIs.",
            json!({
                "type": "object",
                "properties": {
                    "displayName": string("Display name of the subscription"),
                    "subscriptionId": string("Subscription identifier (default: generated)"),
                    "productId": string("Product the subscription grants access to"),
                    "apiId": string("API the subscription grants access to"),
                    "scope": string("Explicit scope: '/apis', '/apis/{apiId}' or '/products/{productId}'"),
                    "state": {
                        "type": "string",
                        "enum": ["suspended", "active", "expired", "submitted", "rejected", "cancelled"],
                        "description": "Initial state (default: submitted)"
                    },
                    "ownerId": string("Resource ID of the owning user")
                },
                "required": ["displayName"]
            }),
        ),
        ToolName::GetSubscription => (
            "Get the details of a subscription, optionally including its keys.",
            json!({
                "type": "object",
                "properties": {
                    "subscriptionId": string("Subscription identifier"),
                    "includeKeys": boolean("Include the primary and secondary keys (default: false)")
                },
                "required": ["subscriptionId"]
            }),
        ),
        ToolName::ListBackends => (
            "List all backends in the API Management service.",
            no_arguments(),
        ),
    };

    ToolDefinition {
        name: tool.as_str().to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

/// Returns the required argument names declared by a definition.
pub fn required_arguments(definition: &ToolDefinition) -> impl Iterator<Item = &str> {
    definition
        .input_schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_required_argument_is_a_property() {
        for tool in ToolName::ALL {
            let definition = definition(tool);
            let properties = definition.input_schema["properties"]
                .as_object()
                .unwrap_or_else(|| panic!("{tool} has no properties"));
            for name in required_arguments(&definition) {
                assert!(properties.contains_key(name), "{tool}: {name} not declared");
            }
        }
    }

    #[test]
    fn list_tools_take_no_arguments() {
        for tool in [
            ToolName::ListApis,
            ToolName::ListProducts,
            ToolName::ListSubscriptions,
            ToolName::ListBackends,
        ] {
            assert_eq!(required_arguments(&definition(tool)).count(), 0);
        }
    }

    #[test]
    fn yaml_import_requirements() {
        let definition = definition(ToolName::CreateApiFromYaml);
        let required: Vec<&str> = required_arguments(&definition).collect();
        assert_eq!(required, ["apiId", "displayName", "path", "yamlContract"]);
    }

    #[test]
    fn revision_number_may_be_string_or_integer() {
        let definition = definition(ToolName::CreateApiRevision);
        assert_eq!(
            definition.input_schema["properties"]["apiRevision"]["type"],
            json!(["string", "integer"])
        );
    }
}
