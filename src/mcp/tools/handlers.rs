//! Tool handlers.
//!
//! Each handler maps its arguments onto one or two backend calls and
//! returns the backend's entities. Failures are returned unmodified; the
//! dispatcher turns them into `isError` results.

use serde::Serialize;
use serde_json::Value;

use super::args::{
    CreateApiFromYamlArgs, CreateApiRevisionArgs, CreateApiVersionArgs, CreateGrpcApiArgs,
    CreateProductArgs, CreateSubscriptionArgs, GetSubscriptionArgs, ToolInvocation,
    VersioningScheme,
};
use super::ToolError;
use crate::azure::models::{
    ApiCreateOrUpdate, ApiInfo, ApiVersion, ApiVersionSetProperties, ProductInfo,
    ProductProperties, SubscriptionCreate, SubscriptionInfo,
};
use crate::azure::{ApimBackend, ApimError, ApimResult};

const DEFAULT_VERSION_HEADER: &str = "Api-Version";
const DEFAULT_VERSION_QUERY: &str = "api-version";

fn to_value<T: Serialize>(value: T) -> Result<Value, ToolError> {
    Ok(serde_json::to_value(value)?)
}

/// Runs a validated invocation against `backend`.
pub(super) async fn run(
    backend: &dyn ApimBackend,
    invocation: ToolInvocation,
) -> Result<Value, ToolError> {
    match invocation {
        ToolInvocation::ListApis => to_value(backend.list_apis().await?),
        ToolInvocation::GetApi(args) => to_value(backend.get_api(&args.api_id).await?),
        ToolInvocation::CreateApiFromYaml(args) => {
            to_value(create_api_from_yaml(backend, args).await?)
        }
        ToolInvocation::CreateApiVersion(args) => {
            to_value(create_api_version(backend, args).await?)
        }
        ToolInvocation::ListApiVersions(args) => {
            to_value(list_api_versions(backend, &args.api_id).await?)
        }
        ToolInvocation::CreateApiRevision(args) => {
            to_value(create_api_revision(backend, args).await?)
        }
        ToolInvocation::ListApiRevisions(args) => {
            to_value(backend.list_api_revisions(&args.api_id).await?)
        }
        ToolInvocation::GetApiOperations(args) => {
            to_value(backend.list_api_operations(&args.api_id).await?)
        }
        ToolInvocation::CreateGrpcApiFromProto(args) => {
            to_value(create_grpc_api(backend, args).await?)
        }
        ToolInvocation::ListProducts => to_value(backend.list_products().await?),
        ToolInvocation::GetProduct(args) => to_value(backend.get_product(&args.product_id).await?),
        ToolInvocation::CreateProduct(args) => to_value(create_product(backend, args).await?),
        ToolInvocation::AddApiToProduct(args) => to_value(
            backend
                .add_api_to_product(&args.product_id, &args.api_id)
                .await?,
        ),
        ToolInvocation::GetApiProducts(args) => {
            to_value(backend.list_api_products(&args.api_id).await?)
        }
        ToolInvocation::ListSubscriptions => to_value(backend.list_subscriptions().await?),
        ToolInvocation::CreateSubscription(args) => {
            to_value(create_subscription(backend, args).await?)
        }
        ToolInvocation::GetSubscription(args) => to_value(get_subscription(backend, args).await?),
        ToolInvocation::ListBackends => to_value(backend.list_backends().await?),
    }
}

async fn create_api_from_yaml(
    backend: &dyn ApimBackend,
    args: CreateApiFromYamlArgs,
) -> ApimResult<ApiInfo> {
    let body = ApiCreateOrUpdate {
        display_name: Some(args.display_name),
        path: Some(args.path),
        description: args.description,
        service_url: args.service_url,
        protocols: args.protocols.unwrap_or_else(|| vec!["https".to_string()]),
        api_type: Some("http".to_string()),
        format: Some("openapi".to_string()),
        value: Some(args.yaml_contract),
        subscription_required: args.subscription_required,
        ..ApiCreateOrUpdate::default()
    };
    backend.create_or_update_api(&args.api_id, &body).await
}

async fn create_grpc_api(backend: &dyn ApimBackend, args: CreateGrpcApiArgs) -> ApimResult<ApiInfo> {
    let body = ApiCreateOrUpdate {
        display_name: Some(args.display_name),
        path: Some(args.path),
        description: args.description,
        service_url: args.service_url,
        protocols: vec!["https".to_string()],
        api_type: Some("grpc".to_string()),
        format: Some("grpc".to_string()),
        value: Some(args.proto_content),
        ..ApiCreateOrUpdate::default()
    };
    backend.create_or_update_api(&args.api_id, &body).await
}

/// Returns the entity name of a resource ID.
fn resource_name(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

async fn create_api_version(
    backend: &dyn ApimBackend,
    args: CreateApiVersionArgs,
) -> ApimResult<ApiInfo> {
    let source = backend.get_api(&args.api_id).await?;
    let scheme = args.versioning_scheme.unwrap_or_default();

    let version_set_id = args
        .version_set_id
        .or_else(|| {
            source
                .properties
                .api_version_set_id
                .as_deref()
                .map(|id| resource_name(id).to_string())
        })
        .unwrap_or_else(|| format!("{}-versions", args.api_id));

    let version_set = ApiVersionSetProperties {
        display_name: source
            .properties
            .display_name
            .clone()
            .unwrap_or_else(|| args.api_id.clone()),
        versioning_scheme: scheme.as_str().to_string(),
        version_header_name: (scheme == VersioningScheme::Header).then(|| {
            args.version_header_name
                .unwrap_or_else(|| DEFAULT_VERSION_HEADER.to_string())
        }),
        version_query_name: (scheme == VersioningScheme::Query).then(|| {
            args.version_query_name
                .unwrap_or_else(|| DEFAULT_VERSION_QUERY.to_string())
        }),
        description: None,
    };

    let version_set = backend
        .create_or_update_version_set(&version_set_id, &version_set)
        .await?;
    tracing::debug!(version_set = %version_set.name, "Version set ready");

    let body = ApiCreateOrUpdate {
        display_name: Some(args.display_name),
        path: source.properties.path.clone(),
        description: args.description.or(source.properties.description),
        service_url: source.properties.service_url,
        protocols: source.properties.protocols,
        api_type: source.properties.api_type,
        api_version: Some(args.version_id.clone()),
        api_version_set_id: Some(version_set.id),
        source_api_id: Some(source.id),
        subscription_required: source.properties.subscription_required,
        ..ApiCreateOrUpdate::default()
    };

    let version_api_id = format!("{}-{}", args.api_id, args.version_id);
    backend.create_or_update_api(&version_api_id, &body).await
}

async fn list_api_versions(backend: &dyn ApimBackend, api_id: &str) -> ApimResult<Vec<ApiVersion>> {
    let api = backend.get_api(api_id).await?;

    let Some(version_set_id) = api.properties.api_version_set_id.clone() else {
        return Ok(vec![ApiVersion::from(api)]);
    };

    // ARM resource IDs compare case-insensitively.
    Ok(backend
        .list_apis()
        .await?
        .into_iter()
        .filter(|candidate| {
            candidate
                .properties
                .api_version_set_id
                .as_deref()
                .is_some_and(|id| id.eq_ignore_ascii_case(&version_set_id))
        })
        .map(ApiVersion::from)
        .collect())
}

async fn create_api_revision(
    backend: &dyn ApimBackend,
    args: CreateApiRevisionArgs,
) -> ApimResult<ApiInfo> {
    let revision = match args.api_revision {
        Some(revision) => {
            if !revision.parse::<u32>().is_ok_and(|n| n > 0) {
                return Err(ApimError::invalid_argument(
                    "apiRevision",
                    format!("'{revision}' is not a positive integer"),
                ));
            }
            revision
        }
        None => {
            let revisions = backend.list_api_revisions(&args.api_id).await?;
            let latest = revisions
                .iter()
                .filter_map(|r| r.api_revision.as_deref()?.parse::<u32>().ok())
                .max()
                .unwrap_or(1);
            latest
                .checked_add(1)
                .ok_or_else(|| {
                    ApimError::invalid_argument(
                        "apiRevision",
                        format!("revision {latest} is the highest allowed; give a number explicitly"),
                    )
                })?
                .to_string()
        }
    };

    let current = backend.get_api(&args.api_id).await?;
    let body = ApiCreateOrUpdate {
        path: current.properties.path,
        service_url: current.properties.service_url,
        api_revision_description: args.description,
        source_api_id: Some(current.id),
        ..ApiCreateOrUpdate::default()
    };

    let revision_id = format!("{};rev={revision}", args.api_id);
    backend.create_or_update_api(&revision_id, &body).await
}

async fn create_product(
    backend: &dyn ApimBackend,
    args: CreateProductArgs,
) -> ApimResult<ProductInfo> {
    let product = ProductProperties {
        display_name: Some(args.display_name),
        description: args.description,
        terms: args.terms,
        subscription_required: args.subscription_required,
        approval_required: args.approval_required,
        subscriptions_limit: args.subscriptions_limit,
        state: args.state.map(|state| state.as_str().to_string()),
    };
    backend
        .create_or_update_product(&args.product_id, &product)
        .await
}

async fn create_subscription(
    backend: &dyn ApimBackend,
    args: CreateSubscriptionArgs,
) -> ApimResult<SubscriptionInfo> {
    let scope = args.resolved_scope();
    let subscription_id = args
        .subscription_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    let subscription = SubscriptionCreate {
        display_name: args.display_name,
        scope,
        state: args.state.map(|state| state.as_str().to_string()),
        owner_id: args.owner_id,
    };
    backend
        .create_or_update_subscription(&subscription_id, &subscription)
        .await
}

async fn get_subscription(
    backend: &dyn ApimBackend,
    args: GetSubscriptionArgs,
) -> ApimResult<SubscriptionInfo> {
    let mut subscription = backend.get_subscription(&args.subscription_id).await?;

    if args.include_keys {
        let keys = backend
            .list_subscription_secrets(&args.subscription_id)
            .await?;
        subscription.properties.primary_key = keys.primary_key;
        subscription.properties.secondary_key = keys.secondary_key;
    }

    Ok(subscription)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::azure::models::{ApiProperties, ProductProperties};
    use crate::azure::InMemoryApim;

    fn echo() -> ApiInfo {
        ApiInfo {
            id: "/apis/echo".to_string(),
            name: "echo".to_string(),
            properties: ApiProperties {
                display_name: Some("Echo".to_string()),
                path: Some("echo".to_string()),
                service_url: Some("https://echo.example.com".to_string()),
                ..ApiProperties::default()
            },
        }
    }

    async fn call(backend: &InMemoryApim, invocation: ToolInvocation) -> Result<Value, ToolError> {
        run(backend, invocation).await
    }

    fn invocation(tool: &str, arguments: Value) -> ToolInvocation {
        let tool = tool.parse().unwrap();
        ToolInvocation::parse(tool, arguments).unwrap()
    }

    #[tokio::test]
    async fn yaml_import_sets_format_and_default_protocol() {
        let apim = InMemoryApim::default();
        let value = call(
            &apim,
            invocation(
                "create_api_from_yaml",
                json!({
                    "apiId": "orders", "displayName": "Orders", "path": "orders",
                    "yamlContract": "openapi: 3.0.1"
                }),
            ),
        )
        .await
        .unwrap();

        assert_eq!(value["name"], "orders");
        assert_eq!(value["protocols"], json!(["https"]));
        assert_eq!(value["type"], "http");
    }

    #[tokio::test]
    async fn grpc_import_is_typed_grpc() {
        let apim = InMemoryApim::default();
        let value = call(
            &apim,
            invocation(
                "create_grpc_api_from_proto",
                json!({
                    "apiId": "greeter", "displayName": "Greeter", "path": "greeter",
                    "protoContent": "syntax = \"proto3\";"
                }),
            ),
        )
        .await
        .unwrap();
        assert_eq!(value["type"], "grpc");
    }

    #[tokio::test]
    async fn version_joins_a_version_set() {
        let apim = InMemoryApim::default().with_api(echo());
        let value = call(
            &apim,
            invocation(
                "create_api_version",
                json!({"apiId": "echo", "versionId": "v2", "displayName": "Echo v2",
                       "versioningScheme": "Header"}),
            ),
        )
        .await
        .unwrap();

        assert_eq!(value["name"], "echo-v2");
        assert_eq!(value["apiVersion"], "v2");
        assert_eq!(value["apiVersionSetId"], "/apiVersionSets/echo-versions");
        assert_eq!(value["path"], "echo");
        assert_eq!(value["serviceUrl"], "https://echo.example.com");

        let versions = list_api_versions(&apim, "echo-v2").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].api_version.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn second_version_reuses_the_set() {
        let apim = InMemoryApim::default().with_api(echo());
        for version in ["v2", "v3"] {
            call(
                &apim,
                invocation(
                    "create_api_version",
                    json!({"apiId": "echo", "versionId": version, "displayName": version}),
                ),
            )
            .await
            .unwrap();
        }

        let versions = list_api_versions(&apim, "echo-v3").await.unwrap();
        let names: Vec<&str> = versions.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["echo-v2", "echo-v3"]);
    }

    #[tokio::test]
    async fn unversioned_api_lists_itself() {
        let apim = InMemoryApim::default().with_api(echo());
        let versions = list_api_versions(&apim, "echo").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].name, "echo");
        assert_eq!(versions[0].api_version, None);
    }

    #[tokio::test]
    async fn revision_number_defaults_to_next() {
        let apim = InMemoryApim::default().with_api(echo());

        let value = call(&apim, invocation("create_api_revision", json!({"apiId": "echo"})))
            .await
            .unwrap();
        assert_eq!(value["name"], "echo;rev=2");

        let value = call(
            &apim,
            invocation("create_api_revision", json!({"apiId": "echo", "description": "third"})),
        )
        .await
        .unwrap();
        assert_eq!(value["apiRevision"], "3");
    }

    #[tokio::test]
    async fn invalid_revision_number_is_a_tool_error() {
        let apim = InMemoryApim::default().with_api(echo());
        let err = call(
            &apim,
            invocation("create_api_revision", json!({"apiId": "echo", "apiRevision": "two"})),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("apiRevision"));
    }

    #[tokio::test]
    async fn next_revision_after_the_largest_number_is_an_error() {
        let apim = InMemoryApim::default().with_api(echo());
        call(
            &apim,
            invocation("create_api_revision", json!({"apiId": "echo", "apiRevision": "4294967295"})),
        )
        .await
        .unwrap();

        let err = call(&apim, invocation("create_api_revision", json!({"apiId": "echo"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Backend(ApimError::InvalidArgument { .. })));
        assert!(err.to_string().contains("apiRevision"));
    }

    #[tokio::test]
    async fn subscription_gets_generated_id_and_product_scope() {
        let apim = InMemoryApim::default();
        apim.create_or_update_product(
            "starter",
            &ProductProperties {
                display_name: Some("Starter".to_string()),
                ..ProductProperties::default()
            },
        )
        .await
        .unwrap();

        let value = call(
            &apim,
            invocation(
                "create_subscription",
                json!({"displayName": "Team", "productId": "starter", "state": "active"}),
            ),
        )
        .await
        .unwrap();

        assert_eq!(value["scope"], "/products/starter");
        assert_eq!(value["state"], "active");
        let name = value["name"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(name).is_ok());
        assert!(value.get("primaryKey").is_none());
    }

    #[tokio::test]
    async fn subscription_keys_on_request() {
        let apim = InMemoryApim::default();
        call(
            &apim,
            invocation("create_subscription", json!({"displayName": "All", "subscriptionId": "all"})),
        )
        .await
        .unwrap();

        let without = call(&apim, invocation("get_subscription", json!({"subscriptionId": "all"})))
            .await
            .unwrap();
        assert!(without.get("primaryKey").is_none());

        let with = call(
            &apim,
            invocation("get_subscription", json!({"subscriptionId": "all", "includeKeys": true})),
        )
        .await
        .unwrap();
        assert!(with["primaryKey"].is_string());
        assert!(with["secondaryKey"].is_string());
    }

    #[tokio::test]
    async fn backend_errors_pass_through() {
        let apim = InMemoryApim::default();
        let err = call(&apim, invocation("get_api", json!({"apiId": "missing-id"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Backend(_)));
        assert!(err.to_string().contains("NotFound"));
    }
}
