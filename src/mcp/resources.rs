//! Read-only MCP resources.
//!
//! Two static resources describe the server itself; neither calls Azure.

use serde::Serialize;
use serde_json::json;

use crate::azure::ApimBackend;
use crate::mcp::tools::ToolDefinition;

const SERVICE_URI: &str = "apim://service";
const TOOLS_URI: &str = "apim://tools";
const JSON_MIME_TYPE: &str = "application/json";

/// An entry of `resources/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

/// The body of a resource, as returned by `resources/read`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: &'static str,
    pub text: String,
}

/// Lists the available resources.
#[must_use]
pub fn list() -> Vec<ResourceDescriptor> {
    vec![
        ResourceDescriptor {
            uri: SERVICE_URI,
            name: "API Management service",
            description: "The API Management instance this server manages (no credentials)",
            mime_type: JSON_MIME_TYPE,
        },
        ResourceDescriptor {
            uri: TOOLS_URI,
            name: "Tool catalogue",
            description: "Names and descriptions of the available tools",
            mime_type: JSON_MIME_TYPE,
        },
    ]
}

/// Reads a resource. Returns `Ok(None)` for an unknown URI.
///
/// # Errors
///
/// Returns an error if the resource body cannot be serialised.
pub fn read(
    uri: &str,
    backend: &dyn ApimBackend,
    tools: &[ToolDefinition],
) -> serde_json::Result<Option<ResourceContents>> {
    let body = match uri {
        SERVICE_URI => serde_json::to_string_pretty(&backend.target())?,
        TOOLS_URI => {
            let catalogue: Vec<_> = tools
                .iter()
                .map(|tool| json!({ "name": tool.name, "description": tool.description }))
                .collect();
            serde_json::to_string_pretty(&catalogue)?
        }
        _ => return Ok(None),
    };

    Ok(Some(ResourceContents {
        uri: uri.to_string(),
        mime_type: JSON_MIME_TYPE,
        text: body,
    }))
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::azure::InMemoryApim;
    use crate::mcp::tools::ToolRegistry;

    #[test]
    fn every_listed_resource_is_readable() {
        let backend = InMemoryApim::default();
        let registry = ToolRegistry::new();

        for descriptor in list() {
            let contents = read(descriptor.uri, &backend, registry.definitions())
                .unwrap()
                .unwrap();
            assert_eq!(contents.uri, descriptor.uri);
            assert!(serde_json::from_str::<Value>(&contents.text).is_ok());
        }
    }

    #[test]
    fn service_resource_names_the_instance() {
        let backend = InMemoryApim::new("contoso-apim");
        let contents = read(SERVICE_URI, &backend, &[]).unwrap().unwrap();
        let value: Value = serde_json::from_str(&contents.text).unwrap();
        assert_eq!(value["serviceName"], "contoso-apim");
        assert_eq!(value["kind"], "in-memory");
    }

    #[test]
    fn unknown_uri_is_none() {
        let backend = InMemoryApim::default();
        assert!(read("apim://nope", &backend, &[]).unwrap().is_none());
    }
}
