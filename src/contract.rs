//! API contract parsing: OpenAPI/Swagger paths into canonical endpoints

use crate::normalize::Node;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The HTTP verbs recognised under a contract path item
pub const HTTP_METHODS: [&str; 7] = ["get", "post", "put", "delete", "patch", "options", "head"];

/// Identity of an endpoint: upper-cased method plus path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct EndpointKey {
    pub method: String,
    pub path: String,
}

impl EndpointKey {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
        }
    }

    /// Canonical map key, `METHOD:path`
    pub fn id(&self) -> String {
        format!("{}:{}", self.method, self.path)
    }
}

impl std::fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A declared operation parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
    pub required: bool,
}

/// A declared response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResponseSpec {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A declared request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RequestBody {
    pub required: bool,
    pub content_types: Vec<String>,
}

/// One (path, method) operation from the contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Endpoint {
    pub path: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub responses: Vec<ResponseSpec>,
}

impl Endpoint {
    /// Minimal endpoint with only method and path
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            path: path.to_string(),
            method: method.to_ascii_uppercase(),
            operation_id: None,
            summary: None,
            description: None,
            tags: Vec::new(),
            parameters: Vec::new(),
            request_body: None,
            responses: Vec::new(),
        }
    }

    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(&self.method, &self.path)
    }
}

/// A parsed API contract
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ApiContract {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub endpoints: Vec<Endpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schemas: Vec<String>,
}

/// Parse a normalized contract document
pub fn parse_contract(document: &Node) -> ApiContract {
    let info = document.child("info");
    let mut endpoints = Vec::new();

    if let Some(paths) = document.child("paths") {
        for path in paths.child_names() {
            for item in paths.children(path) {
                let shared = parameters(item);
                for method in HTTP_METHODS {
                    for operation in item.children(method) {
                        endpoints.push(endpoint(path, method, operation, &shared));
                    }
                }
            }
        }
    }

    let schemas = document
        .descend(&["components", "schemas"])
        .into_iter()
        .chain(document.children("definitions"))
        .flat_map(|node| node.child_names().map(str::to_string).collect::<Vec<_>>())
        .collect();

    debug!(endpoints = endpoints.len(), "parsed API contract");
    ApiContract {
        title: info.and_then(|i| i.value("title")).map(str::to_string),
        version: info.and_then(|i| i.value("version")).map(str::to_string),
        endpoints,
        schemas,
    }
}

fn endpoint(path: &str, method: &str, operation: &Node, shared: &[Parameter]) -> Endpoint {
    let mut params = parameters(operation);
    for param in shared {
        if !params
            .iter()
            .any(|p| p.name == param.name && p.location == param.location)
        {
            params.push(param.clone());
        }
    }

    let request_body = operation.child("requestBody").map(|body| RequestBody {
        required: body.value("required") == Some("true"),
        content_types: body
            .child("content")
            .map(|c| c.child_names().map(str::to_string).collect())
            .unwrap_or_default(),
    });

    let responses = operation
        .child("responses")
        .map(|responses| {
            responses
                .child_names()
                .map(|status| ResponseSpec {
                    status: status.to_string(),
                    description: responses
                        .child(status)
                        .and_then(|r| r.value("description"))
                        .map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();

    Endpoint {
        path: path.to_string(),
        method: method.to_ascii_uppercase(),
        operation_id: operation.value("operationId").map(str::to_string),
        summary: operation.value("summary").map(str::to_string),
        description: operation.value("description").map(str::to_string),
        tags: operation.texts("tags").into_iter().map(str::to_string).collect(),
        parameters: params,
        request_body,
        responses,
    }
}

fn parameters(node: &Node) -> Vec<Parameter> {
    node.children("parameters")
        .iter()
        .filter_map(|p| {
            let name = p.value("name")?;
            let location = p.value("in").unwrap_or("query");
            Some(Parameter {
                name: name.to_string(),
                location: location.to_string(),
                // path parameters are always required
                required: p.value("required") == Some("true") || location == "path",
            })
        })
        .collect()
}
