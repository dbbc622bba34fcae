//! OpenAPI 3.0.3 document generation for deployed APIs.
//!
//! Each API gets a synthesized descriptor reachable at `/<name>` (or
//! `/<name>:<version>`) with the `?swagger.json` / `?swagger.yaml` query
//! flags. The document is illustrative: parameters are typed as strings and
//! body-bearing operations carry a placeholder JSON schema.

use serde_json::{Map, Value, json};

use crate::artifacts::Api;

/// Build the OpenAPI document for an API served at `hostname:port`.
pub fn generate(api: &Api, hostname: &str, port: u16) -> Value {
    let mut spec = Map::new();
    spec.insert("openapi".to_string(), json!("3.0.3"));

    let title = if api.name.is_empty() {
        "API Documentation"
    } else {
        &api.name
    };
    spec.insert(
        "info".to_string(),
        json!({
            "title": title,
            "version": api.version.clone().unwrap_or_default(),
        }),
    );

    let server_url = format!("http://{hostname}:{port}{}", api.base_path());
    spec.insert("servers".to_string(), json!([{ "url": server_url }]));

    let mut paths = Map::new();
    for resource in &api.resources {
        let mut path = resource.uri_template.path_template.clone();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }

        let path_item = paths
            .entry(path.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(path_item) = path_item else {
            continue;
        };

        let mut parameters = Vec::new();
        for name in &resource.uri_template.path_parameters {
            parameters.push(json!({
                "name": name,
                "in": "path",
                "required": true,
                "description": format!("Path parameter: {name}"),
                "schema": { "type": "string" },
            }));
        }
        for name in resource.uri_template.query_parameters.keys() {
            parameters.push(json!({
                "name": name,
                "in": "query",
                "required": true,
                "description": format!("Query parameter: {name}"),
                "schema": { "type": "string" },
            }));
        }

        for method in &resource.methods {
            let method_key = method.to_ascii_lowercase();

            let mut operation = Map::new();
            operation.insert(
                "summary".to_string(),
                json!(format!("{method} operation for {path}")),
            );
            if !parameters.is_empty() {
                operation.insert("parameters".to_string(), Value::Array(parameters.clone()));
            }

            if matches!(method_key.as_str(), "post" | "put" | "patch") {
                operation.insert(
                    "requestBody".to_string(),
                    json!({
                        "description": "Request body payload",
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "object",
                                    "properties": {
                                        "message": {
                                            "type": "string",
                                            "example": "Placeholder - define actual schema based on API needs",
                                        }
                                    }
                                }
                            }
                        }
                    }),
                );
            }

            operation.insert(
                "responses".to_string(),
                json!({
                    "200": {
                        "description": "OK",
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "object",
                                    "properties": {
                                        "status": { "type": "string", "example": "Success" }
                                    }
                                }
                            }
                        }
                    },
                    "default": {
                        "description": "Unexpected error",
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "object",
                                    "properties": {
                                        "error": { "type": "string", "example": "Error details" }
                                    }
                                }
                            }
                        }
                    }
                }),
            );

            path_item.insert(method_key, Value::Object(operation));
        }
    }
    spec.insert("paths".to_string(), Value::Object(paths));

    Value::Object(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{Resource, UriTemplateInfo, VersionType};

    fn sample_api() -> Api {
        Api {
            name: "OrderAPI".to_string(),
            context: "/orders".to_string(),
            version: Some("1.0".to_string()),
            version_type: Some(VersionType::Url),
            resources: vec![
                Resource {
                    methods: vec!["GET".to_string()],
                    uri_template: UriTemplateInfo::parse("/status/{id}?q={v}").unwrap(),
                    ..Resource::default()
                },
                Resource {
                    methods: vec!["POST".to_string()],
                    uri_template: UriTemplateInfo::parse("/submit").unwrap(),
                    ..Resource::default()
                },
            ],
            ..Api::default()
        }
    }

    #[test]
    fn test_document_skeleton() {
        let spec = generate(&sample_api(), "localhost", 8290);

        assert_eq!(spec["openapi"], "3.0.3");
        assert_eq!(spec["info"]["title"], "OrderAPI");
        assert_eq!(spec["info"]["version"], "1.0");
        assert_eq!(spec["servers"][0]["url"], "http://localhost:8290/orders/1.0");
    }

    #[test]
    fn test_paths_and_parameters() {
        let spec = generate(&sample_api(), "localhost", 8290);

        let get = &spec["paths"]["/status/{id}"]["get"];
        let parameters = get["parameters"].as_array().unwrap();
        assert_eq!(parameters.len(), 2);
        assert_eq!(parameters[0]["name"], "id");
        assert_eq!(parameters[0]["in"], "path");
        assert_eq!(parameters[0]["required"], true);
        assert_eq!(parameters[1]["name"], "q");
        assert_eq!(parameters[1]["in"], "query");
        assert_eq!(parameters[1]["schema"]["type"], "string");
    }

    #[test]
    fn test_post_carries_request_body() {
        let spec = generate(&sample_api(), "localhost", 8290);

        let post = &spec["paths"]["/submit"]["post"];
        assert!(post["requestBody"]["content"]["application/json"].is_object());
        let get = &spec["paths"]["/status/{id}"]["get"];
        assert!(get.get("requestBody").is_none());
    }

    #[test]
    fn test_default_responses_present() {
        let spec = generate(&sample_api(), "localhost", 8290);
        let responses = &spec["paths"]["/submit"]["post"]["responses"];
        assert!(responses["200"].is_object());
        assert!(responses["default"].is_object());
    }

    #[test]
    fn test_unnamed_api_gets_placeholder_title() {
        let api = Api {
            context: "/x".to_string(),
            ..Api::default()
        };
        let spec = generate(&api, "h", 1);
        assert_eq!(spec["info"]["title"], "API Documentation");
    }

    #[test]
    fn test_yaml_rendering() {
        let spec = generate(&sample_api(), "localhost", 8290);
        let yaml = serde_yaml::to_string(&spec).unwrap();
        assert!(yaml.contains("openapi: 3.0.3"));
        assert!(yaml.contains("OrderAPI"));
    }
}
