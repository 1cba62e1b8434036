//! API documentation, served in development mode only.
//!
//! - `GET /swagger/` - Index page linking the document
//! - `GET /swagger/doc.json` - OpenAPI 3 document for the public routes

use axum::Json;
use axum::response::Html;
use serde_json::{Value, json};

/// OpenAPI document for `/api/*`.
pub async fn doc() -> Json<Value> {
    Json(openapi())
}

/// Minimal index page.
pub async fn index() -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><title>{name} API</title></head>\
         <body><h1>{name} {version}</h1>\
         <p><a href=\"/swagger/doc.json\">OpenAPI document</a></p></body></html>",
        name = crate::APP_NAME,
        version = crate::VERSION,
    ))
}

fn openapi() -> Value {
    let error = json!({ "$ref": "#/components/schemas/ApiError" });

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": crate::APP_NAME,
            "version": crate::VERSION,
        },
        "paths": {
            "/api/version": {
                "get": {
                    "tags": ["info"],
                    "summary": "Application name and version",
                    "responses": { "200": { "description": "Version information" } }
                }
            },
            "/api/health": {
                "get": {
                    "tags": ["info"],
                    "summary": "Health snapshot of the running instance",
                    "responses": { "200": { "description": "Health data" } }
                }
            },
            "/api/monitoring": {
                "get": {
                    "tags": ["info"],
                    "summary": "Monitoring entries",
                    "security": [ { "APIKeyAuth": [] }, { "BearerAuth": [] } ],
                    "responses": {
                        "200": { "description": "Monitoring data" },
                        "401": {
                            "description": "Not authorized",
                            "content": { "application/json": { "schema": error.clone() } }
                        },
                        "403": {
                            "description": "Client address filtered",
                            "content": { "application/json": { "schema": error } }
                        }
                    }
                }
            }
        },
        "components": {
            "securitySchemes": {
                "APIKeyAuth": { "type": "apiKey", "in": "header", "name": "X-Api-Key" },
                "BearerAuth": { "type": "http", "scheme": "bearer", "bearerFormat": "JWT" }
            },
            "schemas": {
                "ApiError": {
                    "type": "object",
                    "properties": { "error": { "type": "string" } }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_public_routes() {
        let doc = openapi();
        let paths = doc["paths"].as_object().map(|p| p.len());
        assert_eq!(paths, Some(3));
        assert!(doc["paths"]["/api/monitoring"]["get"]["security"].is_array());
    }
}
