#![allow(dead_code)]

use anyhow::Context as _;
use axum::{
    Json, Router,
    extract::{Path, Query},
    http::StatusCode,
    routing::get,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::{Child, Command, Stdio};

#[allow(unused_imports)]
pub use apigate_test_support::{KillOnDrop, pick_unused_port, wait_exit, wait_http_ok};

/// `OpenAPI` document for the mock services API. `servers` is left out; tests pass `baseUrl`.
pub const SERVICES_SPEC: &str = r#"
openapi: "3.0.3"
info: { title: Services API, version: "1.0" }
paths:
  /api/v0/services:
    get:
      operationId: list_services_endpoint_api_v0_services_get
      summary: List services
      parameters:
        - name: thematiques
          in: query
          schema: { type: array, items: { type: string } }
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema: { type: array, items: { $ref: '#/components/schemas/Service' } }
  /api/v0/services/{id}:
    get:
      operationId: retrieve_service_endpoint_api_v0_services__id__get
      parameters:
        - { name: id, in: path, required: true, schema: { type: string } }
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema: { $ref: '#/components/schemas/Service' }
  /api/v0/doc/thematiques:
    get:
      operationId: list_thematiques_endpoint_api_v0_doc_thematiques_get
      responses: { "200": { description: ok } }
components:
  schemas:
    Service:
      type: object
      properties:
        id: { type: string }
        thematiques: { type: array, items: { type: string } }
"#;

pub const SERVICES_MAPPINGS: &str = r#"{
  "list_services_endpoint_api_v0_services_get": "search_services",
  "retrieve_service_endpoint_api_v0_services__id__get": {
    "name": "get_service_details",
    "description": "Fetch one service by id"
  }
}"#;

/// Start the mock services API on an ephemeral port; returns its base URL.
pub async fn spawn_services_api() -> anyhow::Result<String> {
    async fn list(Query(q): Query<Vec<(String, String)>>) -> Json<Value> {
        let thematiques: Vec<String> = q
            .into_iter()
            .filter(|(k, _)| k == "thematiques")
            .map(|(_, v)| v)
            .collect();
        Json(json!([{ "id": "svc-1", "thematiques": thematiques }]))
    }
    async fn retrieve(Path(id): Path<String>) -> Result<Json<Value>, (StatusCode, String)> {
        if id == "missing" {
            return Err((StatusCode::NOT_FOUND, "service not found".to_string()));
        }
        Ok(Json(json!({ "id": id, "thematiques": [] })))
    }
    async fn thematiques(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
        Json(json!({ "query": q }))
    }

    let app = Router::new()
        .route("/api/v0/services", get(list))
        .route("/api/v0/services/{id}", get(retrieve))
        .route("/api/v0/doc/thematiques", get(thematiques));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind mock API")?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn gateway_command(config_path: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_apigate"));
    cmd.arg("--config")
        .arg(config_path)
        .arg("--log-level")
        .arg("info")
        .env_remove("RUST_LOG");
    cmd
}

pub fn spawn_gateway(config_path: &std::path::Path, port: u16) -> anyhow::Result<Child> {
    gateway_command(config_path)
        .arg("--bind")
        .arg(format!("127.0.0.1:{port}"))
        .spawn()
        .context("spawn apigate")
}

/// Run `apigate --list-tools` to completion, capturing stdout and stderr.
pub fn run_list_tools(config_path: &std::path::Path) -> anyhow::Result<std::process::Output> {
    gateway_command(config_path)
        .arg("--list-tools")
        .stdin(Stdio::null())
        .output()
        .context("run apigate --list-tools")
}
