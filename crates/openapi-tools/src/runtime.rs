//! `OpenAPI` tool source runtime.
//!
//! Turns selected `OpenAPI` operations into MCP tools and executes `tools/call` by issuing the
//! matching upstream HTTP request through the shared [`ApiClient`].

use crate::error::{OpenApiToolsError, Result};
use crate::loader::SpecLocation;
use crate::query::{self, QueryPair, QuerySerialization};
use crate::resolver::OpenApiResolver;
use crate::routes::{HttpRoute, RouteOperation};
use crate::schema::{self, ArgumentSchema};
use crate::selection::RouteMap;
use crate::transform::{RenameTarget, ToolTransformer, TransformReport};
use apigate_http::client::ApiClient;
use apigate_http::safety::sanitize_reqwest_error;
use apigate_http::semantics::annotations_for_method;
use base64::Engine as _;
use mime::Mime;
use openapiv3::{
    MediaType, Operation, Parameter, ReferenceOr, RequestBody, Response, Schema, SchemaKind,
    StatusCode, Type,
};
use parking_lot::RwLock;
use reqwest::Method;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Maximum tool name length accepted by MCP clients.
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// Tool source exposing upstream API operations as MCP tools.
#[derive(Clone)]
pub struct OpenApiToolSource {
    /// Source name (used in logs).
    name: String,
    client: Arc<ApiClient>,
    tools: Arc<RwLock<Vec<GeneratedTool>>>,
}

#[derive(Debug, Clone)]
struct GeneratedTool {
    /// Exposed name (after renaming).
    name: String,
    /// Name derived from the document; still accepted by `call_tool`.
    generated_name: String,
    operation_id: Option<String>,
    description: String,
    method: Method,
    /// Path template, e.g. `/pets/{petId}`.
    path: String,
    parameters: Vec<ToolParameter>,
    input_schema: Arc<JsonObject>,
    output_schema: Option<Arc<JsonObject>>,
}

impl RenameTarget for GeneratedTool {
    fn current_name(&self) -> &str {
        &self.name
    }

    fn rename(&mut self, name: Option<String>, description: Option<String>) {
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(description) = description {
            self.description = description;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamLocation {
    Path,
    Query,
    Header,
    /// One property of a flattened JSON object body.
    BodyField,
    /// The whole (non-object) JSON body.
    Body,
}

#[derive(Debug, Clone)]
struct ToolParameter {
    /// Name as sent upstream.
    name: String,
    location: ParamLocation,
    required: bool,
    schema: Value,
    query: Option<QuerySerialization>,
}

/// Summary of one exposed tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRecord {
    pub name: String,
    pub generated_name: String,
    pub operation_id: Option<String>,
    pub method: String,
    pub path: String,
    pub description: String,
}

enum UpstreamBody {
    Json(Value),
    Text(String),
    Image { data: Vec<u8>, mime_type: String },
}

impl OpenApiToolSource {
    /// Generate tools for every operation `selection` keeps.
    ///
    /// An operation that cannot be turned into a tool (bad `$ref`, argument name collision,
    /// unknown method) is skipped with a warning; generation itself never fails.
    pub async fn generate(
        name: impl Into<String>,
        operations: &[RouteOperation],
        selection: &RouteMap,
        resolver: &OpenApiResolver<'_>,
        client: Arc<ApiClient>,
    ) -> Self {
        let name = name.into();
        let mut tools = Vec::new();
        let mut taken: HashSet<String> = HashSet::new();
        let mut excluded = 0usize;

        for op in operations {
            if !selection.is_selected(&op.route) {
                excluded += 1;
                tracing::debug!(route = %op.route.display_name(), "Route excluded");
                continue;
            }
            match generate_tool(resolver, op, &mut taken).await {
                Ok(tool) => tools.push(tool),
                Err(e) => tracing::warn!(
                    source = %name,
                    route = %op.route.display_name(),
                    error = %e,
                    "Skipping operation"
                ),
            }
        }

        tracing::info!(
            source = %name,
            tools = tools.len(),
            excluded,
            "Generated tools from OpenAPI operations"
        );

        Self {
            name,
            client,
            tools: Arc::new(RwLock::new(tools)),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Feed `(operationId, generated name)` pairs to `transformer`, then apply it.
    ///
    /// # Errors
    ///
    /// Returns an error if renaming would make two tools share a name; no tool is renamed then.
    pub fn transform(&self, transformer: &mut ToolTransformer) -> Result<TransformReport> {
        let mut tools = self.tools.write();
        for t in tools.iter() {
            if let Some(op_id) = &t.operation_id {
                transformer.observe(op_id, &t.generated_name);
            }
        }
        transformer.apply(tools.as_mut_slice())
    }

    /// MCP `Tool` definitions, in generation order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.read().iter().map(to_mcp_tool).collect()
    }

    /// Look up a tool by exposed or generated name.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<Tool> {
        let tools = self.tools.read();
        find_tool(&tools, name).map(to_mcp_tool)
    }

    #[must_use]
    pub fn tool_records(&self) -> Vec<ToolRecord> {
        self.tools
            .read()
            .iter()
            .map(|t| ToolRecord {
                name: t.name.clone(),
                generated_name: t.generated_name.clone(),
                operation_id: t.operation_id.clone(),
                method: t.method.to_string(),
                path: t.path.clone(),
                description: t.description.clone(),
            })
            .collect()
    }

    /// Execute a tool call against the upstream API.
    ///
    /// # Errors
    ///
    /// - [`OpenApiToolsError::UnknownTool`] if no tool has that name
    /// - [`OpenApiToolsError::Runtime`] if a required argument is missing or the client is closed
    /// - [`OpenApiToolsError::Http`] on transport failure or a non-2xx response
    pub async fn call_tool(&self, name: &str, arguments: &JsonObject) -> Result<CallToolResult> {
        let tool = {
            let tools = self.tools.read();
            find_tool(&tools, name)
                .cloned()
                .ok_or_else(|| OpenApiToolsError::UnknownTool(name.to_string()))?
        };

        tracing::debug!(tool = %tool.name, method = %tool.method, path = %tool.path, "Calling upstream API");
        let body = self.execute(&tool, arguments).await?;

        Ok(match body {
            UpstreamBody::Image { data, mime_type } => CallToolResult {
                content: vec![Content::image(
                    base64::engine::general_purpose::STANDARD.encode(data),
                    mime_type,
                )],
                structured_content: None,
                is_error: Some(false),
                meta: None,
            },
            UpstreamBody::Json(value) if tool.output_schema.is_some() => {
                let structured = json!({ "body": value });
                CallToolResult {
                    content: vec![Content::text(structured.to_string())],
                    structured_content: Some(structured),
                    is_error: Some(false),
                    meta: None,
                }
            }
            UpstreamBody::Json(value) => CallToolResult::success(vec![Content::text(
                value.as_str().map_or_else(|| value.to_string(), str::to_string),
            )]),
            UpstreamBody::Text(text) => CallToolResult::success(vec![Content::text(text)]),
        })
    }

    async fn execute(&self, tool: &GeneratedTool, arguments: &JsonObject) -> Result<UpstreamBody> {
        let mut path = tool.path.clone();
        let mut query_pairs: Vec<QueryPair> = Vec::new();
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut body_fields = Map::new();
        let mut body: Option<Value> = None;

        for param in &tool.parameters {
            let value = arguments.get(&param.name).filter(|v| !v.is_null());
            let Some(value) = value else {
                if param.required {
                    return Err(OpenApiToolsError::Runtime(format!(
                        "Missing required parameter: {}",
                        param.name
                    )));
                }
                continue;
            };

            match param.location {
                ParamLocation::Path => path = query::fill_path_param(&path, &param.name, value),
                ParamLocation::Query => {
                    let ser = param
                        .query
                        .clone()
                        .unwrap_or_else(|| QuerySerialization::new(openapiv3::QueryStyle::Form, None));
                    query_pairs.extend(query::serialize(&param.name, value, param.required, &ser));
                }
                ParamLocation::Header => {
                    headers.push((param.name.clone(), query::scalar_string(value)));
                }
                ParamLocation::BodyField => {
                    body_fields.insert(param.name.clone(), value.clone());
                }
                ParamLocation::Body => body = Some(value.clone()),
            }
        }

        let mut url = self.client.endpoint(&path);
        if !query_pairs.is_empty() {
            let encoded = query::encode(&query_pairs);
            let query = match url.query().filter(|q| !q.is_empty()) {
                Some(base) => format!("{base}&{encoded}"),
                None => encoded,
            };
            url.set_query(Some(&query));
        }

        let mut request = self.client.request(tool.method.clone(), url)?;
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.json(&body);
        } else if !body_fields.is_empty() {
            request = request.json(&body_fields);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OpenApiToolsError::Http(sanitize_reqwest_error(&e)))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OpenApiToolsError::Http(sanitize_reqwest_error(&e)))?;

        if !status.is_success() {
            let detail = match decode_body(&bytes, content_type.as_deref()) {
                UpstreamBody::Json(v) => v.to_string(),
                UpstreamBody::Text(t) => t,
                UpstreamBody::Image { mime_type, .. } => format!("<{mime_type}>"),
            };
            tracing::warn!(
                source = %self.name,
                tool = %tool.name,
                status = status.as_u16(),
                "Upstream API returned an error"
            );
            return Err(OpenApiToolsError::Http(format!(
                "API returned {} {}: {detail}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            )));
        }

        Ok(decode_body(&bytes, content_type.as_deref()))
    }
}

fn find_tool<'a>(tools: &'a [GeneratedTool], name: &str) -> Option<&'a GeneratedTool> {
    tools
        .iter()
        .find(|t| t.name == name)
        .or_else(|| tools.iter().find(|t| t.generated_name == name))
}

fn to_mcp_tool(t: &GeneratedTool) -> Tool {
    let mut tool = Tool::new(
        t.name.clone(),
        t.description.clone(),
        Arc::clone(&t.input_schema),
    );
    tool.output_schema.clone_from(&t.output_schema);
    tool.annotations = Some(annotations_for_method(&t.method));
    tool
}

fn decode_body(bytes: &[u8], content_type: Option<&str>) -> UpstreamBody {
    let mime = content_type.and_then(|ct| ct.parse::<Mime>().ok());
    if let Some(m) = &mime
        && m.type_() == mime::IMAGE
    {
        return UpstreamBody::Image {
            data: bytes.to_vec(),
            mime_type: m.essence_str().to_string(),
        };
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => serde_json::from_str(text)
            .map_or_else(|_| UpstreamBody::Text(text.to_string()), UpstreamBody::Json),
        Err(_) => UpstreamBody::Json(json!({
            "encoding": "base64",
            "mimeType": content_type,
            "data": base64::engine::general_purpose::STANDARD.encode(bytes),
        })),
    }
}

async fn generate_tool(
    resolver: &OpenApiResolver<'_>,
    op: &RouteOperation,
    taken: &mut HashSet<String>,
) -> Result<GeneratedTool> {
    let route = &op.route;
    let method = Method::from_bytes(route.method.to_ascii_uppercase().as_bytes())
        .map_err(|_| OpenApiToolsError::OpenApi(format!("Unsupported HTTP method: {}", route.method)))?;

    let parameters = collect_parameters(resolver, op).await?;
    let input_schema = schema::input_schema(parameters.iter().map(|p| ArgumentSchema {
        name: &p.name,
        schema: &p.schema,
        required: p.required,
    }));

    let output_schema = match response_schema(resolver, &op.doc, &op.operation).await? {
        Some(body) => Some(schema::output_schema(body)?),
        None => None,
    };

    let base = route
        .operation_id
        .as_deref()
        .map(sanitize_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| canonical_name(&route.method, &route.path));
    let name = reserve_unique(taken, &base);

    let description = route
        .summary
        .clone()
        .or_else(|| route.description.clone())
        .unwrap_or_else(|| format!("Calls {}", route.display_name()));

    Ok(GeneratedTool {
        generated_name: name.clone(),
        name,
        operation_id: route.operation_id.clone(),
        description,
        method,
        path: route.path.clone(),
        parameters,
        input_schema: Arc::new(input_schema),
        output_schema,
    })
}

async fn collect_parameters(
    resolver: &OpenApiResolver<'_>,
    op: &RouteOperation,
) -> Result<Vec<ToolParameter>> {
    let route = &op.route;
    let mut params = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut push = |p: ToolParameter, params: &mut Vec<ToolParameter>| -> Result<()> {
        if !seen.insert(p.name.clone()) {
            return Err(OpenApiToolsError::ParamCollision(format!(
                "argument '{}' appears more than once in {}",
                p.name,
                route.display_name()
            )));
        }
        params.push(p);
        Ok(())
    };

    for (doc, param) in merge_parameters(resolver, &op.doc, &op.path_params, &op.operation).await? {
        if let Some(p) = tool_parameter(resolver, &doc, &param, route).await {
            push(p, &mut params)?;
        }
    }

    if let Some(body_ref) = &op.operation.request_body {
        let (doc, body) = resolver.resolve::<RequestBody>(&op.doc, body_ref).await?;
        for p in body_parameters(resolver, &doc, &body).await? {
            push(p, &mut params)?;
        }
    }

    Ok(params)
}

/// Path-item parameters overlaid by operation parameters with the same `(in, name)`.
async fn merge_parameters(
    resolver: &OpenApiResolver<'_>,
    doc: &SpecLocation,
    path_params: &[ReferenceOr<Parameter>],
    operation: &Operation,
) -> Result<Vec<(SpecLocation, Parameter)>> {
    let mut merged: Vec<(SpecLocation, Parameter)> = Vec::new();
    let mut index: HashMap<(&'static str, String), usize> = HashMap::new();

    for p in path_params.iter().chain(&operation.parameters) {
        let (pdoc, param) = resolver.resolve(doc, p).await?;
        let key = (location_key(&param), param.parameter_data_ref().name.clone());
        match index.get(&key) {
            Some(&i) => merged[i] = (pdoc, param),
            None => {
                index.insert(key, merged.len());
                merged.push((pdoc, param));
            }
        }
    }
    Ok(merged)
}

fn location_key(p: &Parameter) -> &'static str {
    match p {
        Parameter::Path { .. } => "path",
        Parameter::Query { .. } => "query",
        Parameter::Header { .. } => "header",
        Parameter::Cookie { .. } => "cookie",
    }
}

async fn tool_parameter(
    resolver: &OpenApiResolver<'_>,
    doc: &SpecLocation,
    param: &Parameter,
    route: &HttpRoute,
) -> Option<ToolParameter> {
    let data = param.parameter_data_ref();
    let (location, required, query) = match param {
        // Path parameters are always required.
        Parameter::Path { .. } => (ParamLocation::Path, true, None),
        Parameter::Query {
            style,
            allow_reserved,
            allow_empty_value,
            ..
        } => {
            let mut ser = QuerySerialization::new(style.clone(), data.explode);
            ser.allow_reserved = *allow_reserved;
            ser.allow_empty_value = allow_empty_value.unwrap_or(false);
            (ParamLocation::Query, data.required, Some(ser))
        }
        Parameter::Header { .. } => (ParamLocation::Header, data.required, None),
        Parameter::Cookie { .. } => {
            tracing::warn!(
                route = %route.display_name(),
                parameter = %data.name,
                "Cookie parameters are not supported, ignoring"
            );
            return None;
        }
    };

    let mut schema = schema::parameter_schema_json(resolver, doc, &data.format).await;
    if let (Some(obj), Some(desc)) = (schema.as_object_mut(), &data.description) {
        obj.entry("description")
            .or_insert_with(|| Value::String(desc.clone()));
    }

    Some(ToolParameter {
        name: data.name.clone(),
        location,
        required,
        schema,
        query,
    })
}

/// Arguments for a JSON request body: object properties flattened, anything else as `body`.
async fn body_parameters(
    resolver: &OpenApiResolver<'_>,
    doc: &SpecLocation,
    body: &RequestBody,
) -> Result<Vec<ToolParameter>> {
    let Some(schema_ref) = json_media(&body.content).and_then(|m| m.schema.as_ref()) else {
        return Ok(Vec::new());
    };
    let (schema_doc, schema) = resolver.resolve::<Schema>(doc, schema_ref).await?;

    let SchemaKind::Type(Type::Object(obj)) = &schema.schema_kind else {
        return Ok(vec![ToolParameter {
            name: "body".to_string(),
            location: ParamLocation::Body,
            required: body.required,
            schema: schema::schema_to_json(&schema),
            query: None,
        }]);
    };

    let mut params = Vec::with_capacity(obj.properties.len());
    for (prop, prop_schema) in &obj.properties {
        let schema_json = match prop_schema {
            ReferenceOr::Item(s) => schema::schema_to_json(s),
            ReferenceOr::Reference { reference } => {
                match resolver.resolve::<Box<Schema>>(&schema_doc, prop_schema).await {
                    Ok((_, s)) => schema::schema_to_json(&s),
                    Err(_) => json!({ "$ref": reference }),
                }
            }
        };
        params.push(ToolParameter {
            name: prop.clone(),
            location: ParamLocation::BodyField,
            // An optional body makes all of its fields optional.
            required: body.required && obj.required.contains(prop),
            schema: schema_json,
            query: None,
        });
    }
    Ok(params)
}

fn json_media<'a>(
    content: impl IntoIterator<Item = (&'a String, &'a MediaType)>,
) -> Option<&'a MediaType> {
    let mut fallback = None;
    for (media_type, media) in content {
        let media_type = media_type.to_ascii_lowercase();
        if media_type == "application/json" {
            return Some(media);
        }
        if fallback.is_none() && media_type.contains("json") {
            fallback = Some(media);
        }
    }
    fallback
}

/// JSON schema of the first 2xx response (explicit codes before the `2XX` range).
async fn response_schema(
    resolver: &OpenApiResolver<'_>,
    doc: &SpecLocation,
    operation: &Operation,
) -> Result<Option<Value>> {
    let mut best: Option<(u16, &ReferenceOr<Response>)> = None;
    for (code, resp) in &operation.responses.responses {
        let rank = match code {
            StatusCode::Code(n) if (200..300).contains(n) => *n,
            StatusCode::Range(2) => 300,
            _ => continue,
        };
        if best.is_none_or(|(r, _)| rank < r) {
            best = Some((rank, resp));
        }
    }
    let Some((_, resp_ref)) = best else {
        return Ok(None);
    };

    let (resp_doc, resp) = resolver.resolve::<Response>(doc, resp_ref).await?;
    let Some(schema_ref) = json_media(&resp.content).and_then(|m| m.schema.as_ref()) else {
        return Ok(None);
    };
    Ok(Some(
        schema::resolve_schema_json(resolver, &resp_doc, schema_ref).await,
    ))
}

/// Tool name derived from method and path: `get /pets/{petId}` -> `get_pets_petId`.
fn canonical_name(method: &str, path: &str) -> String {
    let raw = format!("{}_{path}", method.to_ascii_lowercase());
    let mut name = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    let mut name = name.trim_matches('_').to_string();
    name.truncate(MAX_TOOL_NAME_LEN);
    name
}

/// Tool name from an operationId: characters outside `[A-Za-z0-9_-]` become `_`, cut to the
/// length limit.
fn sanitize_name(operation_id: &str) -> String {
    operation_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TOOL_NAME_LEN)
        .collect()
}

fn reserve_unique(taken: &mut HashSet<String>, base: &str) -> String {
    if taken.insert(base.to_string()) {
        return base.to_string();
    }
    (1..)
        .map(|n| {
            let suffix = format!("_{n}");
            let keep = MAX_TOOL_NAME_LEN.saturating_sub(suffix.len()).min(base.len());
            format!("{}{suffix}", &base[..keep])
        })
        .find(|candidate| taken.insert(candidate.clone()))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappings::{ToolMapping, ToolMappings};
    use crate::routes::enumerate_operations;
    use apigate_http::config::{ClientConfig, ResolvedAuth};
    use axum::{
        Json, Router,
        extract::{Path, Query},
        http::{HeaderMap, StatusCode as AxumStatus, header},
        response::IntoResponse,
        routing::get,
    };
    use openapiv3::OpenAPI;

    const PETSTORE: &str = r#"
openapi: "3.0.0"
info: { title: Petstore, version: "1" }
components:
  parameters:
    Verbose:
      name: verbose
      in: query
      schema: { type: boolean }
  schemas:
    NewPet:
      type: object
      required: [name]
      properties:
        name: { type: string }
        tag: { type: string }
    Pet:
      type: object
      properties:
        id: { type: string }
paths:
  /pets:
    get:
      operationId: listPets
      summary: List all pets
      parameters:
        - name: tags
          in: query
          schema: { type: array, items: { type: string } }
        - name: session
          in: cookie
          schema: { type: string }
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema:
                type: array
                items: { $ref: '#/components/schemas/Pet' }
    post:
      operationId: createPet
      requestBody:
        required: true
        content:
          application/json:
            schema: { $ref: '#/components/schemas/NewPet' }
      responses:
        "201": { description: created }
  /pets/{petId}:
    parameters:
      - name: petId
        in: path
        required: true
        schema: { type: string }
      - $ref: '#/components/parameters/Verbose'
    get:
      description: Fetch one pet
      parameters:
        - name: verbose
          in: query
          required: true
          schema: { type: boolean }
        - name: X-Trace
          in: header
          schema: { type: string }
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema: { $ref: '#/components/schemas/Pet' }
    put:
      operationId: listPets
      responses: { "200": { description: ok } }
  /tags:
    put:
      requestBody:
        content:
          application/json:
            schema: { type: array, items: { type: string } }
      responses: { "204": { description: ok } }
  /clash/{name}:
    post:
      operationId: clash
      parameters:
        - name: name
          in: path
          required: true
          schema: { type: string }
      requestBody:
        content:
          application/json:
            schema:
              type: object
              properties:
                name: { type: string }
      responses: { "200": { description: ok } }
  /missing:
    get:
      operationId: missing
      responses: { "200": { description: ok } }
  /logo:
    get:
      operationId: logo
      responses: { "200": { description: ok } }
"#;

    async fn source(base_url: &str, selection: &RouteMap) -> OpenApiToolSource {
        let spec: OpenAPI = serde_yaml::from_str(PETSTORE).unwrap();
        let http = reqwest::Client::new();
        let resolver =
            OpenApiResolver::new(SpecLocation::File("/virtual/openapi.yaml".into()), &spec, &http)
                .unwrap();
        let ops = enumerate_operations(&spec, &resolver).await;
        let client = Arc::new(
            ApiClient::new(base_url, &ClientConfig::default(), ResolvedAuth::None).unwrap(),
        );
        OpenApiToolSource::generate("petstore", &ops, selection, &resolver, client).await
    }

    async fn upstream() -> String {
        async fn get_pet(
            Path(pet_id): Path<String>,
            Query(q): Query<HashMap<String, String>>,
            headers: HeaderMap,
        ) -> Json<Value> {
            Json(json!({
                "id": pet_id,
                "verbose": q.get("verbose"),
                "source": q.get("source"),
                "trace": headers.get("x-trace").and_then(|v| v.to_str().ok()),
            }))
        }
        async fn list_pets(Query(q): Query<Vec<(String, String)>>) -> Json<Value> {
            let tags: Vec<&String> = q.iter().filter(|(k, _)| k == "tags").map(|(_, v)| v).collect();
            Json(json!([{ "id": "1", "tags": tags }]))
        }
        async fn create_pet(Json(body): Json<Value>) -> impl IntoResponse {
            (AxumStatus::CREATED, Json(json!({ "created": body })))
        }
        async fn missing() -> impl IntoResponse {
            (AxumStatus::NOT_FOUND, "no such thing")
        }
        async fn logo() -> impl IntoResponse {
            ([(header::CONTENT_TYPE, "image/png")], vec![0x89_u8, b'P', b'N', b'G'])
        }

        let app = Router::new()
            .route("/pets", get(list_pets).post(create_pet))
            .route("/pets/{pet_id}", get(get_pet))
            .route("/missing", get(missing))
            .route("/logo", get(logo));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn args(v: Value) -> JsonObject {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn canonical_names() {
        assert_eq!(canonical_name("GET", "/pets/{petId}"), "get_pets_petId");
        assert_eq!(
            canonical_name("post", "/store//order-items"),
            "post_store_order_items"
        );
        assert!(canonical_name("get", &"/segment".repeat(20)).len() <= MAX_TOOL_NAME_LEN);
    }

    #[test]
    fn unique_names_get_numeric_suffixes() {
        let mut taken = HashSet::new();
        assert_eq!(reserve_unique(&mut taken, "a"), "a");
        assert_eq!(reserve_unique(&mut taken, "a"), "a_1");
        assert_eq!(reserve_unique(&mut taken, "a"), "a_2");
    }

    #[test]
    fn operation_ids_are_cleaned_into_valid_names() {
        assert_eq!(sanitize_name("list services (v2)"), "list_services__v2_");
        assert_eq!(sanitize_name("get-pet_by.id"), "get-pet_by_id");
        assert_eq!(sanitize_name("héllo"), "h_llo");

        let long = "retrieve_structure_endpoint_api_v0_structures__source___id__with_extra_get";
        let name = sanitize_name(long);
        assert_eq!(name.len(), MAX_TOOL_NAME_LEN);
        assert!(long.starts_with(&name));
        assert!(crate::transform::is_valid_tool_name(&name));
    }

    #[test]
    fn suffixed_names_stay_within_the_limit() {
        let mut taken = HashSet::new();
        let base = "x".repeat(MAX_TOOL_NAME_LEN);
        assert_eq!(reserve_unique(&mut taken, &base), base);
        let second = reserve_unique(&mut taken, &base);
        assert_eq!(second.len(), MAX_TOOL_NAME_LEN);
        assert!(second.ends_with("_1"));
        assert!(crate::transform::is_valid_tool_name(&second));
    }

    #[tokio::test]
    async fn odd_operation_ids_still_map_by_raw_id() {
        let long = "retrieve_structure_endpoint_api_v0_structures__source___id__with_extra_get";
        let doc = format!(
            r#"
openapi: "3.0.0"
info: {{ title: Odd, version: "1" }}
paths:
  /a:
    get:
      operationId: "list services (v2)"
      responses: {{ "200": {{ description: ok }} }}
  /b:
    get:
      operationId: {long}
      responses: {{ "200": {{ description: ok }} }}
"#
        );
        let spec: OpenAPI = serde_yaml::from_str(&doc).unwrap();
        let http = reqwest::Client::new();
        let resolver =
            OpenApiResolver::new(SpecLocation::File("/virtual/odd.yaml".into()), &spec, &http)
                .unwrap();
        let ops = enumerate_operations(&spec, &resolver).await;
        let client = Arc::new(
            ApiClient::new("http://localhost:1", &ClientConfig::default(), ResolvedAuth::None)
                .unwrap(),
        );
        let src =
            OpenApiToolSource::generate("odd", &ops, &RouteMap::expose_all(), &resolver, client)
                .await;

        let records = src.tool_records();
        assert_eq!(records[0].name, "list_services__v2_");
        assert_eq!(records[0].operation_id.as_deref(), Some("list services (v2)"));
        assert_eq!(records[1].name.len(), MAX_TOOL_NAME_LEN);
        assert_eq!(records[1].operation_id.as_deref(), Some(long));
        assert!(records.iter().all(|r| crate::transform::is_valid_tool_name(&r.name)));

        let mappings: ToolMappings = [(
            long.to_string(),
            ToolMapping {
                name: Some("get_structure".to_string()),
                description: None,
            },
        )]
        .into_iter()
        .collect();
        src.transform(&mut ToolTransformer::new(mappings)).unwrap();
        assert!(src.get_tool("get_structure").is_some());
    }

    #[tokio::test]
    async fn generates_tools_for_every_valid_operation() {
        let src = source("http://localhost:1", &RouteMap::expose_all()).await;
        let names: Vec<String> = src.tool_records().into_iter().map(|r| r.name).collect();
        // `clash` is skipped: its path and body both define `name`.
        assert_eq!(
            names,
            [
                "listPets",
                "createPet",
                "get_pets_petId",
                "listPets_1",
                "put_tags",
                "missing",
                "logo"
            ]
        );
    }

    #[tokio::test]
    async fn descriptions_fall_back_to_method_and_path() {
        let src = source("http://localhost:1", &RouteMap::expose_all()).await;
        let records = src.tool_records();
        let desc = |n: &str| {
            records
                .iter()
                .find(|r| r.name == n)
                .map(|r| r.description.clone())
                .unwrap()
        };
        assert_eq!(desc("listPets"), "List all pets");
        assert_eq!(desc("get_pets_petId"), "Fetch one pet");
        assert_eq!(desc("missing"), "Calls GET /missing");
    }

    #[tokio::test]
    async fn input_schemas_merge_parameters_and_flatten_bodies() {
        let src = source("http://localhost:1", &RouteMap::expose_all()).await;

        let get_pet = src.get_tool("get_pets_petId").unwrap();
        let schema = &get_pet.input_schema;
        let props = schema["properties"].as_object().unwrap();
        assert!(props.contains_key("petId"));
        assert!(props.contains_key("verbose"));
        assert!(props.contains_key("X-Trace"));
        // Operation-level `verbose` overrides the optional path-level one.
        assert_eq!(schema["required"], json!(["petId", "verbose"]));

        let create = src.get_tool("createPet").unwrap();
        assert_eq!(create.input_schema["required"], json!(["name"]));
        assert_eq!(create.input_schema["properties"]["tag"]["type"], "string");

        let list = src.get_tool("listPets").unwrap();
        let list_props = list.input_schema["properties"].as_object().unwrap();
        assert!(list_props.contains_key("tags"));
        assert!(!list_props.contains_key("session"));

        let put_tags = src.get_tool("put_tags").unwrap();
        assert_eq!(put_tags.input_schema["properties"]["body"]["type"], "array");
    }

    #[tokio::test]
    async fn output_schema_wraps_resolved_response_schema() {
        let src = source("http://localhost:1", &RouteMap::expose_all()).await;
        let tool = src.get_tool("get_pets_petId").unwrap();
        let out = tool.output_schema.expect("output schema");
        assert_eq!(out["properties"]["body"]["type"], "object");
        assert!(src.get_tool("missing").unwrap().output_schema.is_none());
    }

    #[tokio::test]
    async fn selection_limits_generated_tools() {
        let mappings: ToolMappings = [("createPet".to_string(), ToolMapping::default())]
            .into_iter()
            .collect();
        let spec: OpenAPI = serde_yaml::from_str(PETSTORE).unwrap();
        let http = reqwest::Client::new();
        let resolver =
            OpenApiResolver::new(SpecLocation::File("/virtual/openapi.yaml".into()), &spec, &http)
                .unwrap();
        let routes: Vec<HttpRoute> = enumerate_operations(&spec, &resolver)
            .await
            .into_iter()
            .map(|o| o.route)
            .collect();

        let src = source("http://localhost:1", &RouteMap::from_mappings(&routes, &mappings)).await;
        assert_eq!(src.len(), 1);
        assert!(src.get_tool("createPet").is_some());
    }

    #[tokio::test]
    async fn call_fills_path_query_and_header_arguments() {
        let base = upstream().await;
        let src = source(&base, &RouteMap::expose_all()).await;

        let result = src
            .call_tool(
                "get_pets_petId",
                &args(json!({ "petId": "rex", "verbose": true, "X-Trace": "t-1" })),
            )
            .await
            .unwrap();
        let structured = result.structured_content.expect("structured content");
        assert_eq!(structured["body"]["id"], "rex");
        assert_eq!(structured["body"]["verbose"], "true");
        assert_eq!(structured["body"]["trace"], "t-1");
    }

    #[tokio::test]
    async fn base_url_query_is_kept_alongside_arguments() {
        let base = upstream().await;
        let src = source(&format!("{base}?source=base"), &RouteMap::expose_all()).await;

        let result = src
            .call_tool(
                "get_pets_petId",
                &args(json!({ "petId": "rex", "verbose": false, "X-Trace": "t-2" })),
            )
            .await
            .unwrap();
        let body = &result.structured_content.unwrap()["body"];
        assert_eq!(body["id"], "rex");
        assert_eq!(body["verbose"], "false");
        assert_eq!(body["source"], "base");
    }

    #[tokio::test]
    async fn call_explodes_array_query_parameters() {
        let base = upstream().await;
        let src = source(&base, &RouteMap::expose_all()).await;
        let result = src
            .call_tool("listPets", &args(json!({ "tags": ["a", "b"] })))
            .await
            .unwrap();
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["body"][0]["tags"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn call_sends_flattened_body() {
        let base = upstream().await;
        let src = source(&base, &RouteMap::expose_all()).await;
        let result = src
            .call_tool("createPet", &args(json!({ "name": "rex", "tag": "dog" })))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));
        let text = result.content[0].as_text().unwrap().text.clone();
        let body: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["created"], json!({ "name": "rex", "tag": "dog" }));
    }

    #[tokio::test]
    async fn missing_required_argument_is_a_runtime_error() {
        let src = source("http://localhost:1", &RouteMap::expose_all()).await;
        let err = src
            .call_tool("get_pets_petId", &args(json!({ "verbose": true })))
            .await
            .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::Runtime(ref m) if m.contains("petId")));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let src = source("http://localhost:1", &RouteMap::expose_all()).await;
        let err = src.call_tool("nope", &JsonObject::new()).await.unwrap_err();
        assert!(matches!(err, OpenApiToolsError::UnknownTool(ref n) if n == "nope"));
    }

    #[tokio::test]
    async fn non_2xx_is_an_http_error_with_status_and_body() {
        let base = upstream().await;
        let src = source(&base, &RouteMap::expose_all()).await;
        let err = src.call_tool("missing", &JsonObject::new()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("404"), "{msg}");
        assert!(msg.contains("no such thing"), "{msg}");
    }

    #[tokio::test]
    async fn image_responses_become_image_content() {
        let base = upstream().await;
        let src = source(&base, &RouteMap::expose_all()).await;
        let result = src.call_tool("logo", &JsonObject::new()).await.unwrap();
        let image = result.content[0].as_image().expect("image content");
        assert_eq!(image.mime_type, "image/png");
    }

    #[tokio::test]
    async fn renamed_tools_answer_to_both_names() {
        let base = upstream().await;
        let src = source(&base, &RouteMap::expose_all()).await;
        let mappings: ToolMappings = [(
            "createPet".to_string(),
            ToolMapping {
                name: Some("add_pet".to_string()),
                description: Some("Register a pet".to_string()),
            },
        )]
        .into_iter()
        .collect();

        let report = src.transform(&mut ToolTransformer::new(mappings)).unwrap();
        assert_eq!(report.renamed.len(), 1);

        let tool = src.get_tool("add_pet").unwrap();
        assert_eq!(tool.description.as_deref(), Some("Register a pet"));
        assert!(src.list_tools().iter().all(|t| t.name != "createPet"));

        for name in ["add_pet", "createPet"] {
            let result = src
                .call_tool(name, &args(json!({ "name": "rex" })))
                .await
                .unwrap();
            assert_eq!(result.is_error, Some(false));
        }
    }

    #[tokio::test]
    async fn closed_client_fails_calls() {
        let base = upstream().await;
        let src = source(&base, &RouteMap::expose_all()).await;
        src.client().close();
        let err = src.call_tool("missing", &JsonObject::new()).await.unwrap_err();
        assert!(matches!(err, OpenApiToolsError::Runtime(_)));
    }
}
