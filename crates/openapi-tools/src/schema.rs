//! `OpenAPI` schema -> JSON Schema conversion for tool input/output schemas.

use crate::error::{OpenApiToolsError, Result};
use crate::loader::SpecLocation;
use crate::resolver::OpenApiResolver;
use openapiv3::{
    AdditionalProperties, ParameterSchemaOrContent, ReferenceOr, Schema, SchemaKind, Type,
    VariantOrUnknownOrEmpty,
};
use rmcp::model::JsonObject;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Convert one `OpenAPI` schema to JSON Schema.
///
/// Nested `$ref`s are kept as `{"$ref": ...}`; only the top level is inlined by the callers.
pub(crate) fn schema_to_json(schema: &Schema) -> Value {
    let mut out = Map::new();
    let data = &schema.schema_data;
    if let Some(desc) = &data.description {
        out.insert("description".into(), json!(desc));
    }
    if let Some(default) = &data.default {
        out.insert("default".into(), default.clone());
    }
    if let Some(example) = &data.example {
        out.insert("examples".into(), json!([example]));
    }

    match &schema.schema_kind {
        SchemaKind::Type(t) => type_to_json(t, data.nullable, &mut out),
        SchemaKind::OneOf { one_of } => {
            out.insert("oneOf".into(), schemas_to_json(one_of));
        }
        SchemaKind::AnyOf { any_of } => {
            out.insert("anyOf".into(), schemas_to_json(any_of));
        }
        SchemaKind::AllOf { all_of } => {
            out.insert("allOf".into(), schemas_to_json(all_of));
        }
        SchemaKind::Not { not } => {
            out.insert("not".into(), ref_or_schema(not));
        }
        SchemaKind::Any(_) => {}
    }
    Value::Object(out)
}

fn type_to_json(t: &Type, nullable: bool, out: &mut Map<String, Value>) {
    let type_name = match t {
        Type::String(s) => {
            let values: Vec<&String> = s.enumeration.iter().flatten().collect();
            if !values.is_empty() {
                out.insert("enum".into(), json!(values));
            }
            match &s.format {
                VariantOrUnknownOrEmpty::Item(fmt) => {
                    if let Ok(v) = serde_json::to_value(fmt) {
                        out.insert("format".into(), v);
                    }
                }
                VariantOrUnknownOrEmpty::Unknown(fmt) => {
                    out.insert("format".into(), json!(fmt));
                }
                VariantOrUnknownOrEmpty::Empty => {}
            }
            "string"
        }
        Type::Number(_) => "number",
        Type::Integer(i) => {
            let values: Vec<i64> = i.enumeration.iter().flatten().copied().collect();
            if !values.is_empty() {
                out.insert("enum".into(), json!(values));
            }
            if let Some(min) = i.minimum {
                out.insert("minimum".into(), json!(min));
            }
            if let Some(max) = i.maximum {
                out.insert("maximum".into(), json!(max));
            }
            "integer"
        }
        Type::Boolean(_) => "boolean",
        Type::Array(a) => {
            if let Some(items) = &a.items {
                out.insert("items".into(), boxed_ref_or_schema(items));
            }
            "array"
        }
        Type::Object(o) => {
            if !o.properties.is_empty() {
                let props: Map<String, Value> = o
                    .properties
                    .iter()
                    .map(|(name, p)| (name.clone(), boxed_ref_or_schema(p)))
                    .collect();
                out.insert("properties".into(), Value::Object(props));
            }
            if !o.required.is_empty() {
                out.insert("required".into(), json!(o.required));
            }
            match &o.additional_properties {
                Some(AdditionalProperties::Any(b)) => {
                    out.insert("additionalProperties".into(), json!(b));
                }
                Some(AdditionalProperties::Schema(s)) => {
                    out.insert("additionalProperties".into(), ref_or_schema(s));
                }
                None => {}
            }
            "object"
        }
    };

    let type_value = if nullable {
        json!([type_name, "null"])
    } else {
        json!(type_name)
    };
    out.insert("type".into(), type_value);
}

fn ref_or_schema(r: &ReferenceOr<Schema>) -> Value {
    match r {
        ReferenceOr::Item(s) => schema_to_json(s),
        ReferenceOr::Reference { reference } => json!({ "$ref": reference }),
    }
}

fn boxed_ref_or_schema(r: &ReferenceOr<Box<Schema>>) -> Value {
    match r {
        ReferenceOr::Item(s) => schema_to_json(s),
        ReferenceOr::Reference { reference } => json!({ "$ref": reference }),
    }
}

fn schemas_to_json(list: &[ReferenceOr<Schema>]) -> Value {
    Value::Array(list.iter().map(ref_or_schema).collect())
}

/// Resolve a top-level schema reference and convert it.
///
/// An unresolvable reference degrades to `{"$ref": ...}` instead of failing the tool.
pub(crate) async fn resolve_schema_json(
    resolver: &OpenApiResolver<'_>,
    within: &SpecLocation,
    schema: &ReferenceOr<Schema>,
) -> Value {
    match schema {
        ReferenceOr::Item(s) => schema_to_json(s),
        ReferenceOr::Reference { reference } => match resolver.resolve(within, schema).await {
            Ok((_, s)) => schema_to_json(&s),
            Err(e) => {
                tracing::debug!(reference = %reference, error = %e, "keeping unresolved schema $ref");
                json!({ "$ref": reference })
            }
        },
    }
}

/// JSON Schema of a parameter. Content-typed parameters are passed as strings.
pub(crate) async fn parameter_schema_json(
    resolver: &OpenApiResolver<'_>,
    within: &SpecLocation,
    format: &ParameterSchemaOrContent,
) -> Value {
    match format {
        ParameterSchemaOrContent::Schema(s) => resolve_schema_json(resolver, within, s).await,
        ParameterSchemaOrContent::Content(_) => json!({ "type": "string" }),
    }
}

/// One tool argument, as it appears in the input schema.
pub(crate) struct ArgumentSchema<'a> {
    pub name: &'a str,
    pub schema: &'a Value,
    pub required: bool,
}

/// Build the tool input schema (always an object).
pub(crate) fn input_schema<'a>(args: impl IntoIterator<Item = ArgumentSchema<'a>>) -> JsonObject {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for arg in args {
        properties.insert(arg.name.to_string(), arg.schema.clone());
        if arg.required {
            required.push(json!(arg.name));
        }
    }

    let mut schema = JsonObject::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".into(), Value::Array(required));
    }
    schema
}

/// Wrap a response body schema as the tool output schema `{ body: <schema> }`.
///
/// MCP requires the root of an output schema to be an object.
pub(crate) fn output_schema(body: Value) -> Result<Arc<JsonObject>> {
    if !body.is_object() {
        return Err(OpenApiToolsError::OpenApi(
            "response schema is not a JSON Schema object".to_string(),
        ));
    }
    let mut properties = Map::new();
    properties.insert("body".into(), body);

    let mut schema = JsonObject::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("required".into(), json!(["body"]));
    schema.insert("properties".into(), Value::Object(properties));
    Ok(Arc::new(schema))
}
