//! Query-string serialization following `OpenAPI` parameter styles.

use openapiv3::QueryStyle;
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub(crate) struct QuerySerialization {
    pub style: QueryStyle,
    pub explode: bool,
    pub allow_reserved: bool,
    pub allow_empty_value: bool,
}

impl QuerySerialization {
    /// Settings with the `OpenAPI` default `explode` for `style`.
    pub fn new(style: QueryStyle, explode: Option<bool>) -> Self {
        let explode =
            explode.unwrap_or(matches!(style, QueryStyle::Form | QueryStyle::DeepObject));
        Self {
            style,
            explode,
            allow_reserved: false,
            allow_empty_value: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueryPair {
    pub key: String,
    pub value: String,
    pub allow_reserved: bool,
}

impl QueryPair {
    fn new(key: impl Into<String>, value: impl Into<String>, allow_reserved: bool) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            allow_reserved,
        }
    }
}

/// Serialize one query parameter value into key/value pairs.
///
/// Empty values are dropped unless the parameter is required or allows empty values.
pub(crate) fn serialize(
    name: &str,
    value: &Value,
    required: bool,
    ser: &QuerySerialization,
) -> Vec<QueryPair> {
    let reserved = ser.allow_reserved;
    if is_empty(value) {
        return if required || ser.allow_empty_value {
            vec![QueryPair::new(name, "", reserved)]
        } else {
            Vec::new()
        };
    }

    match value {
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(scalar_string).collect();
            match (&ser.style, ser.explode) {
                (QueryStyle::Form, true) => items
                    .into_iter()
                    .map(|v| QueryPair::new(name, v, reserved))
                    .collect(),
                (QueryStyle::SpaceDelimited, _) => {
                    vec![QueryPair::new(name, items.join(" "), reserved)]
                }
                (QueryStyle::PipeDelimited, _) => {
                    vec![QueryPair::new(name, items.join("|"), reserved)]
                }
                _ => vec![QueryPair::new(name, items.join(","), reserved)],
            }
        }
        Value::Object(map) => serialize_object(name, map, ser),
        scalar => vec![QueryPair::new(name, scalar_string(scalar), reserved)],
    }
}

fn serialize_object(name: &str, map: &Map<String, Value>, ser: &QuerySerialization) -> Vec<QueryPair> {
    let reserved = ser.allow_reserved;
    match (&ser.style, ser.explode) {
        (QueryStyle::DeepObject, _) => map
            .iter()
            .map(|(k, v)| QueryPair::new(format!("{name}[{k}]"), scalar_string(v), reserved))
            .collect(),
        (QueryStyle::Form, true) => map
            .iter()
            .map(|(k, v)| QueryPair::new(k.clone(), scalar_string(v), reserved))
            .collect(),
        (QueryStyle::Form, false) => {
            let flat: Vec<String> = map
                .iter()
                .flat_map(|(k, v)| [k.clone(), scalar_string(v)])
                .collect();
            vec![QueryPair::new(name, flat.join(","), reserved)]
        }
        // No object form is defined for the delimited styles; send JSON.
        _ => vec![QueryPair::new(
            name,
            Value::Object(map.clone()).to_string(),
            reserved,
        )],
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Render a JSON value for a path segment, header or query value.
pub(crate) fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Join pairs into an encoded query string.
pub(crate) fn encode(pairs: &[QueryPair]) -> String {
    pairs
        .iter()
        .map(|p| {
            format!(
                "{}={}",
                percent_encode(&p.key, false),
                percent_encode(&p.value, p.allow_reserved)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode for a query component. `&`, `=` and `#` are always encoded so pairs survive.
fn percent_encode(s: &str, allow_reserved: bool) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        let unreserved = b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~');
        let keep_reserved = allow_reserved
            && matches!(
                b,
                b':' | b'/' | b'?' | b'[' | b']' | b'@' | b'!' | b'$' | b'\'' | b'(' | b')'
                    | b'*' | b'+' | b',' | b';'
            );
        if unreserved || keep_reserved {
            out.push(char::from(b));
        } else {
            out.push('%');
            out.push(char::from(HEX[usize::from(b >> 4)]));
            out.push(char::from(HEX[usize::from(b & 0x0F)]));
        }
    }
    out
}

/// Substitute `{name}` in a path template, percent-encoding the value as one segment.
pub(crate) fn fill_path_param(path: &str, name: &str, value: &Value) -> String {
    path.replace(
        &format!("{{{name}}}"),
        &percent_encode(&scalar_string(value), false),
    )
}
