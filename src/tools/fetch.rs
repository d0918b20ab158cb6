//! The `fetch` and `fetch_json` tools.

use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::fetch::types::DEFAULT_METHOD;
use crate::fetch::{FetchExecutor, FetchRequest, FetchResult};

/// Input schema shared by both fetch tools.
pub fn fetch_schema(default_timeout_secs: u64) -> Value {
    json!({
        "type": "object",
        "properties": {
            "url": {
                "type": "string",
                "description": "Absolute URL to fetch (scheme and host required)"
            },
            "method": {
                "type": "string",
                "description": "HTTP method",
                "default": DEFAULT_METHOD
            },
            "headers": {
                "type": "object",
                "description": "Request headers",
                "additionalProperties": { "type": "string" }
            },
            "body": {
                "type": "string",
                "description": "Raw request body"
            },
            "timeoutSeconds": {
                "type": "integer",
                "description": "Request timeout in seconds",
                "minimum": 1,
                "default": default_timeout_secs
            }
        },
        "required": ["url"]
    })
}

/// Coerce loosely typed tool arguments into a request.
pub fn request_from_arguments(
    args: &HashMap<String, Value>,
    default_timeout_secs: u64,
) -> Result<FetchRequest> {
    let url = get_string_arg(args, "url")?;
    let method = get_optional_string_arg(args, "method")?
        .map(|m| m.trim().to_ascii_uppercase())
        .unwrap_or_else(|| DEFAULT_METHOD.to_string());
    let headers = get_headers_arg(args, "headers")?;
    let body = get_body_arg(args, "body")?;
    let timeout_seconds = match present(args, "timeoutSeconds").or_else(|| present(args, "timeout")) {
        Some(value) => parse_timeout(value)?,
        None => default_timeout_secs,
    };

    let request = FetchRequest {
        url,
        method,
        headers,
        body,
        timeout_seconds,
    };
    request.validate()?;
    Ok(request)
}

/// `fetch`: body returned as text.
pub async fn fetch(
    executor: &FetchExecutor,
    args: &HashMap<String, Value>,
    default_timeout_secs: u64,
) -> Result<FetchResult> {
    let request = request_from_arguments(args, default_timeout_secs)?;
    executor.execute(&request).await
}

/// `fetch_json`: body parsed as JSON.
pub async fn fetch_json(
    executor: &FetchExecutor,
    args: &HashMap<String, Value>,
    default_timeout_secs: u64,
) -> Result<FetchResult> {
    let request = request_from_arguments(args, default_timeout_secs)?;
    executor.execute(&request).await?.into_json()
}

/// An argument that is present and not `null`.
fn present<'a>(args: &'a HashMap<String, Value>, name: &str) -> Option<&'a Value> {
    args.get(name).filter(|v| !v.is_null())
}

fn get_string_arg(args: &HashMap<String, Value>, name: &str) -> Result<String> {
    match present(args, name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(Error::InvalidParams(format!(
            "argument '{}' must be a string, got {}",
            name,
            type_name(other)
        ))),
        None => Err(Error::InvalidParams(format!(
            "Missing required argument: {}",
            name
        ))),
    }
}

fn get_optional_string_arg(args: &HashMap<String, Value>, name: &str) -> Result<Option<String>> {
    match present(args, name) {
        None => Ok(None),
        Some(_) => get_string_arg(args, name).map(Some),
    }
}

fn get_headers_arg(args: &HashMap<String, Value>, name: &str) -> Result<BTreeMap<String, String>> {
    let map = match present(args, name) {
        None => return Ok(BTreeMap::new()),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(Error::InvalidParams(format!(
                "argument '{}' must be an object, got {}",
                name,
                type_name(other)
            )))
        }
    };

    map.iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(Error::InvalidParams(format!(
                        "header '{}' must be a string, got {}",
                        key,
                        type_name(other)
                    )))
                }
            };
            Ok((key.clone(), value))
        })
        .collect()
}

fn get_body_arg(args: &HashMap<String, Value>, name: &str) -> Result<Option<String>> {
    match present(args, name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        // Structured bodies are sent as their JSON text.
        Some(value @ (Value::Object(_) | Value::Array(_))) => Ok(Some(value.to_string())),
        Some(other) => Err(Error::InvalidParams(format!(
            "argument '{}' must be a string, got {}",
            name,
            type_name(other)
        ))),
    }
}

fn parse_timeout(value: &Value) -> Result<u64> {
    let secs = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f.ceil() as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    match secs {
        Some(secs) if secs > 0 => Ok(secs),
        _ => Err(Error::InvalidParams(format!(
            "timeoutSeconds must be a positive integer, got {}",
            value
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
