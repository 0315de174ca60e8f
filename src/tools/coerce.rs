//! Argument parsing and per-parameter coercion.

use super::handler::{NativeArgs, ParamSignature};
use crate::{Error, ErrorContext, Result};
use serde_json::{Map, Value};

/// Appended to a streaming argument fragment that stops inside a string value.
pub const PARTIAL_CLOSING_TOKEN: &str = "\"}";

/// Converts raw call arguments into native handler arguments.
pub struct ArgumentCoercer;

impl ArgumentCoercer {
    /// Parse call arguments as a JSON object. Blank text is an empty object.
    ///
    /// In partial mode the text may be a truncated prefix of the final
    /// arguments; it is parsed as-is, then closed with [`PARTIAL_CLOSING_TOKEN`],
    /// then closed with a bare `}`.
    pub fn parse(text: &str, partial: bool) -> Result<Map<String, Value>> {
        if text.trim().is_empty() {
            return Ok(Map::new());
        }

        let attempt = |candidate: &str| serde_json::from_str::<Value>(candidate);
        let parsed = if partial {
            attempt(text)
                .or_else(|_| attempt(&format!("{}{}", text, PARTIAL_CLOSING_TOKEN)))
                .or_else(|_| attempt(&format!("{}}}", text)))
        } else {
            attempt(text)
        };

        match parsed {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(parse_error(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(parse_error(e.to_string())),
        }
    }

    /// Coerce each declared parameter in order. Absent keys take the parameter
    /// type's absent value and never fail.
    pub fn coerce(
        params: &[(String, ParamSignature)],
        arguments: &Map<String, Value>,
    ) -> Result<NativeArgs> {
        let values = params
            .iter()
            .map(|(name, sig)| sig.coerce(name, arguments.get(name)))
            .collect::<Result<Vec<_>>>()?;
        Ok(NativeArgs::new(values))
    }
}

fn parse_error(details: String) -> Error {
    Error::invalid_call_with_context(
        "Failed to parse function arguments",
        ErrorContext::new()
            .with_field_path("arguments")
            .with_details(details)
            .with_source("argument_coercer"),
    )
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
