//! Schema compilation: declared parameters plus handler signatures become a
//! [`ParameterSchema`], which exports as a JSON schema for the transport.

use super::handler::ParamSignature;
use super::param::SemanticType;
use crate::types::tool::{
    FunctionDefinition, ParameterSchema, PropertyKind, PropertySchema, ToolDefinition,
};
use crate::{Error, ErrorContext, Result};
use serde_json::json;
use std::collections::HashSet;

/// A parameter as declared on the [`Tool`](super::Tool) builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamDecl {
    pub name: String,
    pub description: Option<String>,
    pub optional: bool,
    /// Comma-separated enum member list replacing the natural member names.
    pub enum_override: Option<String>,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Compiles tool declarations into schemas.
pub struct SchemaCompiler;

impl SchemaCompiler {
    /// Pair declarations with handler parameter types, in order.
    ///
    /// Fails with a configuration error on arity mismatch, duplicate or empty
    /// names, unsupported parameter types and invalid enum overrides.
    pub fn compile(
        tool: &str,
        decls: &[ParamDecl],
        signature: &[ParamSignature],
    ) -> Result<ParameterSchema> {
        if decls.len() != signature.len() {
            return Err(Error::configuration_with_context(
                format!(
                    "Tool '{}' declares {} parameter(s) but its handler takes {}",
                    tool,
                    decls.len(),
                    signature.len()
                ),
                ErrorContext::new()
                    .with_field_path(format!("{}.parameters", tool))
                    .with_source("schema_compiler"),
            ));
        }

        let mut seen = HashSet::new();
        let mut schema = ParameterSchema::default();
        for (decl, sig) in decls.iter().zip(signature) {
            let field = format!("{}.{}", tool, decl.name);
            if decl.name.trim().is_empty() {
                return Err(config_error(tool, "Parameter name must not be empty", &field));
            }
            if !seen.insert(decl.name.as_str()) {
                return Err(config_error(
                    tool,
                    &format!("Duplicate parameter '{}'", decl.name),
                    &field,
                ));
            }

            let property = Self::property(tool, decl, sig)?;
            if !(decl.optional || sig.optional_by_type) {
                schema.required.push(decl.name.clone());
            }
            schema.properties.push((decl.name.clone(), property));
        }
        Ok(schema)
    }

    fn property(tool: &str, decl: &ParamDecl, sig: &ParamSignature) -> Result<PropertySchema> {
        let field = format!("{}.{}", tool, decl.name);
        let (kind, natural) = match sig.semantic_type {
            SemanticType::Integer => (PropertyKind::Integer, None),
            SemanticType::Number => (PropertyKind::Number, None),
            SemanticType::Boolean => (PropertyKind::Boolean, None),
            SemanticType::String => (PropertyKind::String, None),
            SemanticType::Enum(names) => (PropertyKind::Enum, Some(names)),
            SemanticType::Unsupported(type_name) => {
                return Err(config_error(
                    tool,
                    &format!(
                        "Unsupported type '{}' for parameter '{}'",
                        type_name, decl.name
                    ),
                    &field,
                ));
            }
        };

        let enum_values = match (natural, &decl.enum_override) {
            (None, Some(_)) => {
                return Err(config_error(
                    tool,
                    &format!(
                        "Parameter '{}' has enum values but type '{}' is not an enumeration",
                        decl.name, sig.type_name
                    ),
                    &field,
                ));
            }
            (None, None) => None,
            (Some(_), Some(list)) => {
                let values: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(String::from)
                    .collect();
                if values.is_empty() {
                    return Err(config_error(
                        tool,
                        &format!("Enum override for parameter '{}' is empty", decl.name),
                        &field,
                    ));
                }
                Some(values)
            }
            (Some(names), None) => Some(names.iter().map(|n| n.to_string()).collect()),
        };

        Ok(PropertySchema {
            kind,
            description: decl.description.clone(),
            enum_values,
        })
    }

    /// Export form of one definition.
    pub fn export(def: &FunctionDefinition) -> ToolDefinition {
        let mut builder = ObjectSchemaBuilder::new();
        for (name, prop) in &def.parameters.properties {
            let mut schema = json!({ "type": prop.kind.json_type() });
            if let Some(desc) = &prop.description {
                schema["description"] = json!(desc);
            }
            if let Some(values) = &prop.enum_values {
                schema["enum"] = json!(values);
            }
            builder = builder.add_property(name, schema);
        }

        ToolDefinition {
            tool_type: "function".to_string(),
            name: def.name.clone(),
            description: def.description.clone(),
            parameters: builder.set_required(&def.parameters.required).build(),
        }
    }
}

fn config_error(tool: &str, message: &str, field: &str) -> Error {
    Error::configuration_with_context(
        format!("Tool '{}': {}", tool, message),
        ErrorContext::new()
            .with_field_path(field)
            .with_source("schema_compiler"),
    )
}

/// Builder for an object JSON schema with closed properties.
#[derive(Debug, Clone, Default)]
struct ObjectSchemaBuilder {
    properties: Vec<(String, serde_json::Value)>,
    required: Vec<String>,
}

impl ObjectSchemaBuilder {
    fn new() -> Self {
        Self::default()
    }

    fn add_property(mut self, name: impl Into<String>, schema: serde_json::Value) -> Self {
        self.properties.push((name.into(), schema));
        self
    }

    fn set_required(mut self, required: &[String]) -> Self {
        self.required = required.to_vec();
        self
    }

    fn build(self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("type".into(), json!("object"));

        let mut properties = serde_json::Map::new();
        for (name, schema) in self.properties {
            properties.insert(name, schema);
        }
        map.insert("properties".into(), properties.into());
        map.insert("required".into(), self.required.into());
        map.insert("additionalProperties".into(), json!(false));

        map.into()
    }
}
