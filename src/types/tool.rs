//! Tool calling definitions: registered functions, their parameter schemas and
//! the calls the remote model makes against them.

use crate::tools::handler::{Operation, Target};
use crate::tools::output::ResultType;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::{Arc, Weak};

/// JSON-schema kind of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Integer,
    Number,
    Boolean,
    String,
    Enum,
}

impl PropertyKind {
    /// The JSON-schema `type` this kind exports as. Enums are strings with an `enum` list.
    pub fn json_type(&self) -> &'static str {
        match self {
            PropertyKind::Integer => "integer",
            PropertyKind::Number => "number",
            PropertyKind::Boolean => "boolean",
            PropertyKind::String | PropertyKind::Enum => "string",
        }
    }
}

/// Schema of one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySchema {
    pub kind: PropertyKind,
    pub description: Option<String>,
    /// Non-empty exactly when `kind` is [`PropertyKind::Enum`].
    pub enum_values: Option<Vec<String>>,
}

/// Ordered parameter properties plus the required names in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSchema {
    pub properties: Vec<(String, PropertySchema)>,
    pub required: Vec<String>,
}

impl ParameterSchema {
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    Static,
    Instance,
}

/// Owner handle. Instance owners are held through a `Weak` so registration never
/// extends the instance's lifetime.
#[derive(Clone)]
pub(crate) enum Owner {
    Static,
    Instance(Weak<dyn Any + Send + Sync>),
}

impl Owner {
    pub(crate) fn instance<T: Send + Sync + 'static>(instance: &Arc<T>) -> Self {
        let erased: Arc<dyn Any + Send + Sync> = instance.clone();
        Owner::Instance(Arc::downgrade(&erased))
    }
}

/// A host operation exposed to the remote model as a callable tool.
#[derive(Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: Option<String>,
    pub parameters: ParameterSchema,
    pub(crate) owner: Owner,
    pub(crate) operation: Arc<Operation>,
}

impl FunctionDefinition {
    pub fn owner_kind(&self) -> OwnerKind {
        match self.owner {
            Owner::Static => OwnerKind::Static,
            Owner::Instance(_) => OwnerKind::Instance,
        }
    }

    /// Whether the bound owner (if any) is still alive.
    pub fn is_owner_alive(&self) -> bool {
        match &self.owner {
            Owner::Static => true,
            Owner::Instance(weak) => weak.strong_count() > 0,
        }
    }

    /// Upgrade the owner reference. `Ok(None)` for static functions, `Err(())` if
    /// the instance has been dropped.
    pub(crate) fn resolve_owner(&self) -> std::result::Result<Option<Target>, ()> {
        match &self.owner {
            Owner::Static => Ok(None),
            Owner::Instance(weak) => weak.upgrade().map(Some).ok_or(()),
        }
    }

    pub fn result_type(&self) -> ResultType {
        self.operation.result_type()
    }

    /// Export form sent to the transport.
    pub fn to_tool(&self) -> ToolDefinition {
        crate::tools::schema::SchemaCompiler::export(self)
    }
}

impl std::fmt::Debug for FunctionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("owner_kind", &self.owner_kind())
            .field("result_type", &self.result_type().display())
            .finish()
    }
}

/// Tool definition in the transport's export format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String, // "function"
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value, // JSON Schema
}

/// A tool invocation requested by the remote model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Transport identifier used to answer the call.
    #[serde(default)]
    pub call_id: String,
    pub name: String,
    /// Raw JSON arguments; may be a truncated fragment while still streaming.
    #[serde(default)]
    pub arguments: String,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }
}

/// Outcome of one function call: the stringified value or the failure text.
pub type CallResult = std::result::Result<String, String>;
