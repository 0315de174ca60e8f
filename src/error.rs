use crate::transport::TransportError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or parameter that caused the error (e.g., "response.usage", "arguments.color")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "registry", "dispatcher", "usage_tracker")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the realtime orchestration layer.
///
/// Errors on the tool-invocation path (`InvalidCall`, `Coercion`, `Invocation`) are
/// reported back to the remote model as text; everything else propagates to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Unsupported tool declaration, detected at registration time.
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    /// A function call that cannot be resolved or whose arguments are invalid.
    #[error("Invalid function call: {message}{}", format_context(.context))]
    InvalidCall {
        message: String,
        context: ErrorContext,
    },

    /// An argument value that cannot be converted into the parameter's native type.
    #[error("Cannot coerce argument '{parameter}': {message}")]
    Coercion { parameter: String, message: String },

    /// The tool body itself reported a failure.
    #[error("Function invocation failed: {0}")]
    Invocation(String),

    /// Session operation attempted in the wrong lifecycle state.
    #[error("Session state error: {0}")]
    SessionState(String),

    /// Malformed usage payload on a response-finished update.
    #[error("Usage extraction error: {message}{}", format_context(.context))]
    Extraction {
        message: String,
        context: ErrorContext,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be read or parsed.
    #[error("Config loading error: {0}")]
    Config(String),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration {
            message: msg.into(),
            context: ErrorContext::new().with_source("registry"),
        }
    }

    pub fn invalid_call(msg: impl Into<String>) -> Self {
        Error::InvalidCall {
            message: msg.into(),
            context: ErrorContext::new().with_source("dispatcher"),
        }
    }

    /// Create a new invalid-call error with structured context
    pub fn invalid_call_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::InvalidCall {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new extraction error with structured context
    pub fn extraction_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Extraction {
            message: msg.into(),
            context,
        }
    }

    pub fn coercion(parameter: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Coercion {
            parameter: parameter.into(),
            message: msg.into(),
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::InvalidCall { context, .. }
            | Error::Extraction { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Whether the error belongs to the tool-invocation path, where it is reported
    /// back to the remote model instead of failing the conversation.
    pub fn is_call_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidCall { .. } | Error::Coercion { .. } | Error::Invocation(_)
        )
    }
}
