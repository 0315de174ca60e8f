//! 工具调用模块：注册宿主函数、生成模式并分派远端模型的函数调用
//!
//! Tool calling: explicit registration of host operations, JSON-schema
//! compilation, argument coercion and call dispatch.
//!
//! ## Overview
//!
//! - [`Tool`] declares one operation; its parameter types come from the handler
//!   closure signature.
//! - [`ToolProvider`] groups a type's static and instance operations.
//! - [`CallableRegistry`] turns providers into [`FunctionDefinition`]s and holds
//!   the active [`ToolSet`].
//! - [`Dispatcher`] resolves a [`FunctionCall`], coerces its arguments and runs
//!   the operation.
//!
//! [`FunctionDefinition`]: crate::types::tool::FunctionDefinition
//! [`FunctionCall`]: crate::types::tool::FunctionCall

pub mod coerce;
pub mod dispatch;
pub mod handler;
pub mod output;
pub mod param;
pub mod registry;
pub mod schema;

pub use coerce::{ArgumentCoercer, PARTIAL_CLOSING_TOKEN};
pub use dispatch::{Dispatcher, Resolved};
pub use handler::{AsyncFn, AsyncMethod, NativeArgs, Operation, ParamSignature, SyncFn, SyncMethod};
pub use output::{Deferred, IntoToolResult, Json, Outcome, ResultType, ToolReturn, ToolValue};
pub use param::{
    coerce_enum, deserialize_arg, format_duration, parse_duration, SemanticType, ToolEnum, ToolParam,
};
pub use registry::{
    CallableRegistry, InstanceOperation, InstanceTools, StaticOperation, StaticTools, Tool,
    ToolProvider, ToolSet,
};
pub use schema::{ParamDecl, SchemaCompiler};
