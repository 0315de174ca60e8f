//! 类型系统模块：定义实时会话的核心数据类型。
//!
//! # Types Module
//!
//! Core data types shared by the tool-calling, streaming and session layers.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`FunctionDefinition`] | A host operation registered as a tool |
//! | [`FunctionCall`] | A tool invocation requested by the remote model |
//! | [`ToolDefinition`] | Export form of a tool sent to the transport |
//! | [`ConversationUpdate`] | One inbound event from the transport |
//! | [`ConversationItem`] | A conversation item sent to or received from the transport |
//! | [`SessionOptions`] | Session configuration |
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`events`] | Conversation updates and their payloads |
//! | [`item`] | Conversation items and content parts |
//! | [`options`] | Session options and defaults |
//! | [`tool`] | Tool/function calling types |

pub mod events;
pub mod item;
pub mod options;
pub mod tool;

pub use events::{ConversationUpdate, UpdateKind, UpdateVariant};
pub use item::{ContentPart, ConversationItem, ItemRole};
pub use options::{AudioFormat, Modality, SessionOptions, TranscriptionOptions, TurnDetection};
pub use tool::{
    CallResult, FunctionCall, FunctionDefinition, OwnerKind, ParameterSchema, PropertyKind,
    PropertySchema, ToolDefinition,
};
