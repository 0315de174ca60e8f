//! # ai-lib-realtime
//!
//! 实时对话 API 的响应式编排层：工具注册与调用、更新流分发、会话生命周期与用量计费。
//!
//! Reactive orchestration layer over a realtime conversational API. The remote
//! model calls host operations mid-conversation; this crate registers those
//! operations, answers the calls and keeps the conversation moving.
//!
//! ## Overview
//!
//! - **Tool calling**: declare host operations with [`Tool`] and [`ToolProvider`];
//!   [`CallableRegistry`] compiles their JSON schemas and [`Dispatcher`] resolves,
//!   coerces and invokes incoming calls.
//! - **Update fan-out**: [`UpdateDemultiplexer`] splits the transport's single
//!   ordered update sequence into per-kind streams.
//! - **Session orchestration**: [`RealtimeSession`] owns the transport session,
//!   answers every function call with an output item and a new response turn,
//!   and never lets one failing tool stall the conversation.
//! - **Usage and cost**: [`UsageCostTracker`] turns response usage into
//!   observable token and cost cells.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_lib_realtime::{
//!     InMemoryTransport, RealtimeSessionBuilder, StaticTools, Tool, ToolProvider, ToolSet,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Clock;
//!
//! impl ToolProvider for Clock {
//!     fn static_tools(tools: &mut StaticTools) {
//!         tools.add(
//!             Tool::new("utc_offset")
//!                 .description("UTC offset of a city, in hours")
//!                 .param("city", "City name")
//!                 .handler(|city: String| if city == "Tokyo" { 9 } else { 0 }),
//!         );
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> ai_lib_realtime::Result<()> {
//!     let session = RealtimeSessionBuilder::new()
//!         .transport(Arc::new(InMemoryTransport::new()))
//!         .build()?;
//!
//!     let cancel = CancellationToken::new();
//!     session
//!         .initialize(None, ToolSet::new().with_type::<Clock>()?, &cancel)
//!         .await?;
//!     session.send_user_message("What time is it in Tokyo?", &cancel).await?;
//!     session.start_response_turn(&cancel).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`tools`] | Tool registration, schema compilation, argument coercion, dispatch |
//! | [`stream`] | Broadcast hub and update demultiplexer |
//! | [`session`] | Session lifecycle and the tool-call loop |
//! | [`usage`] | Token usage and cost accounting |
//! | [`transport`] | Realtime service abstraction and in-memory transport |
//! | [`types`] | Updates, conversation items, session options, tool types |
//! | [`config`] | Configuration files and environment overrides |

pub mod config;
pub mod session;
pub mod stream;
pub mod tools;
pub mod transport;
pub mod types;
pub mod usage;

// Re-export main types for convenience
pub use config::RealtimeConfig;
pub use session::{
    FunctionCallFinished, PumpState, RealtimeSession, RealtimeSessionBuilder, SessionState,
};
pub use stream::{Broadcast, Subscription, UpdateDemultiplexer, UpdateStream};
pub use tools::{
    CallableRegistry, Deferred, Dispatcher, InstanceTools, Json, StaticTools, Tool, ToolEnum,
    ToolProvider, ToolSet, ToolValue,
};
pub use transport::{InMemoryTransport, RealtimeTransport, TransportError, TransportSession};
pub use types::{
    ConversationItem, ConversationUpdate, FunctionCall, FunctionDefinition, SessionOptions,
    ToolDefinition, UpdateKind,
};
pub use usage::{TokenPrices, UsageCostTracker, UsageSnapshot};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
