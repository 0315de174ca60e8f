//! 会话编排模块：管理实时会话生命周期并驱动函数调用与响应轮次
//!
//! Session orchestration: one [`RealtimeSession`] owns the transport session,
//! the background update pump and the tool-call loop.
//!
//! Implementation is split into submodules:
//! - `core`: lifecycle and direct operations
//! - `tasks`: the pump, function-call routing and usage accounting workers
//! - `builder`: [`RealtimeSessionBuilder`]

pub mod builder;
pub mod core;
mod tasks;

pub use builder::RealtimeSessionBuilder;
pub use self::core::RealtimeSession;

use crate::types::tool::FunctionCall;
use serde::{Deserialize, Serialize};

/// Lifecycle of a [`RealtimeSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Uninitialized,
    Active,
    /// Terminal; reached through [`RealtimeSession::shutdown`].
    ShutDown,
}

/// Status of the background update pump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PumpState {
    /// Not started yet.
    Idle,
    Running,
    /// The transport ended the update sequence.
    Completed,
    /// The transport failed; carries the error text.
    Faulted(String),
    Cancelled,
}

impl PumpState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PumpState::Completed | PumpState::Faulted(_) | PumpState::Cancelled
        )
    }
}

/// A tool call that completed successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallFinished {
    pub call: FunctionCall,
    /// Stringified result; `"null"` when the operation returned no value.
    pub result: String,
}
