//! 流模块：将传输层的单一更新序列分发为按类型过滤的可观察流
//!
//! Fan-out primitives: a multi-subscriber [`Broadcast`] hub and the
//! [`UpdateDemultiplexer`] built on it.

pub mod demux;
pub mod hub;

pub use demux::{TypedUpdateStream, UpdateDemultiplexer, UpdateStream};
pub use hub::{Broadcast, Subscription};
