//! 传输层模块：实时对话服务的抽象接口
//!
//! Transport seam. The realtime service is reached through a
//! [`RealtimeTransport`] that opens [`TransportSession`]s; the wire encoding is
//! the implementor's concern. [`memory::InMemoryTransport`] records outbound
//! commands and replays scripted inbound updates.

pub mod memory;

use crate::types::events::ConversationUpdate;
use crate::types::item::ConversationItem;
use crate::types::options::SessionOptions;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

pub use memory::{InMemoryTransport, TransportCommand};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport closed")]
    Closed,

    #[error("Transport error: {0}")]
    Other(String),
}

/// Raw audio input: 16-bit mono PCM.
pub type AudioSource = Pin<Box<dyn AsyncRead + Send>>;

/// Ordered inbound updates of one session.
pub type UpdateSource =
    Pin<Box<dyn Stream<Item = std::result::Result<ConversationUpdate, TransportError>> + Send>>;

/// Entry point of a realtime service.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn start_session(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<Arc<dyn TransportSession>, TransportError>;
}

/// One open conversation with the realtime service.
#[async_trait]
pub trait TransportSession: Send + Sync {
    async fn configure(&self, options: &SessionOptions) -> std::result::Result<(), TransportError>;

    /// Transmit audio until the source is exhausted.
    async fn send_audio(&self, audio: AudioSource) -> std::result::Result<(), TransportError>;

    async fn add_item(&self, item: ConversationItem) -> std::result::Result<(), TransportError>;

    async fn start_response_turn(&self) -> std::result::Result<(), TransportError>;

    /// The inbound update sequence. Ends when the service closes the session or
    /// `cancel` fires.
    fn receive_updates(&self, cancel: CancellationToken) -> UpdateSource;
}
