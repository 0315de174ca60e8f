//! In-memory transport for testing.

use super::{AudioSource, RealtimeTransport, TransportError, TransportSession, UpdateSource};
use crate::stream::hub::{Broadcast, Subscription};
use crate::types::events::ConversationUpdate;
use crate::types::item::ConversationItem;
use crate::types::options::SessionOptions;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type UpdateItem = std::result::Result<ConversationUpdate, TransportError>;

/// An outbound command recorded by [`InMemoryTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    Configure(SessionOptions),
    SendAudio(Bytes),
    AddItem(ConversationItem),
    StartResponseTurn,
}

struct Shared {
    commands: Mutex<Vec<TransportCommand>>,
    observers: Broadcast<TransportCommand>,
    updates_tx: Mutex<Option<mpsc::UnboundedSender<UpdateItem>>>,
    updates_rx: Mutex<Option<mpsc::UnboundedReceiver<UpdateItem>>>,
    sessions_started: AtomicUsize,
    failure: Mutex<Option<String>>,
    refuse_sessions: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Transport that records every outbound command and replays inbound updates
/// pushed by the test.
///
/// Updates pushed before the session starts receiving are buffered.
#[derive(Clone)]
pub struct InMemoryTransport {
    shared: Arc<Shared>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                commands: Mutex::new(Vec::new()),
                observers: Broadcast::new(),
                updates_tx: Mutex::new(Some(tx)),
                updates_rx: Mutex::new(Some(rx)),
                sessions_started: AtomicUsize::new(0),
                failure: Mutex::new(None),
                refuse_sessions: AtomicBool::new(false),
            }),
        }
    }

    /// Queue an inbound update.
    pub fn push_update(&self, update: impl Into<ConversationUpdate>) {
        self.push(Ok(update.into()));
    }

    /// Queue an inbound realtime server event.
    pub fn push_server_event(&self, event: serde_json::Value) -> Result<(), TransportError> {
        self.push(Ok(ConversationUpdate::from_server_event(event)?));
        Ok(())
    }

    /// Queue an inbound failure; the update sequence faults when it is reached.
    pub fn push_error(&self, error: TransportError) {
        self.push(Err(error));
    }

    /// End the inbound sequence after the queued updates.
    pub fn finish(&self) {
        lock(&self.shared.updates_tx).take();
    }

    fn push(&self, item: UpdateItem) {
        if let Some(tx) = lock(&self.shared.updates_tx).as_ref() {
            let _ = tx.send(item);
        }
    }

    /// Every outbound command so far, in order.
    pub fn commands(&self) -> Vec<TransportCommand> {
        lock(&self.shared.commands).clone()
    }

    /// Outbound commands recorded from now on.
    pub fn watch_commands(&self) -> Subscription<TransportCommand> {
        self.shared.observers.subscribe()
    }

    pub fn sessions_started(&self) -> usize {
        self.shared.sessions_started.load(Ordering::SeqCst)
    }

    /// Make every outbound operation fail with a connection error.
    pub fn fail_with(&self, message: impl Into<String>) {
        *lock(&self.shared.failure) = Some(message.into());
    }

    pub fn clear_failure(&self) {
        lock(&self.shared.failure).take();
    }

    /// Make [`start_session`](RealtimeTransport::start_session) fail.
    pub fn refuse_sessions(&self, refuse: bool) {
        self.shared.refuse_sessions.store(refuse, Ordering::SeqCst);
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("commands", &lock(&self.shared.commands).len())
            .field("sessions_started", &self.sessions_started())
            .finish()
    }
}

#[async_trait]
impl RealtimeTransport for InMemoryTransport {
    async fn start_session(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<Arc<dyn TransportSession>, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Other("session start cancelled".into()));
        }
        if self.shared.refuse_sessions.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("session refused".into()));
        }
        self.shared.sessions_started.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemorySession {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MemorySession {
    shared: Arc<Shared>,
}

impl MemorySession {
    fn record(&self, command: TransportCommand) -> std::result::Result<(), TransportError> {
        if let Some(message) = lock(&self.shared.failure).clone() {
            return Err(TransportError::Connection(message));
        }
        lock(&self.shared.commands).push(command.clone());
        self.shared.observers.publish(command);
        Ok(())
    }
}

#[async_trait]
impl TransportSession for MemorySession {
    async fn configure(&self, options: &SessionOptions) -> std::result::Result<(), TransportError> {
        self.record(TransportCommand::Configure(options.clone()))
    }

    async fn send_audio(&self, mut audio: AudioSource) -> std::result::Result<(), TransportError> {
        let mut buf = Vec::new();
        audio.read_to_end(&mut buf).await?;
        self.record(TransportCommand::SendAudio(Bytes::from(buf)))
    }

    async fn add_item(&self, item: ConversationItem) -> std::result::Result<(), TransportError> {
        self.record(TransportCommand::AddItem(item))
    }

    async fn start_response_turn(&self) -> std::result::Result<(), TransportError> {
        self.record(TransportCommand::StartResponseTurn)
    }

    fn receive_updates(&self, cancel: CancellationToken) -> UpdateSource {
        let rx = lock(&self.shared.updates_rx).take();
        let Some(rx) = rx else {
            return Box::pin(stream::once(async {
                Err(TransportError::Other("updates are already being received".into()))
            }));
        };

        Box::pin(stream::unfold((rx, cancel), |(mut rx, cancel)| async move {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = rx.recv() => item,
            };
            next.map(|item| (item, (rx, cancel)))
        }))
    }
}
