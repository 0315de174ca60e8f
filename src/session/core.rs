use super::tasks;
use super::{FunctionCallFinished, PumpState, SessionState};
use crate::stream::{Broadcast, Subscription, TypedUpdateStream, UpdateDemultiplexer, UpdateStream};
use crate::tools::{CallableRegistry, Dispatcher, ToolSet};
use crate::transport::{RealtimeTransport, TransportError, TransportSession};
use crate::types::events::{ItemFinished, ResponseFinished, UpdateKind, UpdateVariant};
use crate::types::item::ConversationItem;
use crate::types::options::SessionOptions;
use crate::types::tool::FunctionCall;
use crate::usage::{TokenPrices, UsageCostTracker, UsageSnapshot};
use crate::{Error, Result};
use arc_swap::ArcSwapOption;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The open transport session and the scope its workers run in.
pub(super) struct Active {
    pub(super) transport: Arc<dyn TransportSession>,
    pub(super) scope: CancellationToken,
}

pub(super) struct Inner {
    pub(super) transport: Arc<dyn RealtimeTransport>,
    pub(super) dispatcher: Dispatcher,
    pub(super) default_options: SessionOptions,
    pub(super) demux: UpdateDemultiplexer,
    pub(super) tracker: UsageCostTracker,
    pub(super) calls_started: Broadcast<FunctionCall>,
    pub(super) calls_finished: Broadcast<FunctionCallFinished>,
    pub(super) errors: Broadcast<String>,
    pub(super) pump_state: watch::Sender<PumpState>,
    init_lock: Mutex<()>,
    active: ArcSwapOption<Active>,
    shut_down: AtomicBool,
}

impl Inner {
    /// Publish a non-fatal error notification.
    pub(super) fn report(&self, message: impl Into<String>) {
        self.errors.publish(message.into());
    }
}

/// A realtime conversation with tool calling and usage accounting.
///
/// Created by [`RealtimeSessionBuilder`](super::RealtimeSessionBuilder); becomes
/// usable after [`initialize`](Self::initialize). Update streams can be
/// subscribed before initializing and observe every update published after
/// they subscribed.
///
/// Dropping the session cancels its background workers.
pub struct RealtimeSession {
    inner: Arc<Inner>,
}

impl RealtimeSession {
    pub(super) fn new(
        transport: Arc<dyn RealtimeTransport>,
        dispatcher: Dispatcher,
        default_options: SessionOptions,
        prices: TokenPrices,
    ) -> Self {
        let (pump_state, _) = watch::channel(PumpState::Idle);
        Self {
            inner: Arc::new(Inner {
                transport,
                dispatcher,
                default_options,
                demux: UpdateDemultiplexer::new(),
                tracker: UsageCostTracker::new(prices),
                calls_started: Broadcast::new(),
                calls_finished: Broadcast::new(),
                errors: Broadcast::new(),
                pump_state,
                init_lock: Mutex::new(()),
                active: ArcSwapOption::empty(),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Open the transport session, push the merged options and the tool set,
    /// and start the background workers.
    ///
    /// `options` are merged field-wise over the session defaults; their `tools`
    /// are replaced by the export form of `tools`. On failure or cancellation
    /// the session stays uninitialized and nothing is left running.
    ///
    /// The workers run in a child scope of `cancel`; cancelling it later stops
    /// them.
    pub async fn initialize(
        &self,
        options: Option<SessionOptions>,
        tools: ToolSet,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _guard = self.inner.init_lock.lock().await;
        match self.state() {
            SessionState::Active => {
                return Err(Error::SessionState("Session is already initialized".into()))
            }
            SessionState::ShutDown => {
                return Err(Error::SessionState("Session is shut down".into()))
            }
            SessionState::Uninitialized => {}
        }

        let transport = cancellable(cancel, self.inner.transport.start_session(cancel)).await?;

        let mut options = self
            .inner
            .default_options
            .clone()
            .merge(options.unwrap_or_default());
        options.tools = tools.tool_definitions();
        cancellable(cancel, transport.configure(&options)).await?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let tool_count = tools.len();
        self.inner.dispatcher.registry().replace(tools);

        let scope = cancel.child_token();
        // Subscribe before the pump starts so no trigger is missed.
        let items = self.inner.demux.stream::<ItemFinished>();
        let responses = self.inner.demux.stream::<ResponseFinished>();
        tokio::spawn(tasks::pump(
            Arc::clone(&self.inner),
            Arc::clone(&transport),
            scope.clone(),
        ));
        tokio::spawn(tasks::route_function_calls(
            Arc::clone(&self.inner),
            Arc::clone(&transport),
            items,
            scope.clone(),
        ));
        tokio::spawn(tasks::track_usage(
            Arc::clone(&self.inner),
            responses,
            scope.clone(),
        ));

        self.inner.active.store(Some(Arc::new(Active { transport, scope })));
        info!(tools = tool_count, "Realtime session initialized");
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            SessionState::ShutDown
        } else if self.inner.active.load().is_some() {
            SessionState::Active
        } else {
            SessionState::Uninitialized
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    fn transport(&self) -> Result<Arc<dyn TransportSession>> {
        if let Some(active) = self.inner.active.load_full() {
            return Ok(Arc::clone(&active.transport));
        }
        Err(Error::SessionState(match self.state() {
            SessionState::ShutDown => "Session is shut down".into(),
            _ => "Session not initialized".into(),
        }))
    }

    /// Stream 16-bit mono PCM audio until `audio` is exhausted.
    pub async fn send_audio<R>(&self, audio: R, cancel: &CancellationToken) -> Result<()>
    where
        R: AsyncRead + Send + 'static,
    {
        let transport = self.transport()?;
        cancellable(cancel, transport.send_audio(Box::pin(audio))).await
    }

    pub async fn send_user_message(
        &self,
        text: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.add_item(ConversationItem::user_message(text), cancel).await
    }

    pub async fn send_system_message(
        &self,
        text: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.add_item(ConversationItem::system_message(text), cancel).await
    }

    pub async fn send_assistant_message(
        &self,
        text: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.add_item(ConversationItem::assistant_message(text), cancel).await
    }

    /// Answer a function call by its call id. Does not start a response turn.
    pub async fn send_function_output(
        &self,
        call_id: impl Into<String>,
        output: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.add_item(ConversationItem::function_output(call_id, output), cancel)
            .await
    }

    pub async fn add_item(&self, item: ConversationItem, cancel: &CancellationToken) -> Result<()> {
        let transport = self.transport()?;
        cancellable(cancel, transport.add_item(item)).await
    }

    pub async fn start_response_turn(&self, cancel: &CancellationToken) -> Result<()> {
        let transport = self.transport()?;
        cancellable(cancel, transport.start_response_turn()).await
    }

    /// Push `options` to the transport as given, without merging defaults.
    pub async fn update_session_options(
        &self,
        options: &SessionOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let transport = self.transport()?;
        cancellable(cancel, transport.configure(options)).await
    }

    /// Every update, unfiltered.
    pub fn updates(&self) -> UpdateStream {
        self.inner.demux.all()
    }

    pub fn subscribe(&self, kind: UpdateKind) -> UpdateStream {
        self.inner.demux.subscribe(kind)
    }

    pub fn stream<P: UpdateVariant>(&self) -> TypedUpdateStream<P> {
        self.inner.demux.stream::<P>()
    }

    pub fn demux(&self) -> &UpdateDemultiplexer {
        &self.inner.demux
    }

    /// Calls that resolved and are about to run.
    pub fn function_call_started(&self) -> Subscription<FunctionCall> {
        self.inner.calls_started.subscribe()
    }

    pub fn function_call_finished(&self) -> Subscription<FunctionCallFinished> {
        self.inner.calls_finished.subscribe()
    }

    /// Non-fatal failures: unresolvable or failing tool calls, failed tool
    /// replies and malformed usage payloads.
    pub fn error_messages(&self) -> Subscription<String> {
        self.inner.errors.subscribe()
    }

    pub fn usage(&self) -> watch::Receiver<UsageSnapshot> {
        self.inner.tracker.usage()
    }

    pub fn total_cost(&self) -> watch::Receiver<f64> {
        self.inner.tracker.total_cost()
    }

    pub fn usage_tracker(&self) -> &UsageCostTracker {
        &self.inner.tracker
    }

    pub fn set_token_prices(&self, prices: TokenPrices) {
        self.inner.tracker.set_prices(prices);
    }

    pub fn token_prices(&self) -> TokenPrices {
        self.inner.tracker.prices()
    }

    pub fn pump_state(&self) -> watch::Receiver<PumpState> {
        self.inner.pump_state.subscribe()
    }

    pub fn registry(&self) -> &Arc<CallableRegistry> {
        self.inner.dispatcher.registry()
    }

    pub fn default_options(&self) -> &SessionOptions {
        &self.inner.default_options
    }

    /// Stop the background workers and end every stream. Irreversible.
    pub async fn shutdown(&self) {
        let _guard = self.inner.init_lock.lock().await;
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(active) = self.inner.active.swap(None) {
            active.scope.cancel();
        }
        self.inner.demux.close();
        self.inner.calls_started.close();
        self.inner.calls_finished.close();
        self.inner.errors.close();
        debug!("Realtime session shut down");
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        if let Some(active) = self.inner.active.load_full() {
            active.scope.cancel();
        }
    }
}

impl std::fmt::Debug for RealtimeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSession")
            .field("state", &self.state())
            .field("pump", &*self.inner.pump_state.borrow())
            .field("tools", &self.registry().len())
            .finish()
    }
}

/// Run a transport operation unless `cancel` fires first.
async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, TransportError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = operation => result.map_err(Error::from),
    }
}
