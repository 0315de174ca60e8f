//! Background workers of an active session.

use super::core::Inner;
use super::{FunctionCallFinished, PumpState};
use crate::stream::TypedUpdateStream;
use crate::tools::ToolValue;
use crate::transport::TransportSession;
use crate::types::events::{ItemFinished, ResponseFinished};
use crate::types::item::ConversationItem;
use crate::types::tool::{CallResult, FunctionCall};
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Forward transport updates into the demultiplexer until the sequence ends,
/// faults or `scope` is cancelled.
pub(super) async fn pump(
    inner: Arc<Inner>,
    transport: Arc<dyn TransportSession>,
    scope: CancellationToken,
) {
    inner.pump_state.send_replace(PumpState::Running);
    let mut updates = transport.receive_updates(scope.child_token());
    let mut forwarded = 0usize;

    let state = loop {
        let next = tokio::select! {
            biased;
            _ = scope.cancelled() => None,
            next = updates.next() => Some(next),
        };
        match next {
            None => break PumpState::Cancelled,
            Some(Some(Ok(update))) => {
                inner.demux.publish(update);
                forwarded += 1;
            }
            Some(Some(Err(e))) => {
                error!(error = %e, "Update sequence faulted");
                break PumpState::Faulted(e.to_string());
            }
            Some(None) if scope.is_cancelled() => break PumpState::Cancelled,
            Some(None) => break PumpState::Completed,
        }
    };

    info!(forwarded, state = ?state, "Update pump stopped");
    inner.pump_state.send_replace(state);
}

/// Spawn one function-call task per finished item that names a function.
pub(super) async fn route_function_calls(
    inner: Arc<Inner>,
    transport: Arc<dyn TransportSession>,
    mut items: TypedUpdateStream<ItemFinished>,
    scope: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = scope.cancelled() => break,
            item = items.next() => item,
        };
        let Some(item) = item else { break };
        let Some(call) = item.function_call() else {
            continue;
        };

        debug!(function = %call.name, call_id = %call.call_id, "Function call requested");
        let inner = Arc::clone(&inner);
        let transport = Arc::clone(&transport);
        let scope = scope.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = scope.cancelled() => {}
                _ = answer_function_call(&inner, transport.as_ref(), call) => {}
            }
        });
    }
}

/// Run one call and reply to it: send its output and start a response turn,
/// whether or not the call succeeded.
async fn answer_function_call(inner: &Inner, transport: &dyn TransportSession, call: FunctionCall) {
    let result = run_function_call(inner, &call).await;
    let output = match result {
        Ok(text) => text,
        Err(text) => {
            warn!(function = %call.name, error = %text, "Function call failed");
            inner.report(text.clone());
            format!("Error: {}", text)
        }
    };

    if let Err(e) = transport
        .add_item(ConversationItem::function_output(call.call_id.clone(), output))
        .await
    {
        error!(function = %call.name, error = %e, "Failed to send function output");
        inner.report(format!("Failed to send output of '{}': {}", call.name, e));
    }
    if let Err(e) = transport.start_response_turn().await {
        error!(function = %call.name, error = %e, "Failed to start response turn");
        inner.report(format!("Failed to start response turn: {}", e));
    }
}

async fn run_function_call(inner: &Inner, call: &FunctionCall) -> CallResult {
    let dispatcher = &inner.dispatcher;
    let resolved = dispatcher
        .resolve::<ToolValue>(call, dispatcher.partial_arguments())
        .map_err(|e| e.to_string())?;

    inner.calls_started.publish(call.clone());
    let value = AssertUnwindSafe(dispatcher.invoke(resolved))
        .catch_unwind()
        .await
        .map_err(|payload| {
            format!(
                "Function '{}' panicked: {}",
                call.name,
                panic_message(payload.as_ref())
            )
        })?
        .map_err(|e| e.to_string())?;
    let result = value.as_text().to_string();
    inner.calls_finished.publish(FunctionCallFinished {
        call: call.clone(),
        result: result.clone(),
    });
    Ok(result)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text
    } else {
        "unknown panic"
    }
}

/// Fold every finished response into the usage tracker.
pub(super) async fn track_usage(
    inner: Arc<Inner>,
    mut responses: TypedUpdateStream<ResponseFinished>,
    scope: CancellationToken,
) {
    loop {
        let response = tokio::select! {
            biased;
            _ = scope.cancelled() => break,
            response = responses.next() => response,
        };
        let Some(response) = response else { break };
        if let Err(e) = inner.tracker.on_response_finished(&response) {
            warn!(response_id = %response.response_id, error = %e, "Cannot read response usage");
            inner.report(e.to_string());
        }
    }
}
