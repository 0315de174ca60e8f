use ai_lib_realtime::stream::Subscription;
use ai_lib_realtime::transport::TransportCommand;
use ai_lib_realtime::types::events::{ResponseStarted, TextDelta};
use ai_lib_realtime::{
    ConversationItem, ConversationUpdate, Error, InMemoryTransport, PumpState, RealtimeSession,
    RealtimeSessionBuilder, SessionOptions, SessionState, StaticTools, TokenPrices, Tool,
    ToolProvider, ToolSet, TransportError, UpdateKind,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

ai_lib_realtime::tool_enum! {
    enum Unit { Celsius, Fahrenheit }
}

struct Weather;

impl ToolProvider for Weather {
    fn static_tools(tools: &mut StaticTools) {
        tools
            .add(
                Tool::new("get_weather")
                    .description("Current weather for a city")
                    .param("city", "City name")
                    .param("unit", "Temperature unit")
                    .handler(|city: String, unit: Option<Unit>| match unit {
                        Some(Unit::Fahrenheit) => format!("{}: 68F", city),
                        _ => format!("{}: 20C", city),
                    }),
            )
            .add(
                Tool::new("read_sensor")
                    .handler(|| -> Result<f64, String> { Err("sensor offline".into()) }),
            )
            .add(Tool::new("forecast").handler_async(|| async { "sunny".to_string() }));
    }
}

struct Workshop;

impl ToolProvider for Workshop {
    fn static_tools(tools: &mut StaticTools) {
        tools
            .add(Tool::new("explode").handler(|| -> i32 { panic!("gear jammed") }))
            .add(Tool::new("slow").handler_async(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "finally".to_string()
            }))
            .add(Tool::new("quick").handler(|| "quick".to_string()));
    }
}

async fn workshop(transport: &InMemoryTransport) -> RealtimeSession {
    let session = session(transport);
    session
        .initialize(
            None,
            ToolSet::new().with_type::<Workshop>().unwrap(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    session
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn session(transport: &InMemoryTransport) -> RealtimeSession {
    init_tracing();
    RealtimeSessionBuilder::new()
        .transport(Arc::new(transport.clone()))
        .token_prices(TokenPrices::new(5.0, 20.0, 100.0, 200.0))
        .env_overrides(false)
        .build()
        .unwrap()
}

async fn initialized(transport: &InMemoryTransport) -> RealtimeSession {
    let session = session(transport);
    session
        .initialize(
            None,
            ToolSet::new().with_type::<Weather>().unwrap(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    session
}

fn function_call(call_id: &str, name: &str, arguments: &str) -> Value {
    json!({
        "type": "response.output_item.done",
        "item": {
            "id": format!("item_{}", call_id),
            "type": "function_call",
            "call_id": call_id,
            "name": name,
            "arguments": arguments,
        }
    })
}

fn response_done(usage: Value) -> Value {
    json!({"type": "response.done", "response": {"id": "resp_1", "status": "completed", "usage": usage}})
}

async fn next<T>(sub: &mut Subscription<T>) -> T {
    tokio::time::timeout(WAIT, sub.recv())
        .await
        .expect("timed out")
        .expect("stream ended")
}

#[tokio::test]
async fn test_initialize_configures_merged_options_and_tools() {
    let transport = InMemoryTransport::new();
    let session = session(&transport);
    assert_eq!(session.state(), SessionState::Uninitialized);

    session
        .initialize(
            Some(SessionOptions::default().with_instructions("Be brief.")),
            ToolSet::new().with_type::<Weather>().unwrap(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.registry().len(), 3);

    let commands = transport.commands();
    let [TransportCommand::Configure(options)] = commands.as_slice() else {
        panic!("expected a single configure command, got {:?}", commands);
    };
    assert_eq!(options.instructions.as_deref(), Some("Be brief."));
    assert_eq!(options.voice.as_deref(), Some("alloy"));
    let names: Vec<_> = options.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["get_weather", "read_sensor", "forecast"]);
    assert_eq!(options.tools[0].parameters["required"], json!(["city"]));
}

#[tokio::test]
async fn test_initialize_twice_fails() {
    let transport = InMemoryTransport::new();
    let session = initialized(&transport).await;
    let err = session
        .initialize(None, ToolSet::new(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionState(_)));
    assert_eq!(transport.sessions_started(), 1);
}

#[tokio::test]
async fn test_operations_before_initialize_fail() {
    let transport = InMemoryTransport::new();
    let session = session(&transport);
    let cancel = CancellationToken::new();

    let results = [
        session.send_user_message("hi", &cancel).await,
        session.send_system_message("hi", &cancel).await,
        session.send_assistant_message("hi", &cancel).await,
        session.send_function_output("call", "out", &cancel).await,
        session.start_response_turn(&cancel).await,
        session
            .update_session_options(&SessionOptions::default(), &cancel)
            .await,
        session
            .send_audio(std::io::Cursor::new(vec![0u8; 4]), &cancel)
            .await,
    ];
    for result in results {
        assert!(matches!(result, Err(Error::SessionState(_))));
    }
    assert!(transport.commands().is_empty());
}

#[tokio::test]
async fn test_cancelled_initialize_leaves_session_uninitialized() {
    let transport = InMemoryTransport::new();
    let session = session(&transport);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = session
        .initialize(None, ToolSet::new().with_type::<Weather>().unwrap(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(session.state(), SessionState::Uninitialized);
    assert!(session.registry().is_empty());
    assert_eq!(*session.pump_state().borrow(), PumpState::Idle);

    session
        .initialize(None, ToolSet::new(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(session.is_active());
}

#[tokio::test]
async fn test_refused_session_propagates_transport_error() {
    let transport = InMemoryTransport::new();
    transport.refuse_sessions(true);
    let session = session(&transport);
    let err = session
        .initialize(None, ToolSet::new(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Connection(_))));
    assert_eq!(session.state(), SessionState::Uninitialized);
}

#[tokio::test]
async fn test_direct_operations_reach_transport() {
    let transport = InMemoryTransport::new();
    let session = initialized(&transport).await;
    let cancel = CancellationToken::new();

    session.send_user_message("hello", &cancel).await.unwrap();
    session.send_system_message("rules", &cancel).await.unwrap();
    session.send_assistant_message("hi there", &cancel).await.unwrap();
    session.send_function_output("call_9", "42", &cancel).await.unwrap();
    session.start_response_turn(&cancel).await.unwrap();
    session
        .send_audio(std::io::Cursor::new(vec![1u8, 2, 3, 4]), &cancel)
        .await
        .unwrap();

    let commands = transport.commands();
    assert_eq!(
        &commands[1..],
        &[
            TransportCommand::AddItem(ConversationItem::user_message("hello")),
            TransportCommand::AddItem(ConversationItem::system_message("rules")),
            TransportCommand::AddItem(ConversationItem::assistant_message("hi there")),
            TransportCommand::AddItem(ConversationItem::function_output("call_9", "42")),
            TransportCommand::StartResponseTurn,
            TransportCommand::SendAudio(bytes::Bytes::from_static(&[1, 2, 3, 4])),
        ]
    );
}

#[tokio::test]
async fn test_direct_operation_errors_propagate_unchanged() {
    let transport = InMemoryTransport::new();
    let session = initialized(&transport).await;
    transport.fail_with("socket closed");
    let err = session
        .start_response_turn(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Connection(ref m)) if m == "socket closed"));
}

#[tokio::test]
async fn test_function_call_round_trip() {
    let transport = InMemoryTransport::new();
    let session = initialized(&transport).await;
    let mut commands = transport.watch_commands();
    let mut started = session.function_call_started();
    let mut finished = session.function_call_finished();

    transport
        .push_server_event(function_call("call_1", "get_weather", r#"{"city":"Paris","unit":"fahrenheit"}"#))
        .unwrap();

    assert_eq!(next(&mut started).await.name, "get_weather");
    let done = next(&mut finished).await;
    assert_eq!(done.call.call_id, "call_1");
    assert_eq!(done.result, "Paris: 68F");

    assert_eq!(
        next(&mut commands).await,
        TransportCommand::AddItem(ConversationItem::function_output("call_1", "Paris: 68F"))
    );
    assert_eq!(next(&mut commands).await, TransportCommand::StartResponseTurn);
}

#[tokio::test]
async fn test_deferred_result_is_sent() {
    let transport = InMemoryTransport::new();
    let session = initialized(&transport).await;
    let mut commands = transport.watch_commands();

    transport
        .push_server_event(function_call("call_2", "forecast", ""))
        .unwrap();
    assert_eq!(
        next(&mut commands).await,
        TransportCommand::AddItem(ConversationItem::function_output("call_2", "sunny"))
    );
    assert_eq!(next(&mut commands).await, TransportCommand::StartResponseTurn);
    drop(session);
}

#[tokio::test]
async fn test_failing_tool_still_answers_once_and_starts_one_turn() {
    let transport = InMemoryTransport::new();
    let session = initialized(&transport).await;
    let mut commands = transport.watch_commands();
    let mut errors = session.error_messages();
    let mut finished = session.function_call_finished();

    transport
        .push_server_event(function_call("call_3", "read_sensor", "{}"))
        .unwrap();

    let message = next(&mut errors).await;
    assert!(message.contains("sensor offline"), "{}", message);
    assert_eq!(
        next(&mut commands).await,
        TransportCommand::AddItem(ConversationItem::function_output(
            "call_3",
            format!("Error: {}", message)
        ))
    );
    assert_eq!(next(&mut commands).await, TransportCommand::StartResponseTurn);

    // Sync point: a later successful call is answered after the failed one.
    transport
        .push_server_event(function_call("call_4", "forecast", ""))
        .unwrap();
    assert!(matches!(next(&mut commands).await, TransportCommand::AddItem(_)));
    assert_eq!(next(&mut commands).await, TransportCommand::StartResponseTurn);
    assert_eq!(next(&mut finished).await.call.call_id, "call_4");
    assert!(finished.try_recv().is_none());

    let outputs = transport
        .commands()
        .iter()
        .filter(|c| matches!(c, TransportCommand::AddItem(ConversationItem::FunctionCallOutput { call_id, .. }) if call_id == "call_3"))
        .count();
    assert_eq!(outputs, 1);
}

#[tokio::test]
async fn test_panicking_tool_is_answered_with_error_output() {
    let transport = InMemoryTransport::new();
    let session = workshop(&transport).await;
    let mut commands = transport.watch_commands();
    let mut errors = session.error_messages();
    let mut started = session.function_call_started();
    let mut finished = session.function_call_finished();

    transport
        .push_server_event(function_call("call_p", "explode", "{}"))
        .unwrap();

    let message = next(&mut errors).await;
    assert!(message.contains("Function 'explode' panicked"), "{}", message);
    assert!(message.contains("gear jammed"), "{}", message);
    assert_eq!(
        next(&mut commands).await,
        TransportCommand::AddItem(ConversationItem::function_output(
            "call_p",
            format!("Error: {}", message)
        ))
    );
    assert_eq!(next(&mut commands).await, TransportCommand::StartResponseTurn);
    assert_eq!(next(&mut started).await.call_id, "call_p");

    // The session keeps answering after the panic.
    transport
        .push_server_event(function_call("call_q", "quick", ""))
        .unwrap();
    assert_eq!(
        next(&mut commands).await,
        TransportCommand::AddItem(ConversationItem::function_output("call_q", "quick"))
    );
    assert_eq!(next(&mut commands).await, TransportCommand::StartResponseTurn);
    assert_eq!(next(&mut finished).await.call.call_id, "call_q");
    assert!(finished.try_recv().is_none());
}

#[tokio::test]
async fn test_slow_call_does_not_block_later_calls_or_updates() {
    let transport = InMemoryTransport::new();
    let session = workshop(&transport).await;
    let mut commands = transport.watch_commands();
    let mut texts = session.subscribe(UpdateKind::TextDelta);
    let begun = tokio::time::Instant::now();

    transport
        .push_server_event(function_call("call_slow", "slow", ""))
        .unwrap();
    transport
        .push_server_event(function_call("call_fast", "quick", ""))
        .unwrap();
    transport
        .push_server_event(json!({"type": "response.text.delta", "item_id": "item_t", "delta": "still here"}))
        .unwrap();

    assert_eq!(
        next(&mut commands).await,
        TransportCommand::AddItem(ConversationItem::function_output("call_fast", "quick"))
    );
    assert_eq!(next(&mut commands).await, TransportCommand::StartResponseTurn);
    assert!(matches!(
        tokio::time::timeout(WAIT, texts.next()).await,
        Ok(Some(ConversationUpdate::TextDelta(_)))
    ));
    assert!(begun.elapsed() < Duration::from_secs(1), "{:?}", begun.elapsed());

    assert_eq!(
        next(&mut commands).await,
        TransportCommand::AddItem(ConversationItem::function_output("call_slow", "finally"))
    );
    assert_eq!(next(&mut commands).await, TransportCommand::StartResponseTurn);
    assert!(begun.elapsed() >= Duration::from_secs(2));
}

#[tokio::test]
async fn test_unknown_function_reports_error_and_continues() {
    let transport = InMemoryTransport::new();
    let session = initialized(&transport).await;
    let mut commands = transport.watch_commands();
    let mut errors = session.error_messages();
    let mut started = session.function_call_started();

    transport
        .push_server_event(function_call("call_5", "launch_rocket", "{}"))
        .unwrap();

    let message = next(&mut errors).await;
    assert!(message.contains("Unknown function 'launch_rocket'"), "{}", message);
    let TransportCommand::AddItem(ConversationItem::FunctionCallOutput { output, .. }) =
        next(&mut commands).await
    else {
        panic!("expected a function output");
    };
    assert!(output.starts_with("Error: "));
    assert_eq!(next(&mut commands).await, TransportCommand::StartResponseTurn);
    assert!(started.try_recv().is_none());
}

#[tokio::test]
async fn test_non_function_items_are_ignored() {
    let transport = InMemoryTransport::new();
    let session = initialized(&transport).await;
    let mut items = session.subscribe(UpdateKind::ItemFinished);

    transport
        .push_server_event(json!({
            "type": "response.output_item.done",
            "item": {"id": "msg_1", "type": "message", "role": "assistant", "content": []}
        }))
        .unwrap();
    tokio::time::timeout(WAIT, items.next()).await.unwrap().unwrap();
    tokio::task::yield_now().await;
    assert_eq!(transport.commands().len(), 1);
}

#[tokio::test]
async fn test_usage_and_cost_are_published_once_per_distinct_snapshot() {
    let transport = InMemoryTransport::new();
    let session = initialized(&transport).await;
    let mut cost = session.total_cost();
    let mut errors = session.error_messages();
    assert_eq!(*cost.borrow(), 0.0);

    let usage = json!({"total_tokens": 10, "input_tokens": 10, "input_token_details": {"text_tokens": 10}});
    transport.push_server_event(response_done(usage.clone())).unwrap();
    tokio::time::timeout(WAIT, cost.changed()).await.unwrap().unwrap();
    assert_eq!(*cost.borrow_and_update(), 50.0);
    assert_eq!(session.usage().borrow().total_tokens, 10);

    transport.push_server_event(response_done(usage)).unwrap();
    // Sync point: the malformed response is handled after the duplicate.
    transport
        .push_server_event(json!({"type": "response.done", "response": 3}))
        .unwrap();
    let message = next(&mut errors).await;
    assert!(message.contains("Usage extraction error"), "{}", message);
    assert!(!cost.has_changed().unwrap());
}

#[tokio::test]
async fn test_price_change_applies_to_next_snapshot() {
    let transport = InMemoryTransport::new();
    let session = initialized(&transport).await;
    let mut cost = session.total_cost();
    session.set_token_prices(TokenPrices::new(1.0, 1.0, 1.0, 1.0));
    assert_eq!(session.token_prices().audio_output, 1.0);

    transport
        .push_server_event(response_done(json!({"output_token_details": {"audio_tokens": 7}})))
        .unwrap();
    tokio::time::timeout(WAIT, cost.changed()).await.unwrap().unwrap();
    assert_eq!(*cost.borrow(), 7.0);
}

#[tokio::test]
async fn test_kind_stream_keeps_upstream_order() {
    let transport = InMemoryTransport::new();
    let session = initialized(&transport).await;
    let mut texts = session.stream::<TextDelta>();

    let text = |d: &str| TextDelta {
        item_id: "item".into(),
        delta: d.into(),
        raw: json!({}),
    };
    transport.push_update(text("A"));
    transport.push_update(ResponseStarted {
        response_id: "B".into(),
        raw: json!({}),
    });
    transport.push_update(text("C"));

    let first = tokio::time::timeout(WAIT, texts.next()).await.unwrap().unwrap();
    let second = tokio::time::timeout(WAIT, texts.next()).await.unwrap().unwrap();
    assert_eq!((first.delta.as_str(), second.delta.as_str()), ("A", "C"));
}

#[tokio::test]
async fn test_pump_completes_when_transport_ends() {
    let transport = InMemoryTransport::new();
    let session = initialized(&transport).await;
    let mut pump = session.pump_state();
    transport.finish();

    let state = tokio::time::timeout(WAIT, pump.wait_for(PumpState::is_terminal))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(state, PumpState::Completed);
    assert!(session.is_active());
}

#[tokio::test]
async fn test_pump_fault_is_surfaced() {
    let transport = InMemoryTransport::new();
    let session = initialized(&transport).await;
    let mut pump = session.pump_state();
    let mut all = session.updates();

    transport.push_update(ResponseStarted {
        response_id: "r".into(),
        raw: json!({}),
    });
    transport.push_error(TransportError::Connection("reset by peer".into()));

    assert!(matches!(
        tokio::time::timeout(WAIT, all.next()).await.unwrap(),
        Some(ConversationUpdate::ResponseStarted(_))
    ));
    let state = tokio::time::timeout(WAIT, pump.wait_for(PumpState::is_terminal))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert!(matches!(state, PumpState::Faulted(ref m) if m.contains("reset by peer")));
}

#[tokio::test]
async fn test_shutdown_stops_workers_and_ends_streams() {
    let transport = InMemoryTransport::new();
    let session = initialized(&transport).await;
    let mut pump = session.pump_state();
    let mut all = session.updates();
    let mut errors = session.error_messages();

    session.shutdown().await;
    assert_eq!(session.state(), SessionState::ShutDown);

    let state = tokio::time::timeout(WAIT, pump.wait_for(PumpState::is_terminal))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(state, PumpState::Cancelled);
    assert!(all.next().await.is_none());
    assert!(errors.recv().await.is_none());

    let err = session
        .send_user_message("late", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("shut down"));
    let err = session
        .initialize(None, ToolSet::new(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionState(_)));
}
