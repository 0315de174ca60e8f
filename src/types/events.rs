//! Conversation updates received from the realtime transport.
//!
//! Each update carries a typed payload plus the raw JSON event it was parsed
//! from, so consumers can reach fields this model does not surface.

use super::item::ConversationItem;
use super::tool::FunctionCall;
use crate::transport::TransportError;
use base64::Engine;
use bytes::Bytes;
use serde_json::Value;

/// Discriminant of a [`ConversationUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    SessionStarted,
    AudioDelta,
    AudioDone,
    ContentPartStarted,
    ContentPartFinished,
    Error,
    FunctionCallArgumentsDelta,
    FunctionCallArgumentsDone,
    InputAudioBufferCleared,
    InputAudioBufferCommitted,
    InputSpeechStarted,
    InputSpeechFinished,
    InputTranscriptionFailed,
    InputTranscriptionFinished,
    ItemStarted,
    ItemFinished,
    ItemDeleted,
    OutputTranscriptionDelta,
    OutputTranscriptionFinished,
    ResponseStarted,
    ResponseFinished,
    SessionConfigured,
    TextDelta,
    TextDone,
    Unrecognized,
}

impl UpdateKind {
    /// Every kind except [`UpdateKind::Unrecognized`].
    pub const ALL: [UpdateKind; 24] = [
        UpdateKind::SessionStarted,
        UpdateKind::AudioDelta,
        UpdateKind::AudioDone,
        UpdateKind::ContentPartStarted,
        UpdateKind::ContentPartFinished,
        UpdateKind::Error,
        UpdateKind::FunctionCallArgumentsDelta,
        UpdateKind::FunctionCallArgumentsDone,
        UpdateKind::InputAudioBufferCleared,
        UpdateKind::InputAudioBufferCommitted,
        UpdateKind::InputSpeechStarted,
        UpdateKind::InputSpeechFinished,
        UpdateKind::InputTranscriptionFailed,
        UpdateKind::InputTranscriptionFinished,
        UpdateKind::ItemStarted,
        UpdateKind::ItemFinished,
        UpdateKind::ItemDeleted,
        UpdateKind::OutputTranscriptionDelta,
        UpdateKind::OutputTranscriptionFinished,
        UpdateKind::ResponseStarted,
        UpdateKind::ResponseFinished,
        UpdateKind::SessionConfigured,
        UpdateKind::TextDelta,
        UpdateKind::TextDone,
    ];

    /// Server event `type` for this kind.
    pub fn event_type(&self) -> Option<&'static str> {
        let name = match self {
            UpdateKind::SessionStarted => "session.created",
            UpdateKind::AudioDelta => "response.audio.delta",
            UpdateKind::AudioDone => "response.audio.done",
            UpdateKind::ContentPartStarted => "response.content_part.added",
            UpdateKind::ContentPartFinished => "response.content_part.done",
            UpdateKind::Error => "error",
            UpdateKind::FunctionCallArgumentsDelta => "response.function_call_arguments.delta",
            UpdateKind::FunctionCallArgumentsDone => "response.function_call_arguments.done",
            UpdateKind::InputAudioBufferCleared => "input_audio_buffer.cleared",
            UpdateKind::InputAudioBufferCommitted => "input_audio_buffer.committed",
            UpdateKind::InputSpeechStarted => "input_audio_buffer.speech_started",
            UpdateKind::InputSpeechFinished => "input_audio_buffer.speech_stopped",
            UpdateKind::InputTranscriptionFailed => {
                "conversation.item.input_audio_transcription.failed"
            }
            UpdateKind::InputTranscriptionFinished => {
                "conversation.item.input_audio_transcription.completed"
            }
            UpdateKind::ItemStarted => "response.output_item.added",
            UpdateKind::ItemFinished => "response.output_item.done",
            UpdateKind::ItemDeleted => "conversation.item.deleted",
            UpdateKind::OutputTranscriptionDelta => "response.audio_transcript.delta",
            UpdateKind::OutputTranscriptionFinished => "response.audio_transcript.done",
            UpdateKind::ResponseStarted => "response.created",
            UpdateKind::ResponseFinished => "response.done",
            UpdateKind::SessionConfigured => "session.updated",
            UpdateKind::TextDelta => "response.text.delta",
            UpdateKind::TextDone => "response.text.done",
            UpdateKind::Unrecognized => return None,
        };
        Some(name)
    }

    pub fn from_event_type(event_type: &str) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.event_type() == Some(event_type))
            .unwrap_or(UpdateKind::Unrecognized)
    }
}

/// Field access on a raw server event. Missing or mistyped fields read as empty.
struct Fields<'a>(&'a Value);

impl<'a> Fields<'a> {
    fn at(&self, path: &str) -> Option<&'a Value> {
        path.split('.').try_fold(self.0, |v, key| v.get(key))
    }

    fn opt_str(&self, path: &str) -> Option<String> {
        self.at(path).and_then(Value::as_str).map(String::from)
    }

    fn str(&self, path: &str) -> String {
        self.opt_str(path).unwrap_or_default()
    }

    /// Out-of-range values read as absent.
    fn u32(&self, path: &str) -> u32 {
        self.at(path)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or_default()
    }

    fn u64(&self, path: &str) -> u64 {
        self.at(path).and_then(Value::as_u64).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionStarted {
    pub session_id: String,
    pub model: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfigured {
    pub session_id: String,
    pub raw: Value,
}

/// A chunk of output audio, decoded from base64.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioDelta {
    pub response_id: String,
    pub item_id: String,
    pub content_index: u32,
    pub delta: Bytes,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioDone {
    pub response_id: String,
    pub item_id: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentPartStarted {
    pub item_id: String,
    pub content_index: u32,
    pub part_type: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentPartFinished {
    pub item_id: String,
    pub content_index: u32,
    pub text: Option<String>,
    pub audio_transcript: Option<String>,
    pub raw: Value,
}

/// An error reported by the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorUpdate {
    pub message: String,
    pub code: Option<String>,
    pub error_type: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallArgumentsDelta {
    pub item_id: String,
    pub call_id: String,
    pub delta: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallArgumentsDone {
    pub item_id: String,
    pub call_id: String,
    pub name: Option<String>,
    pub arguments: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputAudioBufferCleared {
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputAudioBufferCommitted {
    pub item_id: String,
    pub previous_item_id: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputSpeechStarted {
    pub item_id: String,
    pub audio_start_ms: u64,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputSpeechFinished {
    pub item_id: String,
    pub audio_end_ms: u64,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputTranscriptionFailed {
    pub item_id: String,
    pub content_index: u32,
    pub message: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputTranscriptionFinished {
    pub item_id: String,
    pub content_index: u32,
    pub transcript: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemStarted {
    pub item_id: String,
    pub item: Option<ConversationItem>,
    pub raw: Value,
}

/// A finished output item. Function call items carry the call to dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFinished {
    pub item_id: String,
    pub function_name: Option<String>,
    pub function_call_id: Option<String>,
    pub function_call_arguments: Option<String>,
    pub item: Option<ConversationItem>,
    pub raw: Value,
}

impl ItemFinished {
    /// The call this item requests, when it names a function.
    pub fn function_call(&self) -> Option<FunctionCall> {
        let name = self.function_name.as_deref().filter(|n| !n.is_empty())?;
        Some(FunctionCall {
            call_id: self.function_call_id.clone().unwrap_or_default(),
            name: name.to_string(),
            arguments: self.function_call_arguments.clone().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemDeleted {
    pub item_id: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputTranscriptionDelta {
    pub item_id: String,
    pub delta: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputTranscriptionFinished {
    pub item_id: String,
    pub transcript: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseStarted {
    pub response_id: String,
    pub raw: Value,
}

/// A finished response. Usage lives at `response.usage` inside `raw`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFinished {
    pub response_id: String,
    pub status: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextDelta {
    pub item_id: String,
    pub delta: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextDone {
    pub item_id: String,
    pub text: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unrecognized {
    pub event_type: String,
    pub raw: Value,
}

/// One event from the transport's inbound sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationUpdate {
    SessionStarted(SessionStarted),
    AudioDelta(AudioDelta),
    AudioDone(AudioDone),
    ContentPartStarted(ContentPartStarted),
    ContentPartFinished(ContentPartFinished),
    Error(ErrorUpdate),
    FunctionCallArgumentsDelta(FunctionCallArgumentsDelta),
    FunctionCallArgumentsDone(FunctionCallArgumentsDone),
    InputAudioBufferCleared(InputAudioBufferCleared),
    InputAudioBufferCommitted(InputAudioBufferCommitted),
    InputSpeechStarted(InputSpeechStarted),
    InputSpeechFinished(InputSpeechFinished),
    InputTranscriptionFailed(InputTranscriptionFailed),
    InputTranscriptionFinished(InputTranscriptionFinished),
    ItemStarted(ItemStarted),
    ItemFinished(ItemFinished),
    ItemDeleted(ItemDeleted),
    OutputTranscriptionDelta(OutputTranscriptionDelta),
    OutputTranscriptionFinished(OutputTranscriptionFinished),
    ResponseStarted(ResponseStarted),
    ResponseFinished(ResponseFinished),
    SessionConfigured(SessionConfigured),
    TextDelta(TextDelta),
    TextDone(TextDone),
    Unrecognized(Unrecognized),
}

/// A payload type with a fixed [`UpdateKind`], used for typed streams.
pub trait UpdateVariant: Clone + Send + Sync + 'static {
    const KIND: UpdateKind;

    fn from_update(update: &ConversationUpdate) -> Option<Self>;
}

macro_rules! update_variants {
    ($($variant:ident => $payload:ident),+ $(,)?) => {
        impl ConversationUpdate {
            pub fn kind(&self) -> UpdateKind {
                match self {
                    $(ConversationUpdate::$variant(_) => UpdateKind::$variant,)+
                }
            }

            /// The raw server event this update was parsed from.
            pub fn raw(&self) -> &Value {
                match self {
                    $(ConversationUpdate::$variant(p) => &p.raw,)+
                }
            }
        }

        $(
            impl UpdateVariant for $payload {
                const KIND: UpdateKind = UpdateKind::$variant;

                fn from_update(update: &ConversationUpdate) -> Option<Self> {
                    match update {
                        ConversationUpdate::$variant(p) => Some(p.clone()),
                        _ => None,
                    }
                }
            }

            impl From<$payload> for ConversationUpdate {
                fn from(payload: $payload) -> Self {
                    ConversationUpdate::$variant(payload)
                }
            }
        )+
    };
}

update_variants! {
    SessionStarted => SessionStarted,
    AudioDelta => AudioDelta,
    AudioDone => AudioDone,
    ContentPartStarted => ContentPartStarted,
    ContentPartFinished => ContentPartFinished,
    Error => ErrorUpdate,
    FunctionCallArgumentsDelta => FunctionCallArgumentsDelta,
    FunctionCallArgumentsDone => FunctionCallArgumentsDone,
    InputAudioBufferCleared => InputAudioBufferCleared,
    InputAudioBufferCommitted => InputAudioBufferCommitted,
    InputSpeechStarted => InputSpeechStarted,
    InputSpeechFinished => InputSpeechFinished,
    InputTranscriptionFailed => InputTranscriptionFailed,
    InputTranscriptionFinished => InputTranscriptionFinished,
    ItemStarted => ItemStarted,
    ItemFinished => ItemFinished,
    ItemDeleted => ItemDeleted,
    OutputTranscriptionDelta => OutputTranscriptionDelta,
    OutputTranscriptionFinished => OutputTranscriptionFinished,
    ResponseStarted => ResponseStarted,
    ResponseFinished => ResponseFinished,
    SessionConfigured => SessionConfigured,
    TextDelta => TextDelta,
    TextDone => TextDone,
    Unrecognized => Unrecognized,
}

impl ConversationUpdate {
    /// Parse a realtime server event. Unknown event types become
    /// [`ConversationUpdate::Unrecognized`]; only an undecodable audio delta fails.
    pub fn from_server_event(raw: Value) -> Result<Self, TransportError> {
        let event_type = raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let f = Fields(&raw);

        let update = match UpdateKind::from_event_type(&event_type) {
            UpdateKind::SessionStarted => SessionStarted {
                session_id: f.str("session.id"),
                model: f.opt_str("session.model"),
                raw,
            }
            .into(),
            UpdateKind::SessionConfigured => SessionConfigured {
                session_id: f.str("session.id"),
                raw,
            }
            .into(),
            UpdateKind::AudioDelta => {
                let delta = base64::engine::general_purpose::STANDARD
                    .decode(f.str("delta"))
                    .map_err(|e| {
                        TransportError::Protocol(format!("invalid audio delta encoding: {}", e))
                    })?;
                AudioDelta {
                    response_id: f.str("response_id"),
                    item_id: f.str("item_id"),
                    content_index: f.u32("content_index"),
                    delta: Bytes::from(delta),
                    raw,
                }
                .into()
            }
            UpdateKind::AudioDone => AudioDone {
                response_id: f.str("response_id"),
                item_id: f.str("item_id"),
                raw,
            }
            .into(),
            UpdateKind::ContentPartStarted => ContentPartStarted {
                item_id: f.str("item_id"),
                content_index: f.u32("content_index"),
                part_type: f.opt_str("part.type"),
                raw,
            }
            .into(),
            UpdateKind::ContentPartFinished => ContentPartFinished {
                item_id: f.str("item_id"),
                content_index: f.u32("content_index"),
                text: f.opt_str("part.text"),
                audio_transcript: f.opt_str("part.transcript"),
                raw,
            }
            .into(),
            UpdateKind::Error => ErrorUpdate {
                message: f.str("error.message"),
                code: f.opt_str("error.code"),
                error_type: f.opt_str("error.type"),
                raw,
            }
            .into(),
            UpdateKind::FunctionCallArgumentsDelta => FunctionCallArgumentsDelta {
                item_id: f.str("item_id"),
                call_id: f.str("call_id"),
                delta: f.str("delta"),
                raw,
            }
            .into(),
            UpdateKind::FunctionCallArgumentsDone => FunctionCallArgumentsDone {
                item_id: f.str("item_id"),
                call_id: f.str("call_id"),
                name: f.opt_str("name"),
                arguments: f.str("arguments"),
                raw,
            }
            .into(),
            UpdateKind::InputAudioBufferCleared => InputAudioBufferCleared { raw }.into(),
            UpdateKind::InputAudioBufferCommitted => InputAudioBufferCommitted {
                item_id: f.str("item_id"),
                previous_item_id: f.opt_str("previous_item_id"),
                raw,
            }
            .into(),
            UpdateKind::InputSpeechStarted => InputSpeechStarted {
                item_id: f.str("item_id"),
                audio_start_ms: f.u64("audio_start_ms"),
                raw,
            }
            .into(),
            UpdateKind::InputSpeechFinished => InputSpeechFinished {
                item_id: f.str("item_id"),
                audio_end_ms: f.u64("audio_end_ms"),
                raw,
            }
            .into(),
            UpdateKind::InputTranscriptionFailed => InputTranscriptionFailed {
                item_id: f.str("item_id"),
                content_index: f.u32("content_index"),
                message: f.str("error.message"),
                raw,
            }
            .into(),
            UpdateKind::InputTranscriptionFinished => InputTranscriptionFinished {
                item_id: f.str("item_id"),
                content_index: f.u32("content_index"),
                transcript: f.str("transcript"),
                raw,
            }
            .into(),
            UpdateKind::ItemStarted => ItemStarted {
                item_id: f.str("item.id"),
                item: parse_item(&raw),
                raw,
            }
            .into(),
            UpdateKind::ItemFinished => {
                let is_call = f.opt_str("item.type").as_deref() == Some("function_call");
                ItemFinished {
                    item_id: f.str("item.id"),
                    function_name: f.opt_str("item.name").filter(|_| is_call),
                    function_call_id: f.opt_str("item.call_id").filter(|_| is_call),
                    function_call_arguments: f.opt_str("item.arguments").filter(|_| is_call),
                    item: parse_item(&raw),
                    raw,
                }
                .into()
            }
            UpdateKind::ItemDeleted => ItemDeleted {
                item_id: f.str("item_id"),
                raw,
            }
            .into(),
            UpdateKind::OutputTranscriptionDelta => OutputTranscriptionDelta {
                item_id: f.str("item_id"),
                delta: f.str("delta"),
                raw,
            }
            .into(),
            UpdateKind::OutputTranscriptionFinished => OutputTranscriptionFinished {
                item_id: f.str("item_id"),
                transcript: f.str("transcript"),
                raw,
            }
            .into(),
            UpdateKind::ResponseStarted => ResponseStarted {
                response_id: f.str("response.id"),
                raw,
            }
            .into(),
            UpdateKind::ResponseFinished => ResponseFinished {
                response_id: f.str("response.id"),
                status: f.opt_str("response.status"),
                raw,
            }
            .into(),
            UpdateKind::TextDelta => TextDelta {
                item_id: f.str("item_id"),
                delta: f.str("delta"),
                raw,
            }
            .into(),
            UpdateKind::TextDone => TextDone {
                item_id: f.str("item_id"),
                text: f.str("text"),
                raw,
            }
            .into(),
            UpdateKind::Unrecognized => Unrecognized { event_type, raw }.into(),
        };
        Ok(update)
    }
}

fn parse_item(raw: &Value) -> Option<ConversationItem> {
    raw.get("item")
        .and_then(|item| serde_json::from_value(item.clone()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_mapping_is_bijective() {
        for kind in UpdateKind::ALL {
            let name = kind.event_type().unwrap();
            assert_eq!(UpdateKind::from_event_type(name), kind);
        }
        assert_eq!(
            UpdateKind::from_event_type("rate_limits.updated"),
            UpdateKind::Unrecognized
        );
    }

    #[test]
    fn test_function_call_item_finished() {
        let update = ConversationUpdate::from_server_event(json!({
            "type": "response.output_item.done",
            "response_id": "resp_1",
            "output_index": 0,
            "item": {
                "id": "item_1",
                "type": "function_call",
                "status": "completed",
                "name": "get_weather",
                "call_id": "call_1",
                "arguments": "{\"city\":\"Oslo\"}"
            }
        }))
        .unwrap();
        assert_eq!(update.kind(), UpdateKind::ItemFinished);
        let finished = ItemFinished::from_update(&update).unwrap();
        let call = finished.function_call().unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.call_id, "call_1");
        assert_eq!(call.arguments, r#"{"city":"Oslo"}"#);
        assert_eq!(update.raw()["response_id"], "resp_1");
    }

    #[test]
    fn test_message_item_has_no_function_call() {
        let update = ConversationUpdate::from_server_event(json!({
            "type": "response.output_item.done",
            "item": {"id": "item_2", "type": "message", "role": "assistant", "content": []}
        }))
        .unwrap();
        let ConversationUpdate::ItemFinished(finished) = update else {
            panic!("expected item finished");
        };
        assert!(finished.function_call().is_none());
        assert!(finished.item.is_some());
    }

    #[test]
    fn test_audio_delta_is_decoded() {
        let update = ConversationUpdate::from_server_event(json!({
            "type": "response.audio.delta",
            "item_id": "item_3",
            "delta": "AAEC"
        }))
        .unwrap();
        let delta = AudioDelta::from_update(&update).unwrap();
        assert_eq!(delta.delta.as_ref(), &[0u8, 1, 2]);

        let bad = ConversationUpdate::from_server_event(json!({
            "type": "response.audio.delta",
            "delta": "not base64!"
        }));
        assert!(matches!(bad, Err(TransportError::Protocol(_))));
    }

    #[test]
    fn test_out_of_range_index_is_not_truncated() {
        let update = ConversationUpdate::from_server_event(json!({
            "type": "response.audio.delta",
            "content_index": 4_294_967_297u64,
            "delta": "AAEC"
        }))
        .unwrap();
        assert_eq!(AudioDelta::from_update(&update).unwrap().content_index, 0);

        let update = ConversationUpdate::from_server_event(json!({
            "type": "response.audio.delta",
            "content_index": 3,
            "delta": "AAEC"
        }))
        .unwrap();
        assert_eq!(AudioDelta::from_update(&update).unwrap().content_index, 3);
    }

    #[test]
    fn test_unknown_event_is_kept() {
        let update =
            ConversationUpdate::from_server_event(json!({"type": "rate_limits.updated"})).unwrap();
        assert!(matches!(
            update,
            ConversationUpdate::Unrecognized(Unrecognized { ref event_type, .. })
                if event_type == "rate_limits.updated"
        ));
    }

    #[test]
    fn test_error_fields() {
        let update = ConversationUpdate::from_server_event(json!({
            "type": "error",
            "error": {"type": "invalid_request_error", "code": "bad", "message": "nope"}
        }))
        .unwrap();
        let err = ErrorUpdate::from_update(&update).unwrap();
        assert_eq!(err.message, "nope");
        assert_eq!(err.code.as_deref(), Some("bad"));
    }
}
