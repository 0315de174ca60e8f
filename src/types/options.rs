//! Session configuration sent to the transport.

use super::tool::ToolDefinition;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TEMPERATURE: f32 = 0.6;
pub const DEFAULT_VOICE: &str = "alloy";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const DEFAULT_VAD_THRESHOLD: f32 = 0.5;
pub const DEFAULT_VAD_PREFIX_PADDING_MS: u32 = 300;
pub const DEFAULT_VAD_SILENCE_DURATION_MS: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Pcm16,
    G711Ulaw,
    G711Alaw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionOptions {
    pub model: String,
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
        }
    }
}

/// Server-side voice activity detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad {
        threshold: f32,
        prefix_padding_ms: u32,
        silence_duration_ms: u32,
    },
}

impl Default for TurnDetection {
    fn default() -> Self {
        TurnDetection::ServerVad {
            threshold: DEFAULT_VAD_THRESHOLD,
            prefix_padding_ms: DEFAULT_VAD_PREFIX_PADDING_MS,
            silence_duration_ms: DEFAULT_VAD_SILENCE_DURATION_MS,
        }
    }
}

/// Session options. Every field is optional so callers can override a subset
/// of the defaults; see [`SessionOptions::merge`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<Modality>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<AudioFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<AudioFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    /// Filled from the active tool set when the session is configured.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl SessionOptions {
    /// Options applied when the caller supplies none.
    pub fn defaults() -> Self {
        Self {
            instructions: None,
            voice: Some(DEFAULT_VOICE.to_string()),
            modalities: Some(vec![Modality::Text, Modality::Audio]),
            input_audio_format: Some(AudioFormat::Pcm16),
            output_audio_format: Some(AudioFormat::Pcm16),
            input_audio_transcription: Some(TranscriptionOptions::default()),
            turn_detection: Some(TurnDetection::default()),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_response_output_tokens: None,
            tool_choice: None,
            tools: Vec::new(),
        }
    }

    /// Field-wise merge: every field set in `overrides` replaces the one in `self`.
    pub fn merge(self, overrides: SessionOptions) -> Self {
        Self {
            instructions: overrides.instructions.or(self.instructions),
            voice: overrides.voice.or(self.voice),
            modalities: overrides.modalities.or(self.modalities),
            input_audio_format: overrides.input_audio_format.or(self.input_audio_format),
            output_audio_format: overrides.output_audio_format.or(self.output_audio_format),
            input_audio_transcription: overrides
                .input_audio_transcription
                .or(self.input_audio_transcription),
            turn_detection: overrides.turn_detection.or(self.turn_detection),
            temperature: overrides.temperature.or(self.temperature),
            max_response_output_tokens: overrides
                .max_response_output_tokens
                .or(self.max_response_output_tokens),
            tool_choice: overrides.tool_choice.or(self.tool_choice),
            tools: if overrides.tools.is_empty() {
                self.tools
            } else {
                overrides.tools
            },
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_modalities(mut self, modalities: Vec<Modality>) -> Self {
        self.modalities = Some(modalities);
        self
    }

    pub fn with_turn_detection(mut self, turn_detection: TurnDetection) -> Self {
        self.turn_detection = Some(turn_detection);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_unset_defaults() {
        let merged = SessionOptions::defaults().merge(
            SessionOptions::default()
                .with_instructions("Be brief")
                .with_temperature(0.9),
        );
        assert_eq!(merged.instructions.as_deref(), Some("Be brief"));
        assert_eq!(merged.temperature, Some(0.9));
        assert_eq!(merged.voice.as_deref(), Some(DEFAULT_VOICE));
        assert_eq!(
            merged.input_audio_transcription.unwrap().model,
            DEFAULT_TRANSCRIPTION_MODEL
        );
        assert_eq!(merged.turn_detection, Some(TurnDetection::default()));
    }

    #[test]
    fn test_wire_shape_skips_unset_fields() {
        let value = serde_json::to_value(SessionOptions::default().with_voice("echo")).unwrap();
        assert_eq!(value, serde_json::json!({"voice": "echo"}));

        let vad = serde_json::to_value(TurnDetection::default()).unwrap();
        assert_eq!(vad["type"], "server_vad");
        assert_eq!(vad["prefix_padding_ms"], 300);
    }
}
