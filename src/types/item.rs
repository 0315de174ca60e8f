//! Conversation items exchanged with the realtime transport.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemRole {
    System,
    User,
    Assistant,
}

/// One part of a message item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText {
        text: String,
    },
    InputAudio {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transcript: Option<String>,
    },
    Text {
        text: String,
    },
    Audio {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transcript: Option<String>,
    },
}

impl ContentPart {
    pub fn input_text(text: impl Into<String>) -> Self {
        ContentPart::InputText { text: text.into() }
    }

    /// Text carried by the part, or its transcript for audio parts.
    pub fn text(&self) -> Option<&str> {
        match self {
            ContentPart::InputText { text } | ContentPart::Text { text } => Some(text),
            ContentPart::InputAudio { transcript, .. } | ContentPart::Audio { transcript, .. } => {
                transcript.as_deref()
            }
        }
    }
}

/// A conversation item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        role: ItemRole,
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    FunctionCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
    FunctionCallOutput {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        call_id: String,
        output: String,
    },
}

impl ConversationItem {
    pub fn user_message(text: impl Into<String>) -> Self {
        Self::message(ItemRole::User, vec![ContentPart::input_text(text)])
    }

    pub fn system_message(text: impl Into<String>) -> Self {
        Self::message(ItemRole::System, vec![ContentPart::input_text(text)])
    }

    pub fn assistant_message(text: impl Into<String>) -> Self {
        Self::message(ItemRole::Assistant, vec![ContentPart::Text { text: text.into() }])
    }

    pub fn function_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        ConversationItem::FunctionCallOutput {
            id: None,
            call_id: call_id.into(),
            output: output.into(),
        }
    }

    fn message(role: ItemRole, content: Vec<ContentPart>) -> Self {
        ConversationItem::Message {
            id: None,
            role,
            content,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            ConversationItem::Message { id, .. }
            | ConversationItem::FunctionCall { id, .. }
            | ConversationItem::FunctionCallOutput { id, .. } => id.as_deref(),
        }
    }

    pub fn role(&self) -> Option<ItemRole> {
        match self {
            ConversationItem::Message { role, .. } => Some(*role),
            _ => None,
        }
    }
}
