//! Shared wire model for the generation and live-editor websocket streams.
//!
//! This crate owns the JSON representation exchanged with the backend.
//! Outbound requests are plain serializable structs. Inbound events carry a
//! `type` discriminant; [`InboundEvent::decode`] checks the discriminant
//! against the known set before deserializing, so an unknown message type is
//! reported as [`CodecError::UnknownType`] rather than as a malformed payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// CLOSE CODES
// =============================================================================

/// Clean closure; the backend finished the generation.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// The backend closes with this code after it has reported an error.
pub const SERVER_ERROR_CLOSE_CODE: u16 = 4332;

/// The client closes with this code when the user cancels a generation.
pub const USER_CLOSE_CODE: u16 = 4333;

/// Classification of a channel closure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseKind {
    /// Closed with [`NORMAL_CLOSE_CODE`].
    Normal,
    /// Closed with [`USER_CLOSE_CODE`].
    UserCancelled,
    /// Closed with [`SERVER_ERROR_CLOSE_CODE`].
    ServerError,
    /// Any other code, or a drop without a close frame.
    Abnormal { code: Option<u16> },
}

impl CloseKind {
    #[must_use]
    pub fn from_code(code: Option<u16>) -> Self {
        match code {
            Some(NORMAL_CLOSE_CODE) => Self::Normal,
            Some(USER_CLOSE_CODE) => Self::UserCancelled,
            Some(SERVER_ERROR_CLOSE_CODE) => Self::ServerError,
            other => Self::Abnormal { code: other },
        }
    }

    #[must_use]
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Normal => Some(NORMAL_CLOSE_CODE),
            Self::UserCancelled => Some(USER_CLOSE_CODE),
            Self::ServerError => Some(SERVER_ERROR_CLOSE_CODE),
            Self::Abnormal { code } => *code,
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error returned by [`InboundEvent::decode`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text is not valid JSON, or a known message has the wrong shape.
    #[error("invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),
    /// The message has no string `type` field.
    #[error("message is missing the `type` discriminant")]
    MissingType,
    /// The `type` field names a message this client does not handle.
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

// =============================================================================
// SHARED TYPES
// =============================================================================

/// Whether a generation starts a new tree or edits the current head.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationType {
    #[default]
    Create,
    Update,
}

/// Modality of the original prompt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    Image,
    Text,
    Video,
}

/// Target framework for generated code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stack {
    HtmlCss,
    #[default]
    HtmlTailwind,
    ReactTailwind,
    Bootstrap,
    IonicTailwind,
    VueTailwind,
    Svg,
}

impl Stack {
    pub const ALL: [Self; 7] = [
        Self::HtmlCss,
        Self::HtmlTailwind,
        Self::ReactTailwind,
        Self::Bootstrap,
        Self::IonicTailwind,
        Self::VueTailwind,
        Self::Svg,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HtmlCss => "html_css",
            Self::HtmlTailwind => "html_tailwind",
            Self::ReactTailwind => "react_tailwind",
            Self::Bootstrap => "bootstrap",
            Self::IonicTailwind => "ionic_tailwind",
            Self::VueTailwind => "vue_tailwind",
            Self::Svg => "svg",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stack| stack.as_str() == name)
    }

    /// Select-and-edit only works on plain HTML output.
    #[must_use]
    pub fn supports_select_and_edit(self) -> bool {
        matches!(self, Self::HtmlTailwind | Self::HtmlCss)
    }
}

/// One prompt turn: instruction text plus image references (URLs or data URLs).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContent {
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl PromptContent {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), images: Vec::new() }
    }

    #[must_use]
    pub fn image(image: impl Into<String>) -> Self {
        Self { text: String::new(), images: vec![image.into()] }
    }
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Model, stack, feature toggles and credential overrides sent with every
/// generation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub code_generation_model: String,
    pub generated_code_config: Stack,
    pub is_image_generation_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_ai_api_key: Option<String>,
    #[serde(rename = "openAiBaseURL", default, skip_serializing_if = "Option::is_none")]
    pub open_ai_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
}

/// Request sent once per generation on the generation stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub generation_type: GenerationType,
    pub input_mode: InputMode,
    pub prompt: PromptContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<PromptContent>>,
    #[serde(default)]
    pub is_imported_from_code: bool,
    #[serde(flatten)]
    pub settings: GenerationSettings,
    #[serde(rename = "session_id", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "project_path", default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
}

/// Chat instruction sent on the live-editor stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditInstruction {
    pub message: String,
    pub project_path: String,
    pub element_context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

// =============================================================================
// INBOUND
// =============================================================================

/// A message type received on a stream, keyed by its `type` discriminant.
pub trait InboundEvent: Sized {
    /// Discriminants this event type understands.
    const TYPES: &'static [&'static str];

    /// Decode one text message.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownType`] for a discriminant outside
    /// [`Self::TYPES`], [`CodecError::MissingType`] when there is none, and
    /// [`CodecError::Json`] for malformed JSON or payloads.
    fn decode(text: &str) -> Result<Self, CodecError>;
}

fn decode_tagged<E: DeserializeOwned>(text: &str, known: &[&str]) -> Result<E, CodecError> {
    let value = serde_json::from_str::<Value>(text)?;
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Err(CodecError::MissingType);
    };
    if !known.contains(&kind) {
        return Err(CodecError::UnknownType(kind.to_owned()));
    }
    Ok(serde_json::from_value(value)?)
}

/// Events on the generation stream. Every variant-scoped event names the
/// variant by index into the commit's variant list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GenerationEvent {
    Chunk { value: String, variant_index: usize },
    SetCode { value: String, variant_index: usize },
    Status { value: String, variant_index: usize },
    VariantComplete { variant_index: usize },
    VariantError { variant_index: usize, value: String },
    VariantCount { value: usize },
    SessionUpdate { value: String },
    Error { value: String },
}

impl InboundEvent for GenerationEvent {
    const TYPES: &'static [&'static str] = &[
        "chunk",
        "setCode",
        "status",
        "variantComplete",
        "variantError",
        "variantCount",
        "sessionUpdate",
        "error",
    ];

    fn decode(text: &str) -> Result<Self, CodecError> {
        decode_tagged(text, Self::TYPES)
    }
}

/// Events on the live-editor chat stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEditorEvent {
    Chunk {
        content: String,
    },
    ToolUse {
        tool: String,
        #[serde(default)]
        input: Map<String, Value>,
    },
    ToolResult {
        #[serde(default)]
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    Complete {
        #[serde(default)]
        session_id: Option<String>,
    },
    Error {
        message: String,
    },
    Status {
        message: String,
    },
}

impl InboundEvent for LiveEditorEvent {
    const TYPES: &'static [&'static str] =
        &["chunk", "tool_use", "tool_result", "complete", "error", "status"];

    fn decode(text: &str) -> Result<Self, CodecError> {
        decode_tagged(text, Self::TYPES)
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
