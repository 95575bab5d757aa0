use serde::{Deserialize, Serialize};

/// Substring that identifies a persona greeting anywhere in the transcript.
pub const GREETING_MARKER: &str = "is online. How can I help you today?";

/// Content written to a Visual message when image synthesis yields nothing.
pub const IMAGE_FAILURE_NOTICE: &str = "Generation failed.";

/// Content written to the in-progress reply when the stream breaks.
pub const NETWORK_ERROR_NOTICE: &str =
    "⚠️ **Network Error**: Connection lost. Retrying synchronization...";

/// Content written to the in-progress reply when no API key is configured.
pub const CONFIGURATION_ERROR_NOTICE: &str =
    "⚠️ **Configuration Error**: No API key configured. Run `parlor auth` or set GEMINI_API_KEY.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MessageRole {
    User,
    Assistant,
    Visual,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Visual => "visual",
        }
    }

    pub fn is_user(self) -> bool {
        self == MessageRole::User
    }

    pub fn is_assistant(self) -> bool {
        self == MessageRole::Assistant
    }

    pub fn is_visual(self) -> bool {
        self == MessageRole::Visual
    }
}

impl AsRef<str> for MessageRole {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for MessageRole {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "visual" => Ok(MessageRole::Visual),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for MessageRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<MessageRole> for String {
    fn from(value: MessageRole) -> Self {
        value.as_str().to_string()
    }
}

/// A web source the model cited while producing a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_name: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_generating_image: Option<bool>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_metadata: Option<Vec<GroundingSource>>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            persona_name: None,
            content: content.into(),
            image_prompt: None,
            image_url: None,
            is_generating_image: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
            grounding_metadata: None,
        }
    }

    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, MessageRole::User, content)
    }

    pub fn assistant(
        id: impl Into<String>,
        persona_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            persona_name: Some(persona_name.into()),
            ..Self::new(id, MessageRole::Assistant, content)
        }
    }

    /// A Visual message whose image is still being synthesized.
    pub fn visual_pending(
        id: impl Into<String>,
        commentary: impl Into<String>,
        image_prompt: impl Into<String>,
    ) -> Self {
        Self {
            image_prompt: Some(image_prompt.into()),
            is_generating_image: Some(true),
            ..Self::new(id, MessageRole::Visual, commentary)
        }
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }

    pub fn is_visual(&self) -> bool {
        self.role.is_visual()
    }

    pub fn is_generating_image(&self) -> bool {
        self.is_generating_image.unwrap_or(false)
    }

    pub fn is_greeting(&self) -> bool {
        is_greeting_content(&self.content)
    }

    pub fn grounding_sources(&self) -> &[GroundingSource] {
        self.grounding_metadata.as_deref().unwrap_or(&[])
    }
}

/// Field-level update applied to a message in place.
///
/// `None` leaves a field untouched; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub image_url: Option<Option<String>>,
    pub is_generating_image: Option<Option<bool>>,
    pub grounding_metadata: Option<Option<Vec<GroundingSource>>>,
}

impl MessagePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn grounding(sources: Vec<GroundingSource>) -> Self {
        Self {
            grounding_metadata: Some(Some(sources)),
            ..Self::default()
        }
    }

    /// Settles a Visual message once the image request finishes.
    pub fn image_settled(image_url: Option<String>) -> Self {
        let content = image_url
            .is_none()
            .then(|| IMAGE_FAILURE_NOTICE.to_string());
        Self {
            content,
            image_url: Some(image_url),
            is_generating_image: Some(Some(false)),
            ..Self::default()
        }
    }

    pub fn apply(self, message: &mut Message) {
        if let Some(content) = self.content {
            message.content = content;
        }
        if let Some(image_url) = self.image_url {
            message.image_url = image_url;
        }
        if let Some(flag) = self.is_generating_image {
            message.is_generating_image = flag;
        }
        if let Some(grounding) = self.grounding_metadata {
            message.grounding_metadata = grounding;
        }
    }
}

pub fn greeting_text(persona_name: &str) -> String {
    format!("Hello! **{persona_name}** {GREETING_MARKER}")
}

pub fn is_greeting_content(content: &str) -> bool {
    content.contains(GREETING_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_role_strings_are_rejected() {
        assert!(MessageRole::try_from("system").is_err());
        assert_eq!(MessageRole::try_from("visual"), Ok(MessageRole::Visual));
    }

    #[test]
    fn serializes_with_camel_case_and_omits_absent_fields() {
        let mut message = Message::assistant("a1", "CODEX", "hi");
        message.timestamp = 42;
        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json["personaName"], "CODEX");
        assert_eq!(json["role"], "assistant");
        assert!(json.get("imageUrl").is_none());
        assert!(json.get("isGeneratingImage").is_none());
    }

    #[test]
    fn greeting_detection_uses_marker() {
        assert!(is_greeting_content(&greeting_text("MAXIMUS")));
        assert!(!is_greeting_content("Hello! **MAXIMUS** is here."));
    }

    #[test]
    fn settled_patch_without_image_writes_failure_notice() {
        let mut message = Message::visual_pending("v1", "Here you go", "a cat");
        MessagePatch::image_settled(None).apply(&mut message);
        assert_eq!(message.content, IMAGE_FAILURE_NOTICE);
        assert_eq!(message.is_generating_image, Some(false));
        assert!(message.image_url.is_none());
    }

    #[test]
    fn settled_patch_with_image_keeps_commentary() {
        let mut message = Message::visual_pending("v1", "Here you go", "a cat");
        MessagePatch::image_settled(Some("img1".into())).apply(&mut message);
        assert_eq!(message.content, "Here you go");
        assert_eq!(message.image_url.as_deref(), Some("img1"));
        assert!(!message.is_generating_image());
    }
}
