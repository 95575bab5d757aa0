//! Plain-text rendering of conversation messages for the line-oriented UI.

use crate::core::message::{GroundingSource, Message, MessageRole};
use crate::core::persona::PersonaManager;
use crate::utils::data_uri::decode_data_uri;

pub const USER_LABEL: &str = "You";
pub const VISUAL_LABEL: &str = "🎨 CREATIVE VISUAL MODE";
pub const GENERATING_LABEL: &str = "⏳ Generating Visualization...";
const FALLBACK_SPEAKER: &str = "Assistant";

/// Speaker label shown before a message body.
pub fn speaker_label(message: &Message) -> &str {
    match message.role {
        MessageRole::User => USER_LABEL,
        MessageRole::Visual => VISUAL_LABEL,
        MessageRole::Assistant => message.persona_name.as_deref().unwrap_or(FALLBACK_SPEAKER),
    }
}

pub fn format_sources(sources: &[GroundingSource]) -> String {
    let mut out = String::from("🌐 VERIFIED SOURCES");
    for (index, source) in sources.iter().enumerate() {
        let title = if source.title.trim().is_empty() {
            source.uri.as_str()
        } else {
            source.title.as_str()
        };
        out.push_str(&format!("\n  [{}] {} <{}>", index + 1, title, source.uri));
    }
    out
}

/// Inline images are summarized rather than dumped to the terminal.
pub fn describe_image(image_url: &str) -> String {
    match decode_data_uri(image_url) {
        Ok(image) => format!(
            "🖼  [{} image, {} bytes] save it with /save-image <path>",
            image.mime_type,
            image.bytes.len()
        ),
        Err(_) => format!("🖼  {image_url}"),
    }
}

/// Everything after the speaker line: body, generating marker, image, sources.
pub fn format_details(message: &Message) -> String {
    let mut parts = Vec::new();
    if message.is_generating_image() {
        let prompt = message.image_prompt.as_deref().unwrap_or_default();
        parts.push(format!("{GENERATING_LABEL} {prompt}").trim_end().to_string());
    }
    if let Some(url) = message.image_url.as_deref() {
        parts.push(describe_image(url));
    }
    let sources = message.grounding_sources();
    if !sources.is_empty() {
        parts.push(format_sources(sources));
    }
    parts.join("\n")
}

pub fn format_message(message: &Message) -> String {
    let mut out = format!("{}: {}", speaker_label(message), message.content);
    let details = format_details(message);
    if !details.is_empty() {
        out.push('\n');
        out.push_str(&details);
    }
    out
}

pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(format_message)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One line per persona; `*` marks the active one.
pub fn persona_lines(personas: &PersonaManager) -> Vec<String> {
    let active_id = personas.active_persona().id.as_str();
    let builtin_count = personas.list_personas().len() - personas.user_personas().len();
    personas
        .list_personas()
        .iter()
        .enumerate()
        .map(|(index, persona)| {
            let marker = if persona.id == active_id { "*" } else { " " };
            let custom = if index >= builtin_count { " (custom)" } else { "" };
            format!(
                "{marker} {} - {}{custom}: {}",
                persona.id, persona.name, persona.description
            )
        })
        .collect()
}
