//! HTTP client for the hosted generative-language API.
//!
//! Replies are requested with `streamGenerateContent?alt=sse`; each `data:`
//! line carries a full `GenerateContentResponse` chunk that is decoded into
//! [`StreamEvent`]s. Images come from a plain `generateContent` call.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use memchr::memchr;
use serde_json::json;
use tracing::{debug, warn};

use crate::api::{
    Content, FunctionDeclaration, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, Part, Tool,
};
use crate::core::chat_stream::{
    CompletionClient, CompletionError, CompletionRequest, EventStream, StreamEvent, ToolCall,
};
use crate::core::config::Config;
use crate::core::message::GroundingSource;
use crate::utils::url::construct_api_url;

pub const IMAGE_TOOL_NAME: &str = "generate_image_prompt";

const API_KEY_HEADER: &str = "x-goog-api-key";

const VISUAL_GENERATION_PROTOCOL: &str = "**VISUAL GENERATION PROTOCOL:**
If the user requests an image, drawing, or visual representation, you MUST activate Visual Mode.
1. Call `generate_image_prompt`.
2. Provide a professional and creative response about the visualization you are creating.";

#[derive(Clone, Debug)]
pub struct GeminiSettings {
    pub base_url: String,
    pub model: String,
    pub image_model: String,
    pub temperature: f32,
    pub connect_timeout: Duration,
}

impl GeminiSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.base_url(),
            model: config.model(),
            image_model: config.image_model(),
            temperature: config.temperature(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    settings: GeminiSettings,
}

impl GeminiClient {
    pub fn new(
        settings: GeminiSettings,
        api_key: Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            settings,
        })
    }

    fn api_key(&self) -> Result<&str, CompletionError> {
        self.api_key
            .as_deref()
            .ok_or(CompletionError::MissingCredential)
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        construct_api_url(
            &self.settings.base_url,
            &format!("models/{model}:{method}"),
        )
    }

    async fn request_image(&self, prompt: &str) -> Result<Option<String>, CompletionError> {
        let api_key = self.api_key()?;
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(prompt)],
            }],
            system_instruction: None,
            tools: Vec::new(),
            generation_config: None,
        };
        let response = self
            .client
            .post(self.model_url(&self.settings.image_model, "generateContent"))
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| CompletionError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(CompletionError::Api(summarize_api_error(&error_text)));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| CompletionError::Decode(err.to_string()))?;
        Ok(image_reference(&parsed))
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn stream_reply(
        &self,
        request: CompletionRequest,
    ) -> Result<EventStream, CompletionError> {
        let api_key = self.api_key()?;
        let body = build_request_body(&request, self.settings.temperature);
        let url = format!(
            "{}?alt=sse",
            self.model_url(&self.settings.model, "streamGenerateContent")
        );
        debug!(model = %self.settings.model, turns = body.contents.len(), "Opening reply stream");

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| CompletionError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(CompletionError::Api(summarize_api_error(&error_text)));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|b| b.to_vec())
                    .map_err(|err| CompletionError::Transport(err.to_string()))
            })
            .boxed();
        Ok(decode_sse(bytes))
    }

    async fn generate_image(&self, prompt: &str) -> Option<String> {
        match self.request_image(prompt).await {
            Ok(Some(url)) => Some(url),
            Ok(None) => {
                warn!("Image engine returned no image data");
                None
            }
            Err(err) => {
                warn!(error = %err, "Image engine error");
                None
            }
        }
    }
}

pub fn build_request_body(request: &CompletionRequest, temperature: f32) -> GenerateContentRequest {
    let mut contents: Vec<Content> = request
        .history
        .iter()
        .filter(|turn| !turn.text.is_empty())
        .map(|turn| Content {
            role: Some(turn.speaker.as_api_role().to_string()),
            parts: vec![Part::text(turn.text.clone())],
        })
        .collect();
    contents.push(Content {
        role: Some("user".to_string()),
        parts: vec![Part::text(request.new_message.clone())],
    });

    let instruction = format!(
        "STRICT IDENTITY ENFORCEMENT: {}\n\n{}",
        request.system_instruction, VISUAL_GENERATION_PROTOCOL
    );

    GenerateContentRequest {
        contents,
        system_instruction: Some(Content {
            role: None,
            parts: vec![Part::text(instruction)],
        }),
        tools: vec![image_tool()],
        generation_config: Some(GenerationConfig { temperature }),
    }
}

fn image_tool() -> Tool {
    Tool {
        function_declarations: vec![FunctionDeclaration {
            name: IMAGE_TOOL_NAME.to_string(),
            description: "Generate a detailed image prompt for the visualization engine."
                .to_string(),
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "enhanced_prompt": {
                        "type": "STRING",
                        "description": "Detailed visual description for the image engine."
                    },
                    "commentary": {
                        "type": "STRING",
                        "description": "A message to the user about the visual creation."
                    }
                },
                "required": ["enhanced_prompt", "commentary"]
            }),
        }],
    }
}

struct SseState {
    bytes: BoxStream<'static, Result<Vec<u8>, CompletionError>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<StreamEvent, CompletionError>>,
    finished: bool,
}

/// Turn a raw SSE byte stream into reply events. The stream ends after a
/// tool event or the first error.
pub fn decode_sse(bytes: BoxStream<'static, Result<Vec<u8>, CompletionError>>) -> EventStream {
    let state = SseState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if matches!(item, Ok(StreamEvent::Tool(_)) | Err(_)) {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(&chunk);
                    drain_lines(&mut state);
                }
                Some(Err(err)) => {
                    state.pending.push_back(Err(err));
                }
                None => {
                    if !state.buffer.is_empty() {
                        state.buffer.push(b'\n');
                        drain_lines(&mut state);
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

fn drain_lines(state: &mut SseState) {
    while let Some(newline_pos) = memchr(b'\n', &state.buffer) {
        let line: Vec<u8> = state.buffer.drain(..=newline_pos).collect();
        let line = match std::str::from_utf8(&line) {
            Ok(line) => line.trim(),
            Err(err) => {
                warn!(error = %err, "Invalid UTF-8 in stream");
                continue;
            }
        };
        if let Some(payload) = extract_data_payload(line) {
            state.pending.extend(handle_data_payload(payload));
        }
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn handle_data_payload(payload: &str) -> Vec<Result<StreamEvent, CompletionError>> {
    if payload.trim().is_empty() || payload == "[DONE]" {
        return Vec::new();
    }

    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) if value.get("error").is_some() => {
            vec![Err(CompletionError::Api(summarize_api_error(payload)))]
        }
        Ok(value) => match serde_json::from_value::<GenerateContentResponse>(value) {
            Ok(response) => events_from_response(&response).into_iter().map(Ok).collect(),
            Err(err) => vec![Err(CompletionError::Decode(err.to_string()))],
        },
        Err(err) => vec![Err(CompletionError::Decode(err.to_string()))],
    }
}

/// Events carried by one response chunk: a tool call alone, otherwise
/// grounding before text.
pub fn events_from_response(response: &GenerateContentResponse) -> Vec<StreamEvent> {
    let parts = response.first_parts();

    if let Some(call) = parts
        .iter()
        .filter_map(|part| part.function_call.as_ref())
        .find(|call| call.name == IMAGE_TOOL_NAME)
    {
        let arg = |name: &str| {
            call.args
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        return vec![StreamEvent::Tool(ToolCall {
            enhanced_prompt: arg("enhanced_prompt"),
            commentary: arg("commentary"),
        })];
    }

    let mut events = Vec::new();
    let sources: Vec<GroundingSource> = response
        .candidates
        .first()
        .and_then(|c| c.grounding_metadata.as_ref())
        .map(|metadata| {
            metadata
                .grounding_chunks
                .iter()
                .filter_map(|chunk| chunk.web.as_ref())
                .map(|web| GroundingSource {
                    title: web.title.clone().unwrap_or_default(),
                    uri: web.uri.clone().unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();
    if !sources.is_empty() {
        events.push(StreamEvent::Grounding(sources));
    }

    let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
    if !text.is_empty() {
        events.push(StreamEvent::Text(text));
    }
    events
}

fn image_reference(response: &GenerateContentResponse) -> Option<String> {
    response
        .first_parts()
        .iter()
        .find_map(|part| part.inline_data.as_ref())
        .map(|data| {
            let mime = data.mime_type.as_deref().unwrap_or("image/png");
            format!("data:{mime};base64,{}", data.data)
        })
}

/// Collapse an error body to a single line, preferring `error.message`.
pub fn summarize_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let summary = serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.pointer("/0/error/message"))
                .or_else(|| value.get("message"))
                .and_then(|v| v.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| trimmed.to_string());

    summary.split_whitespace().collect::<Vec<_>>().join(" ")
}
