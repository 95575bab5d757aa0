use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::message::GroundingSource;

/// Arguments of the image-generation tool call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCall {
    pub enhanced_prompt: String,
    pub commentary: String,
}

/// One event of a streamed reply, in arrival order.
///
/// A `Tool` event is always the last item of its stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Text(String),
    Grounding(Vec<GroundingSource>),
    Tool(ToolCall),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Speaker {
    User,
    Model,
}

impl Speaker {
    pub fn as_api_role(self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Model => "model",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryTurn {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub history: Vec<HistoryTurn>,
    pub new_message: String,
    pub system_instruction: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionError {
    /// No API key is configured; raised before any network activity.
    MissingCredential,
    /// The connection failed or broke mid-stream.
    Transport(String),
    /// The API answered with an error status or error payload.
    Api(String),
    /// A payload could not be decoded.
    Decode(String),
}

impl CompletionError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, CompletionError::MissingCredential)
    }
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionError::MissingCredential => write!(f, "No API key configured"),
            CompletionError::Transport(message) => write!(f, "Transport error: {message}"),
            CompletionError::Api(message) => write!(f, "API error: {message}"),
            CompletionError::Decode(message) => write!(f, "Decode error: {message}"),
        }
    }
}

impl std::error::Error for CompletionError {}

pub type EventStream = BoxStream<'static, Result<StreamEvent, CompletionError>>;

/// Remote text/tool/grounding stream plus image synthesis.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn stream_reply(&self, request: CompletionRequest)
        -> Result<EventStream, CompletionError>;

    /// Returns a displayable image reference, or `None` on any failure.
    async fn generate_image(&self, prompt: &str) -> Option<String>;
}

#[derive(Clone, Debug)]
pub enum StreamMessage {
    Event(StreamEvent),
    Error(CompletionError),
    End,
    ImageSettled {
        message_id: String,
        image_url: Option<String>,
    },
}

/// Runs client calls on background tasks and reports back over a channel,
/// tagging every message with the stream id it belongs to.
#[derive(Clone)]
pub struct ChatStreamService {
    client: Arc<dyn CompletionClient>,
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new(
        client: Arc<dyn CompletionClient>,
    ) -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { client, tx }, rx)
    }

    pub fn spawn_stream(&self, request: CompletionRequest, stream_id: u64) {
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut stream = match client.stream_reply(request).await {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = tx.send((StreamMessage::Error(err), stream_id));
                    return;
                }
            };

            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => {
                        let ends_stream = matches!(event, StreamEvent::Tool(_));
                        let _ = tx.send((StreamMessage::Event(event), stream_id));
                        if ends_stream {
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send((StreamMessage::Error(err), stream_id));
                        return;
                    }
                }
            }
            debug!(stream_id, "Stream exhausted");
            let _ = tx.send((StreamMessage::End, stream_id));
        });
    }

    pub fn spawn_image(&self, prompt: String, message_id: String, stream_id: u64) {
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let image_url = client.generate_image(&prompt).await;
            let _ = tx.send((
                StreamMessage::ImageSettled {
                    message_id,
                    image_url,
                },
                stream_id,
            ));
        });
    }
}
