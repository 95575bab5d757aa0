use tracing::{debug, info, warn};

use super::{App, TurnOutcome, TurnPhase};
use crate::core::chat_stream::{
    CompletionError, CompletionRequest, StreamEvent, StreamMessage, ToolCall,
};
use crate::core::message::{
    GroundingSource, Message, MessagePatch, CONFIGURATION_ERROR_NOTICE, NETWORK_ERROR_NOTICE,
};
use crate::core::persona::PersonaDraft;

#[derive(Debug, Clone)]
pub enum AppAction {
    SubmitMessage {
        text: String,
    },
    StreamEvent {
        event: StreamEvent,
        stream_id: u64,
    },
    StreamFailed {
        error: CompletionError,
        stream_id: u64,
    },
    StreamCompleted {
        stream_id: u64,
    },
    ImageSettled {
        message_id: String,
        image_url: Option<String>,
        stream_id: u64,
    },
    SelectPersona {
        id: String,
    },
    CreatePersona {
        draft: PersonaDraft,
    },
    PurgeHistory,
}

impl AppAction {
    pub fn from_stream_message(message: StreamMessage, stream_id: u64) -> Self {
        match message {
            StreamMessage::Event(event) => AppAction::StreamEvent { event, stream_id },
            StreamMessage::Error(error) => AppAction::StreamFailed { error, stream_id },
            StreamMessage::End => AppAction::StreamCompleted { stream_id },
            StreamMessage::ImageSettled {
                message_id,
                image_url,
            } => AppAction::ImageSettled {
                message_id,
                image_url,
                stream_id,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    SpawnStream {
        request: CompletionRequest,
        stream_id: u64,
    },
    GenerateImage {
        prompt: String,
        message_id: String,
        stream_id: u64,
    },
}

impl App {
    pub fn handle_action(&mut self, action: AppAction) -> Option<AppCommand> {
        match action {
            AppAction::SubmitMessage { text } => self.submit_message(&text),
            AppAction::StreamEvent { event, stream_id } => {
                if !self.is_current_stream(stream_id) {
                    debug!(stream_id, "Ignoring event from stale stream");
                    return None;
                }
                if self.turn.phase() == TurnPhase::ToolPending {
                    debug!(stream_id, "Ignoring event while image is pending");
                    return None;
                }
                match event {
                    StreamEvent::Text(delta) => {
                        self.append_delta(&delta);
                        None
                    }
                    StreamEvent::Grounding(sources) => {
                        self.attach_grounding(sources);
                        None
                    }
                    StreamEvent::Tool(call) => self.begin_image(call, stream_id),
                }
            }
            AppAction::StreamFailed { error, stream_id } => {
                if !self.is_current_stream(stream_id) {
                    return None;
                }
                self.fail_stream(&error);
                None
            }
            AppAction::StreamCompleted { stream_id } => {
                if !self.is_current_stream(stream_id) {
                    return None;
                }
                // The image settlement ends tool turns.
                if self.turn.phase() == TurnPhase::Streaming {
                    debug!(stream_id, "Stream completed");
                    self.turn.finish(TurnOutcome::Completed);
                    self.conversation.commit();
                }
                None
            }
            AppAction::ImageSettled {
                message_id,
                image_url,
                stream_id,
            } => {
                if !self.is_current_stream(stream_id)
                    || self.turn.visual_id() != Some(message_id.as_str())
                {
                    debug!(stream_id, message_id = %message_id, "Ignoring stale image result");
                    return None;
                }
                self.settle_image(&message_id, image_url);
                None
            }
            AppAction::SelectPersona { id } => {
                if let Err(err) = self.select_persona(&id) {
                    warn!(persona = %id, error = %err, "Persona selection failed");
                    self.set_status(err.to_string());
                }
                None
            }
            AppAction::CreatePersona { draft } => {
                match self.create_persona(draft) {
                    Ok(persona) => self.set_status(format!("Created persona: {}", persona.name)),
                    Err(err) => self.set_status(err.to_string()),
                }
                None
            }
            AppAction::PurgeHistory => {
                self.purge_history();
                self.set_status("History purged");
                None
            }
        }
    }

    fn submit_message(&mut self, text: &str) -> Option<AppCommand> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if self.in_flight() {
            debug!("Submission ignored; a turn is already in flight");
            return None;
        }

        let history = self.build_history();
        let request = self.build_request(history, text);

        let user_id = self.next_id("user");
        self.conversation.append(Message::user(user_id, text));
        let placeholder_id = self.next_id("model");
        let persona_name = self.active_persona().name.clone();
        self.conversation
            .append(Message::assistant(placeholder_id.clone(), persona_name, ""));

        let stream_id = self.next_stream_id();
        self.turn.begin(stream_id, placeholder_id);
        self.conversation.commit();
        info!(stream_id, persona = %self.active_persona().id, "Turn started");

        Some(AppCommand::SpawnStream { request, stream_id })
    }

    fn append_delta(&mut self, delta: &str) {
        let Some(placeholder_id) = self.turn.placeholder_id().map(str::to_string) else {
            return;
        };
        let content = self.turn.push_delta(delta).to_string();
        self.conversation
            .replace(&placeholder_id, MessagePatch::content(content));
        self.conversation.commit_unsynced();
    }

    fn attach_grounding(&mut self, sources: Vec<GroundingSource>) {
        if sources.is_empty() {
            return;
        }
        let Some(placeholder_id) = self.turn.placeholder_id().map(str::to_string) else {
            return;
        };
        self.conversation
            .replace(&placeholder_id, MessagePatch::grounding(sources));
        self.conversation.commit();
    }

    fn begin_image(&mut self, call: ToolCall, stream_id: u64) -> Option<AppCommand> {
        if let Some(placeholder_id) = self.turn.placeholder_id().map(str::to_string) {
            self.conversation.remove_where(|m| m.id == placeholder_id);
        }
        let visual_id = self.next_id("visual");
        self.conversation.append(Message::visual_pending(
            visual_id.clone(),
            call.commentary,
            call.enhanced_prompt.clone(),
        ));
        self.turn.enter_tool_pending(visual_id.clone());
        self.conversation.commit();
        info!(stream_id, message_id = %visual_id, "Image requested");

        Some(AppCommand::GenerateImage {
            prompt: call.enhanced_prompt,
            message_id: visual_id,
            stream_id,
        })
    }

    fn settle_image(&mut self, message_id: &str, image_url: Option<String>) {
        let succeeded = image_url.is_some();
        self.conversation
            .replace(message_id, MessagePatch::image_settled(image_url));
        self.turn.finish(TurnOutcome::ToolResolved { succeeded });
        self.conversation.commit();
        if !succeeded {
            warn!(message_id = %message_id, "Image generation failed");
        }
    }

    fn fail_stream(&mut self, error: &CompletionError) {
        warn!(stream_id = self.turn.stream_id(), error = %error, "Stream failed");
        match self.turn.phase() {
            TurnPhase::Streaming => {
                let notice = if error.is_configuration() {
                    CONFIGURATION_ERROR_NOTICE
                } else {
                    NETWORK_ERROR_NOTICE
                };
                if let Some(placeholder_id) = self.turn.placeholder_id().map(str::to_string) {
                    self.conversation
                        .replace(&placeholder_id, MessagePatch::content(notice));
                }
                self.turn.finish(TurnOutcome::Failed);
                self.conversation.commit();
            }
            // The stream already handed off to the image request, which
            // settles the turn on its own.
            TurnPhase::ToolPending | TurnPhase::Idle => {}
        }
    }
}
