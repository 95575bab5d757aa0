use tracing::debug;

use crate::core::chat_stream::{CompletionRequest, HistoryTurn, Speaker};
use crate::core::conversation::ConversationStore;
use crate::core::message::Message;
use crate::core::persona::{
    apply_greeting_policy, greeting_message, resolve_system_instruction, Persona, PersonaDraft,
    PersonaError, PersonaManager,
};

pub mod actions;
pub mod driver;
pub mod turn;

pub use actions::{AppAction, AppCommand};
pub use turn::{TurnOutcome, TurnPhase, TurnState};

/// Sole owner of conversation state. Every mutation goes through
/// [`App::handle_action`] or the persona helpers below.
pub struct App {
    conversation: ConversationStore,
    personas: PersonaManager,
    turn: TurnState,
    status: Option<String>,
    id_counter: u64,
    stream_counter: u64,
}

impl App {
    /// Activate `initial_persona` (or the first built-in), run the greeting
    /// policy once, and commit.
    pub fn new(
        conversation: ConversationStore,
        personas: PersonaManager,
        initial_persona: Option<&str>,
    ) -> Result<Self, PersonaError> {
        let mut app = App {
            conversation,
            personas,
            turn: TurnState::default(),
            status: None,
            id_counter: 0,
            stream_counter: 0,
        };
        if let Some(persona_id) = initial_persona {
            app.personas.set_active_persona(persona_id)?;
        }
        app.conversation.settle_interrupted_images();
        app.ensure_greeting();
        app.conversation.commit();
        Ok(app)
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn conversation(&self) -> &ConversationStore {
        &self.conversation
    }

    pub fn personas(&self) -> &PersonaManager {
        &self.personas
    }

    pub fn active_persona(&self) -> &Persona {
        self.personas.active_persona()
    }

    pub fn turn(&self) -> &TurnState {
        &self.turn
    }

    pub fn in_flight(&self) -> bool {
        self.turn.is_in_flight()
    }

    pub fn is_current_stream(&self, stream_id: u64) -> bool {
        self.turn.is_current(stream_id)
    }

    /// One-line notice produced by the last action, if any.
    pub fn take_status(&mut self) -> Option<String> {
        self.status.take()
    }

    pub(crate) fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    /// Millisecond timestamp plus a counter, re-rolled until unused.
    pub(crate) fn next_id(&mut self, prefix: &str) -> String {
        loop {
            self.id_counter += 1;
            let id = format!(
                "{prefix}-{}-{}",
                chrono::Utc::now().timestamp_millis(),
                self.id_counter
            );
            if !self.conversation.contains_id(&id) {
                return id;
            }
        }
    }

    /// `init-{persona id}-{millis}`, falling back to a counter suffix when
    /// that id is already taken.
    pub(crate) fn next_greeting_id(&mut self) -> String {
        let prefix = format!("init-{}", self.personas.active_persona().id);
        let id = format!("{prefix}-{}", chrono::Utc::now().timestamp_millis());
        if self.conversation.contains_id(&id) {
            self.next_id(&prefix)
        } else {
            id
        }
    }

    pub(crate) fn next_stream_id(&mut self) -> u64 {
        self.stream_counter += 1;
        self.stream_counter
    }

    /// Prior turns sent as context: everything except in-progress images
    /// and greetings.
    pub(crate) fn build_history(&self) -> Vec<HistoryTurn> {
        self.conversation
            .messages()
            .iter()
            .filter(|m| !m.is_generating_image() && !m.is_greeting())
            .map(|m| HistoryTurn {
                speaker: if m.is_user() {
                    Speaker::User
                } else {
                    Speaker::Model
                },
                text: m.content.clone(),
            })
            .collect()
    }

    pub(crate) fn build_request(&self, history: Vec<HistoryTurn>, text: &str) -> CompletionRequest {
        CompletionRequest {
            history,
            new_message: text.to_string(),
            system_instruction: resolve_system_instruction(self.personas.active_persona()),
        }
    }

    pub(crate) fn ensure_greeting(&mut self) -> bool {
        let greeting_id = self.next_greeting_id();
        let persona = self.personas.active_persona().clone();
        apply_greeting_policy(&mut self.conversation, &persona, greeting_id)
    }

    pub(crate) fn select_persona(&mut self, persona_id: &str) -> Result<bool, PersonaError> {
        let changed = self.personas.set_active_persona(persona_id)?;
        debug!(persona = %persona_id, changed, "Persona selected");
        self.ensure_greeting();
        self.conversation.commit();
        Ok(changed)
    }

    pub(crate) fn create_persona(&mut self, draft: PersonaDraft) -> Result<Persona, PersonaError> {
        let persona = self.personas.create_persona(draft)?.clone();
        self.ensure_greeting();
        self.conversation.commit();
        Ok(persona)
    }

    /// Clear everything, abandoning any in-flight turn, and seed a greeting
    /// for the active persona.
    pub(crate) fn purge_history(&mut self) {
        if self.turn.is_in_flight() {
            debug!(stream_id = self.turn.stream_id(), "Abandoning turn for purge");
            self.turn.abandon();
        }
        let greeting_id = self.next_greeting_id();
        let greeting = greeting_message(self.personas.active_persona(), greeting_id);
        self.conversation.purge(greeting);
    }
}
