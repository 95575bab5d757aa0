use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::builtin_personas::load_builtin_personas;
use crate::core::conversation::ConversationStore;
use crate::core::message::{greeting_text, Message};

/// Placeholder substituted with the persona's display name.
pub const NAME_PLACEHOLDER: &str = "[CURRENT_NAME]";

const ACCENT_PALETTE: &[&str] = &["cyan", "red", "emerald", "purple", "orange", "amber", "sky"];

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Persona {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_instruction: String,
    #[serde(default)]
    pub accent: String,
}

/// User input for a new persona.
#[derive(Debug, Clone, Default)]
pub struct PersonaDraft {
    pub name: String,
    pub description: String,
    pub instruction: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonaError {
    EmptyName,
    EmptyInstruction,
    DuplicateName(String),
    UnknownPersona { id: String, available: Vec<String> },
}

impl fmt::Display for PersonaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersonaError::EmptyName => write!(f, "Persona name cannot be empty"),
            PersonaError::EmptyInstruction => {
                write!(f, "Persona instructions cannot be empty")
            }
            PersonaError::DuplicateName(name) => {
                write!(f, "A persona named '{name}' already exists")
            }
            PersonaError::UnknownPersona { id, available } => write!(
                f,
                "Persona '{}' not found. Available personas: {}",
                id,
                available.join(", ")
            ),
        }
    }
}

impl std::error::Error for PersonaError {}

/// Registry of built-in and user-created personas with one active selection.
pub struct PersonaManager {
    personas: Vec<Persona>,
    builtin_count: usize,
    active_index: usize,
}

impl PersonaManager {
    /// Built-ins followed by `user_personas`. The first built-in is active.
    /// User personas that collide with an existing id or name are skipped.
    pub fn load_personas(user_personas: &[Persona]) -> Self {
        let mut personas = load_builtin_personas();
        let builtin_count = personas.len();
        for persona in user_personas {
            let collides = personas
                .iter()
                .any(|p| p.id == persona.id || p.name.eq_ignore_ascii_case(&persona.name));
            if collides {
                debug!(persona = %persona.id, "Skipping user persona that collides with an existing one");
                continue;
            }
            personas.push(persona.clone());
        }

        PersonaManager {
            personas,
            builtin_count,
            active_index: 0,
        }
    }

    pub fn list_personas(&self) -> &[Persona] {
        &self.personas
    }

    /// Personas created by the user, in creation order.
    pub fn user_personas(&self) -> &[Persona] {
        &self.personas[self.builtin_count..]
    }

    pub fn find_persona_by_id(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn find_persona_by_name(&self, name: &str) -> Option<&Persona> {
        self.personas
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn active_persona(&self) -> &Persona {
        &self.personas[self.active_index]
    }

    /// Select by id. Returns whether the active persona actually changed.
    pub fn set_active_persona(&mut self, persona_id: &str) -> Result<bool, PersonaError> {
        match self.personas.iter().position(|p| p.id == persona_id) {
            Some(index) => {
                let changed = index != self.active_index;
                self.active_index = index;
                Ok(changed)
            }
            None => Err(PersonaError::UnknownPersona {
                id: persona_id.to_string(),
                available: self.personas.iter().map(|p| p.id.clone()).collect(),
            }),
        }
    }

    /// Validate and append a persona, then make it active.
    pub fn create_persona(&mut self, draft: PersonaDraft) -> Result<&Persona, PersonaError> {
        let name = draft.name.trim();
        let instruction = draft.instruction.trim();
        if name.is_empty() {
            return Err(PersonaError::EmptyName);
        }
        if instruction.is_empty() {
            return Err(PersonaError::EmptyInstruction);
        }
        if self.find_persona_by_name(name).is_some() {
            return Err(PersonaError::DuplicateName(name.to_string()));
        }

        let persona = Persona {
            id: self.unique_id_for(name),
            name: name.to_string(),
            description: draft.description.trim().to_string(),
            system_instruction: instruction.to_string(),
            accent: ACCENT_PALETTE[self.personas.len() % ACCENT_PALETTE.len()].to_string(),
        };
        debug!(persona = %persona.id, "Created persona");
        self.personas.push(persona);
        self.active_index = self.personas.len() - 1;
        Ok(&self.personas[self.active_index])
    }

    fn unique_id_for(&self, name: &str) -> String {
        let base = suggest_persona_id(name);
        let base = if base.is_empty() {
            "persona".to_string()
        } else {
            base
        };
        if self.find_persona_by_id(&base).is_none() {
            return base;
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{base}_{suffix}");
            if self.find_persona_by_id(&candidate).is_none() {
                return candidate;
            }
            suffix += 1;
        }
    }
}

/// Lowercase alphanumerics, with runs of anything else collapsed to `_`.
pub fn suggest_persona_id(name: &str) -> String {
    let mut id = String::new();
    for ch in name.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            id.push(ch);
        } else if !id.ends_with('_') && !id.is_empty() {
            id.push('_');
        }
    }
    id.trim_end_matches('_').to_string()
}

pub fn resolve_system_instruction(persona: &Persona) -> String {
    persona
        .system_instruction
        .replace(NAME_PLACEHOLDER, &persona.name)
}

pub fn greeting_message(persona: &Persona, id: String) -> Message {
    Message::assistant(id, persona.name.clone(), greeting_text(&persona.name))
}

/// Keep one greeting for the active persona in view.
///
/// When the conversation has no greeting at all, or nothing from `persona`
/// yet, every greeting-marker message is removed and a fresh greeting for
/// `persona` is appended. Returns whether a greeting was appended.
pub fn apply_greeting_policy(
    store: &mut ConversationStore,
    persona: &Persona,
    greeting_id: String,
) -> bool {
    let has_greeting = store.messages().iter().any(Message::is_greeting);
    let persona_present = store
        .messages()
        .iter()
        .any(|m| m.persona_name.as_deref() == Some(persona.name.as_str()));
    if has_greeting && persona_present {
        return false;
    }

    let removed = store.remove_where(Message::is_greeting);
    debug!(persona = %persona.name, removed, "Replacing greetings");
    store.append(greeting_message(persona, greeting_id))
}
