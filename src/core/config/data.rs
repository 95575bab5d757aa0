use crate::core::persona::Persona;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Persona selected at startup (persona id, e.g. "codex")
    pub default_persona: Option<String>,
    /// Model used for streamed replies
    pub model: Option<String>,
    /// Model used for image synthesis
    pub image_model: Option<String>,
    /// API base URL, without the `models/...` suffix
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub connect_timeout_secs: Option<u64>,
    /// Directory holding the persisted conversation snapshot
    pub history_dir: Option<PathBuf>,
    /// Personas created by the user
    #[serde(default)]
    pub personas: Vec<Persona>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    /// Record a user-created persona, replacing any entry with the same id.
    pub fn upsert_persona(&mut self, persona: Persona) {
        match self.personas.iter_mut().find(|p| p.id == persona.id) {
            Some(existing) => *existing = persona,
            None => self.personas.push(persona),
        }
    }
}
