//! Shared startup for the commands that talk to the model.

use std::error::Error;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::AuthManager;
use crate::core::app::App;
use crate::core::chat_stream::CompletionClient;
use crate::core::config::Config;
use crate::core::conversation::ConversationStore;
use crate::core::gemini::{GeminiClient, GeminiSettings};
use crate::core::persona::{PersonaError, PersonaManager};
use crate::core::storage::FileSnapshotStorage;

/// Load the config file and apply command-line overrides.
pub fn load_config(model: Option<String>) -> Result<Config, Box<dyn Error>> {
    let mut config = Config::load()?;
    if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
        config.model = Some(model);
    }
    Ok(config)
}

/// Hydrate history from the configured directory and pick the persona:
/// the command-line choice, then the configured default, then the first
/// built-in.
pub fn open_app(config: &Config, persona: Option<&str>) -> Result<App, PersonaError> {
    let storage = FileSnapshotStorage::new(config.history_dir());
    debug!(dir = %storage.dir().display(), "Opening conversation history");
    let store = ConversationStore::load(Box::new(storage));
    let personas = PersonaManager::load_personas(&config.personas);
    let initial = persona.or(config.default_persona.as_deref());
    App::new(store, personas, initial)
}

/// A missing key is not an error here; the first turn reports it.
pub fn build_client(config: &Config) -> Result<Arc<dyn CompletionClient>, Box<dyn Error>> {
    let api_key = match AuthManager::new().resolve_api_key() {
        Ok(Some(resolved)) => {
            debug!(source = %resolved.source, "Using API key");
            Some(resolved.key)
        }
        Ok(None) => None,
        Err(err) => {
            warn!(error = %err, recoverable = err.is_recoverable(), "Keyring lookup failed");
            None
        }
    };
    let client = GeminiClient::new(GeminiSettings::from_config(config), api_key)?;
    Ok(Arc::new(client))
}
