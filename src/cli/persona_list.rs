use std::error::Error;

use crate::cli::session::load_config;
use crate::core::persona::PersonaManager;
use crate::ui::transcript::persona_lines;

pub fn list_personas(persona: Option<&str>) -> Result<(), Box<dyn Error>> {
    let config = load_config(None)?;
    let mut personas = PersonaManager::load_personas(&config.personas);
    if let Some(id) = persona.or(config.default_persona.as_deref()) {
        personas.set_active_persona(id)?;
    }

    println!("🎭 Available personas:");
    for line in persona_lines(&personas) {
        println!("{line}");
    }
    println!();
    println!("Start a chat with one: parlor -p <id>");
    Ok(())
}
