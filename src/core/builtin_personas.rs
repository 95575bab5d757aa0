use crate::core::persona::Persona;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct BuiltinPersonaConfig {
    #[serde(default)]
    shared_rules: String,
    personas: Vec<Persona>,
}

pub fn load_builtin_personas() -> Vec<Persona> {
    const CONFIG_CONTENT: &str = include_str!("../builtins/personas.toml");
    let config: BuiltinPersonaConfig =
        toml::from_str(CONFIG_CONTENT).expect("Failed to parse builtins/personas.toml");
    let shared_rules = config.shared_rules.trim();
    config
        .personas
        .into_iter()
        .map(|mut persona| {
            persona.system_instruction = persona
                .system_instruction
                .replace("{shared_rules}", shared_rules);
            persona
        })
        .collect()
}
