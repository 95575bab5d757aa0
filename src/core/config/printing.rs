use crate::core::config::data::{path_display, Config};

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.default_persona {
            Some(persona) => println!("  default-persona: {persona}"),
            None => println!("  default-persona: (unset)"),
        }
        println!("  model: {}", self.model());
        println!("  image-model: {}", self.image_model());
        println!("  base-url: {}", self.base_url());
        println!("  temperature: {}", self.temperature());
        println!("  history-dir: {}", path_display(self.history_dir()));
        if self.personas.is_empty() {
            println!("  personas: (none created)");
        } else {
            println!("  personas:");
            for persona in &self.personas {
                println!("    {}: {}", persona.id, persona.name);
            }
        }
    }
}
