use std::fs::OpenOptions;
use std::path::Path;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "PARLOR_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber. With `log_file`, events are appended there
/// (without ANSI colors) so chat output on the terminal stays clean;
/// otherwise they go to stderr.
pub fn init_tracing(log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(file)
                .with_ansi(false)
                .try_init()
                .map_err(|e| e as Box<dyn std::error::Error>)?;
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| e as Box<dyn std::error::Error>)?;
        }
    }
    Ok(())
}
