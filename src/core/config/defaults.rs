use crate::core::config::data::Config;
use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

impl Config {
    pub fn base_url(&self) -> String {
        non_empty(self.base_url.as_deref()).unwrap_or(DEFAULT_BASE_URL).to_string()
    }

    pub fn model(&self) -> String {
        non_empty(self.model.as_deref()).unwrap_or(DEFAULT_MODEL).to_string()
    }

    pub fn image_model(&self) -> String {
        non_empty(self.image_model.as_deref())
            .unwrap_or(DEFAULT_IMAGE_MODEL)
            .to_string()
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
            .filter(|t| t.is_finite() && (0.0..=2.0).contains(t))
            .unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    /// Where the conversation snapshot lives. Falls back to the platform
    /// data directory, then to the current directory.
    pub fn history_dir(&self) -> PathBuf {
        if let Some(dir) = &self.history_dir {
            return dir.clone();
        }
        ProjectDirs::from("org", "parlor", "parlor")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".parlor"))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
