use std::error::Error;
use std::fmt;

use keyring::Entry;
use tracing::debug;

pub mod ui;

use self::ui::{prompt_api_key, prompt_confirmation, ConfirmationChoice};

pub const KEYRING_SERVICE: &str = "parlor";
pub const KEYRING_USER: &str = "gemini";

/// Checked in order before falling back to the keyring.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Describes failures when attempting to access the system keyring.
///
/// Recoverable errors indicate that the credential backend was
/// temporarily unavailable (for example when the keychain service is
/// locked). Permanent errors surface the underlying cause directly.
#[derive(Debug)]
pub enum KeyringAccessError {
    Recoverable(keyring::Error),
    Permanent(keyring::Error),
}

impl KeyringAccessError {
    fn inner(&self) -> &keyring::Error {
        match self {
            KeyringAccessError::Recoverable(err) | KeyringAccessError::Permanent(err) => err,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, KeyringAccessError::Recoverable(_))
    }
}

impl From<keyring::Error> for KeyringAccessError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                KeyringAccessError::Recoverable(err)
            }
            other => KeyringAccessError::Permanent(other),
        }
    }
}

impl fmt::Display for KeyringAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner())
    }
}

impl Error for KeyringAccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Environment(&'static str),
    Keyring,
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Environment(var) => write!(f, "environment ({var})"),
            KeySource::Keyring => write!(f, "system keyring"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key: String,
    pub source: KeySource,
}

/// First non-blank value among [`API_KEY_ENV_VARS`], as seen through `lookup`.
pub fn key_from_env<F>(lookup: F) -> Option<ResolvedKey>
where
    F: Fn(&str) -> Option<String>,
{
    API_KEY_ENV_VARS.into_iter().find_map(|var| {
        lookup(var)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|key| ResolvedKey {
                key,
                source: KeySource::Environment(var),
            })
    })
}

pub struct AuthManager {
    use_keyring: bool,
}

impl Default for AuthManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthManager {
    pub fn new() -> Self {
        Self::new_with_keyring(true)
    }

    /// Construct an AuthManager, optionally disabling keyring access (useful for tests)
    pub fn new_with_keyring(use_keyring: bool) -> Self {
        Self { use_keyring }
    }

    /// Environment first, then the keyring. `Ok(None)` means no key anywhere.
    pub fn resolve_api_key(&self) -> Result<Option<ResolvedKey>, KeyringAccessError> {
        if let Some(found) = key_from_env(|name| std::env::var(name).ok()) {
            debug!(source = %found.source, "API key resolved");
            return Ok(Some(found));
        }
        Ok(self.get_stored_key()?.map(|key| ResolvedKey {
            key,
            source: KeySource::Keyring,
        }))
    }

    pub fn get_stored_key(&self) -> Result<Option<String>, KeyringAccessError> {
        if !self.use_keyring {
            return Ok(None);
        }
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
        match entry.get_password() {
            Ok(key) => Ok(Some(key)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn store_api_key(&self, key: &str) -> Result<(), KeyringAccessError> {
        if !self.use_keyring {
            return Ok(());
        }
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
        entry.set_password(key)?;
        Ok(())
    }

    /// Returns whether a stored key was actually removed.
    pub fn remove_api_key(&self) -> Result<bool, KeyringAccessError> {
        if !self.use_keyring {
            return Ok(false);
        }
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
        match entry.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub fn interactive_auth(&self) -> Result<(), Box<dyn Error>> {
        println!("🔐 Parlor Authentication Setup");
        println!();
        if self.get_stored_key()?.is_some() {
            println!("A key is already stored; entering a new one replaces it.");
        }

        let key = prompt_api_key()?;
        if key.is_empty() {
            return Err("API key cannot be empty".into());
        }
        self.store_api_key(&key)?;
        println!("✓ API key stored securely in the system keyring");
        if let Some(var) = API_KEY_ENV_VARS
            .iter()
            .find(|var| std::env::var(var).is_ok_and(|v| !v.trim().is_empty()))
        {
            println!("Note: {var} is set and takes precedence over the stored key.");
        }
        Ok(())
    }

    pub fn interactive_deauth(&self) -> Result<(), Box<dyn Error>> {
        if self.get_stored_key()?.is_none() {
            println!("No stored API key found.");
            return Ok(());
        }
        match prompt_confirmation("Remove the stored API key?")? {
            ConfirmationChoice::Yes => {
                self.remove_api_key()?;
                println!("✓ Stored API key removed");
            }
            ConfirmationChoice::No | ConfirmationChoice::Cancel => println!("Cancelled."),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn gemini_key_wins_over_generic_key() {
        let found = key_from_env(lookup_from(&[
            ("API_KEY", "generic"),
            ("GEMINI_API_KEY", "specific"),
        ]))
        .expect("key found");
        assert_eq!(found.key, "specific");
        assert_eq!(found.source, KeySource::Environment("GEMINI_API_KEY"));
    }

    #[test]
    fn blank_values_are_skipped() {
        let found = key_from_env(lookup_from(&[("GEMINI_API_KEY", "   "), ("API_KEY", " k1 ")]))
            .expect("fallback key");
        assert_eq!(found.key, "k1");
        assert_eq!(found.source, KeySource::Environment("API_KEY"));

        assert_eq!(key_from_env(lookup_from(&[])), None);
    }

    #[test]
    fn disabled_keyring_stores_nothing() {
        let manager = AuthManager::new_with_keyring(false);
        assert!(manager.store_api_key("secret").is_ok());
        assert_eq!(manager.get_stored_key().expect("no backend access"), None);
        assert!(!manager.remove_api_key().expect("no backend access"));
    }

    #[test]
    fn keyring_errors_classify_recoverability() {
        let err = KeyringAccessError::from(keyring::Error::NoStorageAccess(Box::new(
            std::io::Error::other("locked"),
        )));
        assert!(err.is_recoverable());

        let err = KeyringAccessError::from(keyring::Error::NoEntry);
        assert!(!err.is_recoverable());
    }
}
