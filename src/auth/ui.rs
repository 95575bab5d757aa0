//! Blocking stdin prompts used by the credential and purge commands.

use std::fmt;
use std::io::{self, Write};

const API_KEY_PROMPT: &str = "Enter your API key: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationChoice {
    Yes,
    No,
    Cancel,
}

#[derive(Debug, Clone)]
pub struct UiError {
    message: String,
}

impl UiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for UiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UiError {}

/// Print `prompt` without a newline and read one trimmed line.
pub fn prompt_line(prompt: &str) -> Result<String, UiError> {
    print!("{prompt}");
    io::stdout()
        .flush()
        .map_err(|err| UiError::new(err.to_string()))?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|err| UiError::new(err.to_string()))?;
    Ok(input.trim().to_string())
}

pub fn prompt_api_key() -> Result<String, UiError> {
    println!("Keys are created at https://aistudio.google.com/apikey");
    prompt_line(API_KEY_PROMPT)
}

pub fn prompt_confirmation(question: &str) -> Result<ConfirmationChoice, UiError> {
    let answer = prompt_line(&format!("{question} (y/N): "))?;
    parse_confirmation(&answer)
}

/// Empty input means "no".
pub fn parse_confirmation(input: &str) -> Result<ConfirmationChoice, UiError> {
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() {
        return Ok(ConfirmationChoice::No);
    }
    match trimmed.as_str() {
        "y" | "yes" => Ok(ConfirmationChoice::Yes),
        "n" | "no" => Ok(ConfirmationChoice::No),
        "c" | "cancel" => Ok(ConfirmationChoice::Cancel),
        _ => Err(UiError::new("Invalid confirmation response")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_parsing() {
        assert_eq!(parse_confirmation("y").unwrap(), ConfirmationChoice::Yes);
        assert_eq!(parse_confirmation(" YES\n").unwrap(), ConfirmationChoice::Yes);
        assert_eq!(parse_confirmation("").unwrap(), ConfirmationChoice::No);
        assert_eq!(parse_confirmation("no").unwrap(), ConfirmationChoice::No);
        assert_eq!(parse_confirmation("c").unwrap(), ConfirmationChoice::Cancel);
        assert!(parse_confirmation("maybe").is_err());
    }
}
