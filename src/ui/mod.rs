//! Line-oriented presentation layer.
//!
//! - [`transcript`] formats messages (speaker, body, sources, images).
//! - [`repl`] runs the interactive loop, forwarding user intents to
//!   [`crate::core::app`] and printing stream progress as it arrives.
//!
//! Ownership boundary: this layer only renders and forwards intents; all
//! conversation state lives in [`crate::core::app::App`].

pub mod repl;
pub mod transcript;
