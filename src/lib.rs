//! Parlor is a line-oriented terminal chat that streams persona replies from
//! Google's Gemini API.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation store, personas, configuration, the
//!   Gemini client and the action/command reducer that drives each turn.
//! - [`ui`] renders messages as plain text and runs the interactive REPL.
//! - [`auth`] resolves the API key from the environment or the system keyring.
//! - [`api`] defines the wire payloads exchanged with the REST endpoint.
//! - [`utils`] holds URL and data-URI helpers shared by the layers above.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which sets up [`logging`] and dispatches
//! into [`ui::repl::run_chat`] for interactive sessions.

pub mod api;
pub mod auth;
pub mod cli;
pub mod core;
pub mod logging;
pub mod ui;
pub mod utils;
