//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod persona_list;
pub mod say;
pub mod session;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::auth::ui::{prompt_confirmation, ConfirmationChoice};
use crate::auth::AuthManager;
use crate::cli::persona_list::list_personas;
use crate::cli::say::run_say;
use crate::cli::session::{build_client, load_config, open_app};
use crate::core::app::AppAction;
use crate::core::config::{path_display, Config};
use crate::logging::{init_tracing, LOG_ENV_VAR};
use crate::ui::repl::run_chat;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("VERGEN_GIT_SHA"),
    "\nbuilt: ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    "\nrustc: ",
    env!("VERGEN_RUSTC_SEMVER"),
);

#[derive(Parser)]
#[command(name = "parlor")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "A terminal chat with streaming Gemini personas")]
#[command(
    long_about = "Parlor is a line-oriented terminal chat that streams replies from Google's \
Gemini API. Each conversation is voiced by a persona; pick a built-in one or create your own \
with /new. Replies can include web-grounded sources and generated images.\n\n\
Authentication:\n\
  Use 'parlor auth' to store an API key in your system keyring.\n\n\
Environment Variables:\n\
  GEMINI_API_KEY    API key (takes precedence over the keyring)\n\
  API_KEY           Fallback API key\n\
  PARLOR_LOG        Log filter, e.g. 'debug' or 'parlor=trace' (default: warn)\n\n\
Commands inside the chat:\n\
  /help             List chat commands\n\
  /personas         List personas\n\
  /persona <id>     Switch persona\n\
  /new              Create a persona\n\
  /purge            Clear the conversation history\n\
  /save-image <p>   Save the latest generated image\n\
  /quit             Leave the chat"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Persona id to chat with
    #[arg(short = 'p', long, global = true, value_name = "PERSONA")]
    pub persona: Option<String>,

    /// Chat model to use instead of the configured one
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Write logs to the specified file instead of stderr
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store an API key in the system keyring
    Auth,
    /// Remove the stored API key
    Deauth,
    /// Start the chat interface (default)
    Chat,
    /// Send one prompt and print the reply
    Say {
        /// Prompt text (multiple words are joined with spaces)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List built-in and custom personas
    Personas,
    /// Clear the saved conversation history
    Purge {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the effective configuration
    Config,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.log.as_deref())?;
    debug!(filter_var = LOG_ENV_VAR, "Logging initialized");

    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    match args.command.unwrap_or(Commands::Chat) {
        Commands::Auth => {
            let auth_manager = AuthManager::new();
            if let Err(e) = auth_manager.interactive_auth() {
                eprintln!("❌ Authentication failed: {e}");
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Deauth => {
            let auth_manager = AuthManager::new();
            if let Err(e) = auth_manager.interactive_deauth() {
                eprintln!("❌ Deauthentication failed: {e}");
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Chat => {
            let config = load_config(args.model)?;
            let app = open_app(&config, args.persona.as_deref())?;
            let client = build_client(&config)?;
            run_chat(app, client, config).await
        }
        Commands::Say { prompt } => run_say(prompt, args.model, args.persona).await,
        Commands::Personas => list_personas(args.persona.as_deref()),
        Commands::Purge { yes } => {
            let config = load_config(None)?;
            if !yes {
                let question = format!(
                    "Delete the conversation history in {}?",
                    path_display(config.history_dir())
                );
                if prompt_confirmation(&question)? != ConfirmationChoice::Yes {
                    println!("Cancelled.");
                    return Ok(());
                }
            }
            let mut app = open_app(&config, args.persona.as_deref())?;
            app.handle_action(AppAction::PurgeHistory);
            if let Some(status) = app.take_status() {
                println!("✅ {status}");
            }
            Ok(())
        }
        Commands::Config => {
            let config = load_config(args.model)?;
            println!("Config file: {}", path_display(Config::get_config_path()));
            config.print_all();
            Ok(())
        }
    }
}
