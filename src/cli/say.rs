//! One-shot "say" command: submit a single prompt and stream the reply to stdout.

use std::error::Error;
use std::io::{self, Write};

use crate::cli::session::{build_client, load_config, open_app};
use crate::core::app::driver::run_turn;
use crate::core::app::{AppAction, TurnOutcome};
use crate::core::chat_stream::StreamEvent;
use crate::core::message::MessageRole;
use crate::ui::transcript::{format_details, format_message, speaker_label};

pub async fn run_say(
    prompt: Vec<String>,
    model: Option<String>,
    persona: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: parlor say <prompt>");
        std::process::exit(1);
    }

    let config = load_config(model)?;
    let mut app = open_app(&config, persona.as_deref())?;
    let client = build_client(&config)?;
    let history_len = app.messages().len();

    print!("{}: ", app.active_persona().name);
    io::stdout().flush()?;

    let mut write_error = None;
    let outcome = run_turn(&mut app, client.as_ref(), &prompt, |app, action| {
        if let AppAction::StreamEvent {
            event: StreamEvent::Text(delta),
            stream_id,
        } = action
        {
            if app.is_current_stream(*stream_id) && write_error.is_none() {
                print!("{delta}");
                if let Err(err) = io::stdout().flush() {
                    write_error = Some(err);
                }
            }
        }
    })
    .await;
    println!();
    if let Some(err) = write_error {
        return Err(err.into());
    }

    // The user's prompt and the streamed body are already on screen.
    let added = app.messages().get(history_len..).unwrap_or_default();
    for message in added.iter().filter(|m| m.role != MessageRole::User) {
        match message.role {
            MessageRole::Visual => println!("\n{}", format_message(message)),
            _ => {
                let details = format_details(message);
                if !details.is_empty() {
                    println!("{details}");
                }
            }
        }
    }

    match outcome {
        Some(TurnOutcome::Failed) => {
            if let Some(notice) = added.iter().rev().find(|m| m.role == MessageRole::Assistant) {
                eprintln!("❌ {}: {}", speaker_label(notice), notice.content);
            }
            std::process::exit(1);
        }
        None => {
            eprintln!("❌ Prompt was not submitted");
            std::process::exit(1);
        }
        Some(_) => Ok(()),
    }
}
