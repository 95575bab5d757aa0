//! Runs one turn to completion on the current task.
//!
//! The interactive loop spawns stream work onto background tasks; one-shot
//! callers use [`run_turn`] instead, which awaits each stream event and the
//! image request in place and feeds the results back through the reducer.

use futures_util::StreamExt;

use super::{App, AppAction, AppCommand, TurnOutcome};
use crate::core::chat_stream::CompletionClient;

/// Submit `text` and drive every resulting command until the turn ends.
///
/// `observer` sees each action after it has been applied. Returns `None`
/// when the submission was rejected (blank text or a turn already running).
pub async fn run_turn<F>(
    app: &mut App,
    client: &dyn CompletionClient,
    text: &str,
    mut observer: F,
) -> Option<TurnOutcome>
where
    F: FnMut(&App, &AppAction),
{
    let mut pending = dispatch(
        app,
        AppAction::SubmitMessage {
            text: text.to_string(),
        },
        &mut observer,
    );
    pending.as_ref()?;

    while let Some(command) = pending.take() {
        pending = execute_command(app, client, command, &mut observer).await;
    }
    app.turn().last_outcome()
}

/// Execute one command, returning the follow-up command it produced, if any.
pub async fn execute_command<F>(
    app: &mut App,
    client: &dyn CompletionClient,
    command: AppCommand,
    observer: &mut F,
) -> Option<AppCommand>
where
    F: FnMut(&App, &AppAction),
{
    match command {
        AppCommand::SpawnStream { request, stream_id } => {
            let mut stream = match client.stream_reply(request).await {
                Ok(stream) => stream,
                Err(error) => {
                    return dispatch(app, AppAction::StreamFailed { error, stream_id }, observer)
                }
            };

            while let Some(item) = stream.next().await {
                let action = match item {
                    Ok(event) => AppAction::StreamEvent { event, stream_id },
                    Err(error) => AppAction::StreamFailed { error, stream_id },
                };
                if let Some(next) = dispatch(app, action, observer) {
                    return Some(next);
                }
                if !app.is_current_stream(stream_id) {
                    return None;
                }
            }
            dispatch(app, AppAction::StreamCompleted { stream_id }, observer)
        }
        AppCommand::GenerateImage {
            prompt,
            message_id,
            stream_id,
        } => {
            let image_url = client.generate_image(&prompt).await;
            dispatch(
                app,
                AppAction::ImageSettled {
                    message_id,
                    image_url,
                    stream_id,
                },
                observer,
            )
        }
    }
}

fn dispatch<F>(app: &mut App, action: AppAction, observer: &mut F) -> Option<AppCommand>
where
    F: FnMut(&App, &AppAction),
{
    let command = app.handle_action(action.clone());
    observer(app, &action);
    command
}
