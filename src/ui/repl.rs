//! Line-oriented chat loop.
//!
//! Streams run on background tasks through [`ChatStreamService`]; the loop
//! `select!`s between stdin lines and stream messages and feeds both into the
//! reducer one action at a time.

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::auth::ui::{parse_confirmation, ConfirmationChoice};
use crate::core::app::{App, AppAction, AppCommand, TurnOutcome};
use crate::core::chat_stream::{ChatStreamService, CompletionClient, StreamEvent, StreamMessage};
use crate::core::config::Config;
use crate::core::persona::PersonaDraft;
use crate::ui::transcript::{
    format_details, format_message, persona_lines, render_transcript, speaker_label,
};
use crate::utils::data_uri::save_data_uri;

const HELP_TEXT: &str = "Commands:
  /personas            List personas
  /persona <id>        Switch the active persona
  /new                 Create a persona
  /purge               Clear the conversation
  /save-image <path>   Save the latest inline image
  /help                Show this help
  /quit                Exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Multi-line interactions waiting for their next input line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum PendingInput {
    #[default]
    None,
    PersonaName,
    PersonaDescription {
        name: String,
    },
    PersonaInstruction {
        name: String,
        description: String,
    },
    ConfirmPurge,
}

pub struct Repl<W: Write> {
    app: App,
    service: ChatStreamService,
    config: Config,
    config_path: PathBuf,
    out: W,
    pending: PendingInput,
    reply_id: Option<String>,
    printed: usize,
    visual_id: Option<String>,
}

impl<W: Write> Repl<W> {
    pub fn new(
        app: App,
        client: Arc<dyn CompletionClient>,
        config: Config,
        config_path: PathBuf,
        out: W,
    ) -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (service, rx) = ChatStreamService::new(client);
        let repl = Self {
            app,
            service,
            config,
            config_path,
            out,
            pending: PendingInput::None,
            reply_id: None,
            printed: 0,
            visual_id: None,
        };
        (repl, rx)
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn print_welcome(&mut self) -> io::Result<()> {
        writeln!(
            self.out,
            "💬 Parlor: talking to {} ({} personas, /help for commands)",
            self.app.active_persona().name,
            self.app.personas().list_personas().len()
        )?;
        writeln!(self.out)?;
        writeln!(self.out, "{}", render_transcript(self.app.messages()))?;
        self.print_prompt()
    }

    fn print_prompt(&mut self) -> io::Result<()> {
        if !self.app.in_flight() && self.pending == PendingInput::None {
            write!(self.out, "\n> ")?;
        }
        self.out.flush()
    }

    pub fn handle_line(&mut self, line: &str) -> io::Result<Flow> {
        let flow = match std::mem::take(&mut self.pending) {
            PendingInput::None => self.handle_input(line)?,
            pending => {
                self.continue_pending(pending, line)?;
                Flow::Continue
            }
        };
        if flow == Flow::Continue {
            self.print_prompt()?;
        }
        Ok(flow)
    }

    /// Feed one stdin read result. EOF quits; a line that is not valid
    /// UTF-8 is skipped.
    pub fn handle_read(&mut self, read: io::Result<Option<String>>) -> io::Result<Flow> {
        match read {
            Ok(Some(line)) => self.handle_line(&line),
            Ok(None) => Ok(Flow::Quit),
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                warn!(error = %err, "Skipping unreadable input line");
                writeln!(self.out, "⚠️  Input was not valid UTF-8; ignored.")?;
                self.print_prompt()?;
                Ok(Flow::Continue)
            }
            Err(err) => Err(err),
        }
    }

    fn handle_input(&mut self, line: &str) -> io::Result<Flow> {
        let trimmed = line.trim();
        let Some(command) = trimmed.strip_prefix('/') else {
            self.dispatch(AppAction::SubmitMessage {
                text: line.to_string(),
            })?;
            return Ok(Flow::Continue);
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        match name {
            "quit" | "exit" => return Ok(Flow::Quit),
            "help" => writeln!(self.out, "{HELP_TEXT}")?,
            "personas" => self.list_personas()?,
            "persona" if arg.is_empty() => writeln!(self.out, "Usage: /persona <id>")?,
            "persona" => self.dispatch(AppAction::SelectPersona { id: arg.to_string() })?,
            "new" => {
                write!(self.out, "Persona name: ")?;
                self.pending = PendingInput::PersonaName;
            }
            "purge" => {
                write!(self.out, "Clear the whole conversation? (y/N): ")?;
                self.pending = PendingInput::ConfirmPurge;
            }
            "save-image" if arg.is_empty() => writeln!(self.out, "Usage: /save-image <path>")?,
            "save-image" => self.save_latest_image(arg)?,
            _ => writeln!(self.out, "Unknown command: /{name} (try /help)")?,
        }
        Ok(Flow::Continue)
    }

    fn continue_pending(&mut self, pending: PendingInput, line: &str) -> io::Result<()> {
        let line = line.trim().to_string();
        match pending {
            PendingInput::None => {}
            PendingInput::PersonaName => {
                if line.is_empty() {
                    writeln!(self.out, "Persona name cannot be empty; cancelled.")?;
                    return Ok(());
                }
                write!(self.out, "Description (optional): ")?;
                self.pending = PendingInput::PersonaDescription { name: line };
            }
            PendingInput::PersonaDescription { name } => {
                write!(self.out, "Instructions ([CURRENT_NAME] is replaced by the name): ")?;
                self.pending = PendingInput::PersonaInstruction {
                    name,
                    description: line,
                };
            }
            PendingInput::PersonaInstruction { name, description } => {
                let before = self.app.personas().user_personas().len();
                self.dispatch(AppAction::CreatePersona {
                    draft: PersonaDraft {
                        name,
                        description,
                        instruction: line,
                    },
                })?;
                if self.app.personas().user_personas().len() > before {
                    self.persist_active_persona()?;
                }
            }
            PendingInput::ConfirmPurge => match parse_confirmation(&line) {
                Ok(ConfirmationChoice::Yes) => self.dispatch(AppAction::PurgeHistory)?,
                Ok(_) => writeln!(self.out, "Cancelled.")?,
                Err(err) => writeln!(self.out, "{err}; cancelled.")?,
            },
        }
        Ok(())
    }

    pub fn handle_stream_message(&mut self, message: StreamMessage, stream_id: u64) -> io::Result<()> {
        self.dispatch(AppAction::from_stream_message(message, stream_id))?;
        if !self.app.in_flight() {
            self.print_prompt()?;
        }
        Ok(())
    }

    fn dispatch(&mut self, action: AppAction) -> io::Result<()> {
        let command = self.app.handle_action(action.clone());
        self.render(&action, command.as_ref())?;
        if let Some(status) = self.app.take_status() {
            writeln!(self.out, "{status}")?;
        }
        if let Some(command) = command {
            self.execute(command);
        }
        self.out.flush()
    }

    fn execute(&self, command: AppCommand) {
        match command {
            AppCommand::SpawnStream { request, stream_id } => {
                debug!(stream_id, "Spawning stream");
                self.service.spawn_stream(request, stream_id);
            }
            AppCommand::GenerateImage {
                prompt,
                message_id,
                stream_id,
            } => self.service.spawn_image(prompt, message_id, stream_id),
        }
    }

    fn render(&mut self, action: &AppAction, command: Option<&AppCommand>) -> io::Result<()> {
        match (action, command) {
            (AppAction::SubmitMessage { .. }, Some(AppCommand::SpawnStream { .. })) => {
                let Some(reply) = self.app.messages().last() else {
                    return Ok(());
                };
                write!(self.out, "{}: ", speaker_label(reply))?;
                self.reply_id = Some(reply.id.clone());
                self.printed = 0;
            }
            (AppAction::StreamEvent { event: StreamEvent::Text(_), .. }, _) => {
                self.print_reply_delta()?;
            }
            (
                AppAction::StreamEvent { event: StreamEvent::Tool(_), .. },
                Some(AppCommand::GenerateImage { message_id, .. }),
            ) => {
                self.reply_id = None;
                self.visual_id = Some(message_id.clone());
                if let Some(visual) = self.app.conversation().get(message_id) {
                    writeln!(self.out)?;
                    writeln!(self.out, "{}", format_message(visual))?;
                }
            }
            (AppAction::StreamCompleted { .. } | AppAction::StreamFailed { .. }, _) => {
                self.finish_reply()?;
            }
            (AppAction::ImageSettled { message_id, .. }, _) => {
                if self.visual_id.as_deref() == Some(message_id.as_str()) && !self.app.in_flight() {
                    self.visual_id = None;
                    if let Some(visual) = self.app.conversation().get(message_id) {
                        if !visual.content.is_empty() && visual.image_url.is_none() {
                            writeln!(self.out, "{}", visual.content)?;
                        }
                        let details = format_details(visual);
                        if !details.is_empty() {
                            writeln!(self.out, "{details}")?;
                        }
                    }
                }
            }
            (AppAction::SelectPersona { .. } | AppAction::CreatePersona { .. }, _) => {
                self.print_new_greeting()?;
            }
            (AppAction::PurgeHistory, _) => {
                self.reply_id = None;
                self.visual_id = None;
                writeln!(self.out, "{}", render_transcript(self.app.messages()))?;
            }
            _ => {}
        }
        Ok(())
    }

    fn print_reply_delta(&mut self) -> io::Result<()> {
        let Some(reply_id) = self.reply_id.as_deref() else {
            return Ok(());
        };
        let Some(reply) = self.app.conversation().get(reply_id) else {
            return Ok(());
        };
        if let Some(delta) = reply.content.get(self.printed..) {
            write!(self.out, "{delta}")?;
            self.printed = reply.content.len();
        }
        Ok(())
    }

    fn finish_reply(&mut self) -> io::Result<()> {
        if self.app.in_flight() {
            return Ok(());
        }
        let Some(reply_id) = self.reply_id.take() else {
            return Ok(());
        };
        let Some(reply) = self.app.conversation().get(&reply_id) else {
            return Ok(());
        };
        if self.app.turn().last_outcome() == Some(TurnOutcome::Failed) {
            if self.printed > 0 {
                writeln!(self.out)?;
            }
            write!(self.out, "{}", reply.content)?;
        }
        writeln!(self.out)?;
        let details = format_details(reply);
        if !details.is_empty() {
            writeln!(self.out, "{details}")?;
        }
        Ok(())
    }

    fn print_new_greeting(&mut self) -> io::Result<()> {
        let name = self.app.active_persona().name.clone();
        writeln!(self.out, "Active persona: {name}")?;
        if let Some(last) = self.app.messages().last() {
            if last.is_greeting() && last.persona_name.as_deref() == Some(name.as_str()) {
                writeln!(self.out, "{}", format_message(last))?;
            }
        }
        Ok(())
    }

    fn list_personas(&mut self) -> io::Result<()> {
        for line in persona_lines(self.app.personas()) {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }

    fn save_latest_image(&mut self, path: &str) -> io::Result<()> {
        let latest = self
            .app
            .messages()
            .iter()
            .rev()
            .find_map(|m| m.image_url.clone());
        let Some(image_url) = latest else {
            writeln!(self.out, "No image in this conversation yet.")?;
            return Ok(());
        };
        match save_data_uri(&image_url, &PathBuf::from(path)) {
            Ok((image, written)) => writeln!(
                self.out,
                "✓ Saved {} ({} bytes) to {}",
                image.mime_type,
                image.bytes.len(),
                written.display()
            ),
            Err(err) => writeln!(self.out, "❌ {err}"),
        }
    }

    fn persist_active_persona(&mut self) -> io::Result<()> {
        let persona = self.app.active_persona().clone();
        self.config.upsert_persona(persona);
        if let Err(err) = self.config.save_to_path(&self.config_path) {
            warn!(error = %err, "Failed to save created persona");
            writeln!(self.out, "⚠️  Persona created for this session only: {err}")?;
        }
        Ok(())
    }
}

/// Run the interactive loop on stdin/stdout until EOF or `/quit`.
pub async fn run_chat(
    app: App,
    client: Arc<dyn CompletionClient>,
    config: Config,
) -> Result<(), Box<dyn Error>> {
    let (mut repl, mut rx) = Repl::new(app, client, config, Config::get_config_path(), io::stdout());
    repl.print_welcome()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                if repl.handle_read(line)? == Flow::Quit {
                    break;
                }
            }
            Some((message, stream_id)) = rx.recv() => {
                repl.handle_stream_message(message, stream_id)?;
            }
        }
    }
    writeln!(repl.out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat_stream::{CompletionError, ToolCall};
    use crate::core::message::{MessageRole, NETWORK_ERROR_NOTICE};
    use crate::utils::test_utils::{create_test_app, text, FakeCompletionClient};
    use tempfile::TempDir;

    type TestRepl = Repl<Vec<u8>>;

    fn test_repl(
        client: FakeCompletionClient,
        temp_dir: &TempDir,
    ) -> (TestRepl, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (app, _) = create_test_app();
        Repl::new(
            app,
            Arc::new(client),
            Config::default(),
            temp_dir.path().join("config.toml"),
            Vec::new(),
        )
    }

    async fn drain_turn(repl: &mut TestRepl, rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        while repl.app().in_flight() {
            let (message, stream_id) = rx.recv().await.expect("stream message");
            repl.handle_stream_message(message, stream_id).expect("render");
        }
    }

    fn output(repl: &TestRepl) -> String {
        String::from_utf8_lossy(repl.output()).into_owned()
    }

    #[tokio::test]
    async fn streamed_reply_is_printed_incrementally() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let client = FakeCompletionClient::new(vec![text("Hello"), text(", human")]);
        let (mut repl, mut rx) = test_repl(client, &temp_dir);

        repl.handle_line("hi there").expect("submit");
        drain_turn(&mut repl, &mut rx).await;

        assert!(output(&repl).contains("SAYANBOT: Hello, human\n"));
        assert_eq!(repl.app().messages().len(), 3);
    }

    #[tokio::test]
    async fn failed_stream_prints_notice() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let client = FakeCompletionClient::failing_open(CompletionError::Transport("down".into()));
        let (mut repl, mut rx) = test_repl(client, &temp_dir);

        repl.handle_line("hello").expect("submit");
        drain_turn(&mut repl, &mut rx).await;

        assert!(output(&repl).contains(NETWORK_ERROR_NOTICE));
    }

    #[tokio::test]
    async fn image_turn_prints_visual_and_result() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let client = FakeCompletionClient::new(vec![Ok(StreamEvent::Tool(ToolCall {
            enhanced_prompt: "a cat".into(),
            commentary: "Here you go".into(),
        }))])
        .with_image(Some("data:image/png;base64,QUJD".into()));
        let (mut repl, mut rx) = test_repl(client, &temp_dir);

        repl.handle_line("draw a cat").expect("submit");
        drain_turn(&mut repl, &mut rx).await;

        let out = output(&repl);
        assert!(out.contains("CREATIVE VISUAL MODE: Here you go"));
        assert!(out.contains("Generating Visualization... a cat"));
        assert!(out.contains("[image/png image, 3 bytes]"));

        let target = temp_dir.path().join("cat.png");
        repl.handle_line(&format!("/save-image {}", target.display()))
            .expect("save");
        assert_eq!(std::fs::read(&target).expect("saved image"), b"ABC");
    }

    #[tokio::test]
    async fn submissions_during_a_turn_are_dropped() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let client = FakeCompletionClient::new(vec![text("one")]);
        let (mut repl, mut rx) = test_repl(client, &temp_dir);

        repl.handle_line("first").expect("submit");
        repl.handle_line("second").expect("ignored");
        drain_turn(&mut repl, &mut rx).await;

        let users: Vec<_> = repl
            .app()
            .messages()
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(users, vec!["first".to_string()]);
    }

    #[test]
    fn new_persona_flow_creates_and_persists() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (mut repl, _rx) = test_repl(FakeCompletionClient::new(Vec::new()), &temp_dir);

        repl.handle_line("/new").expect("start");
        repl.handle_line("Nova").expect("name");
        repl.handle_line("Stargazer").expect("description");
        repl.handle_line("You are [CURRENT_NAME].").expect("instruction");

        assert_eq!(repl.app().active_persona().name, "Nova");
        assert!(output(&repl).contains("Created persona: Nova"));

        let saved = Config::load_from_path(&temp_dir.path().join("config.toml")).expect("config");
        assert_eq!(saved.personas.len(), 1);
        assert_eq!(saved.personas[0].id, "nova");
    }

    #[test]
    fn purge_requires_confirmation() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (mut repl, _rx) = test_repl(FakeCompletionClient::new(Vec::new()), &temp_dir);
        repl.handle_line("/persona codex").expect("switch");
        repl.handle_line("/persona maximus").expect("switch");
        let before = repl.app().messages().len();

        repl.handle_line("/purge").expect("ask");
        repl.handle_line("n").expect("decline");
        assert_eq!(repl.app().messages().len(), before);
        assert!(output(&repl).contains("Cancelled."));

        repl.handle_line("/purge").expect("ask");
        repl.handle_line("y").expect("confirm");
        assert_eq!(repl.app().messages().len(), 1);
        assert!(output(&repl).contains("History purged"));
    }

    #[test]
    fn slash_commands_report_usage_and_unknowns() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (mut repl, _rx) = test_repl(FakeCompletionClient::new(Vec::new()), &temp_dir);

        repl.handle_line("/persona").expect("usage");
        repl.handle_line("/persona ghost").expect("unknown persona");
        repl.handle_line("/bogus").expect("unknown");
        repl.handle_line("/personas").expect("list");
        assert_eq!(repl.handle_line("/quit").expect("quit"), Flow::Quit);

        let out = output(&repl);
        assert!(out.contains("Usage: /persona <id>"));
        assert!(out.contains("Persona 'ghost' not found"));
        assert!(out.contains("Unknown command: /bogus"));
        assert!(out.contains("* sayanbot - SAYANBOT"));
    }

    #[test]
    fn undecodable_input_is_skipped_and_eof_quits() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (mut repl, _rx) = test_repl(FakeCompletionClient::new(Vec::new()), &temp_dir);

        let bad = io::Error::new(io::ErrorKind::InvalidData, "stream did not contain valid UTF-8");
        assert_eq!(repl.handle_read(Err(bad)).expect("skipped"), Flow::Continue);
        assert!(output(&repl).contains("not valid UTF-8"));

        assert_eq!(
            repl.handle_read(Ok(Some("/personas".into()))).expect("line"),
            Flow::Continue
        );
        assert_eq!(repl.handle_read(Ok(None)).expect("eof"), Flow::Quit);

        let broken = io::Error::new(io::ErrorKind::BrokenPipe, "closed");
        assert!(repl.handle_read(Err(broken)).is_err());
    }

    #[test]
    fn save_image_reports_missing_image() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (mut repl, _rx) = test_repl(FakeCompletionClient::new(Vec::new()), &temp_dir);
        repl.handle_line("/save-image nothing-yet").expect("save");
        assert!(output(&repl).contains("No image in this conversation yet."));
    }
}
