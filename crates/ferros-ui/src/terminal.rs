//! Interactive prompt.
//!
//! Two loops run side by side:
//!
//! - the **event consumer** folds every event into the cache and prints
//!   `Message` events as `** body`
//! - the **prompt loop** reads a line, dispatches it, and reports errors
//!
//! Line editing blocks, so each read runs on the blocking pool and hands the
//! editor back when it is done. Losing the event stream ends the session
//! with [`TerminalError::ConnectionLost`].

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossterm::style::Stylize;
use ferros_core::events::Message;
use ferros_core::handle::Evaluator;
use ferros_protocol::{Client, EventStream};
use ferros_utils::FerrosConfig;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, ExternalPrinter};
use tokio_util::sync::CancellationToken;

use crate::cache::{self, CacheReader, CacheWriter};
use crate::commands::{Commands, Context, Outcome};
use crate::error::{TerminalError, TerminalResult};

const WELCOME: &str = "Type 'help' for list of commands.";
const KILL_QUESTION: &str = "Would you like to kill the process? [y/n] ";

#[derive(Debug, Clone)]
pub struct TerminalOptions
{
    pub prompt: String,
    pub history_file: PathBuf,
}

impl From<&FerrosConfig> for TerminalOptions
{
    fn from(config: &FerrosConfig) -> Self
    {
        Self {
            prompt: config.prompt.clone(),
            history_file: config.history_file.clone(),
        }
    }
}

/// Terminal session over one [`Client`] connection.
pub struct Terminal
{
    client: Client,
    commands: Commands,
    evaluator: Option<Arc<dyn Evaluator>>,
    options: TerminalOptions,
}

impl Terminal
{
    #[must_use]
    pub fn new(client: Client, options: TerminalOptions) -> Self
    {
        Self {
            client,
            commands: Commands::new(),
            evaluator: None,
            options,
        }
    }

    /// Enable `print`, `info`, and `goroutines`.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self
    {
        self.evaluator = Some(evaluator);
        self
    }

    /// Run until the user exits.
    ///
    /// ## Errors
    ///
    /// - `ConnectionLost`: the event stream ended
    /// - `Input`: the prompt could not be read
    /// - `ExitPrompt`: the kill confirmation could not be read
    pub async fn run(mut self) -> TerminalResult<()>
    {
        let events = self.client.events()?;
        let mut editor = DefaultEditor::new().map_err(|err| TerminalError::Input(err.to_string()))?;
        if let Err(err) = editor.load_history(&self.options.history_file) {
            tracing::debug!("No history loaded: {err}");
        }

        let printer = Printer::new(&mut editor);
        let (writer, cache) = cache::channel();
        let lost = CancellationToken::new();
        let consumer = tokio::spawn(consume_events(events, writer, printer, lost.clone()));

        println!("{WELCOME}");
        let mut input = LineReader { editor: Some(editor) };
        let result = self.prompt_loop(&mut input, &cache, &lost).await;

        consumer.abort();
        result
    }

    async fn prompt_loop(
        &mut self,
        input: &mut LineReader,
        cache: &CacheReader,
        lost: &CancellationToken,
    ) -> TerminalResult<()>
    {
        loop {
            let read = tokio::select! {
                () = lost.cancelled() => return Err(TerminalError::ConnectionLost),
                read = input.read(&self.options.prompt) => read,
            };

            let line = match read {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => return self.exit(input, cache.clone(), lost).await,
                Err(err) => return Err(TerminalError::Input(err.to_string())),
            };
            input.remember(&line);

            let snapshot = cache.borrow().clone();
            let mut stdout = io::stdout();
            let mut ctx = Context {
                client: &self.client,
                cache: &snapshot,
                evaluator: self.evaluator.as_ref(),
                out: &mut stdout,
            };
            match self.commands.dispatch(&line, &mut ctx) {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Exit) => return self.exit(input, cache.clone(), lost).await,
                Err(err) => report(&err),
            }
        }
    }

    /// Clear breakpoints, kill or detach per the user's answer, then wait
    /// for the process to be reported exited.
    async fn exit(&self, input: &mut LineReader, mut cache: CacheReader, lost: &CancellationToken) -> TerminalResult<()>
    {
        if let Err(err) = input.save_history(&self.options.history_file) {
            println!("readline history error: {err}");
        }

        let answer = input
            .read(KILL_QUESTION)
            .await
            .map_err(|err| TerminalError::ExitPrompt(err.to_string()))?;

        self.client.clear_breakpoints()?;
        if is_affirmative(&answer) {
            self.client.kill()?;
        } else {
            self.client.detach()?;
        }

        println!("Waiting for process to terminate (ctrl-c to give up)...");
        let outcome = wait_for_exit(&mut cache, lost, tokio::signal::ctrl_c()).await;
        tracing::info!(?outcome, "Terminal exiting");
        Ok(())
    }
}

fn is_affirmative(answer: &str) -> bool
{
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn report(err: &TerminalError)
{
    tracing::warn!("Command failed: {err}");
    match err {
        TerminalError::ProcessExited { .. } => eprintln!("{err}"),
        _ => eprintln!("Command failed: {err}"),
    }
}

/// How the wait after `exit` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome
{
    Exited,
    GaveUp,
    Disconnected,
}

/// Wait until the cache reports the process exited, `interrupt` completes,
/// or the connection is lost. There is no timeout.
pub async fn wait_for_exit<F, T>(cache: &mut CacheReader, lost: &CancellationToken, interrupt: F) -> WaitOutcome
where
    F: Future<Output = T>,
{
    tokio::pin!(interrupt);
    loop {
        if cache.borrow_and_update().process.exited {
            return WaitOutcome::Exited;
        }
        tokio::select! {
            _ = &mut interrupt => return WaitOutcome::GaveUp,
            () = lost.cancelled() => return WaitOutcome::Disconnected,
            changed = cache.changed() => {
                if changed.is_err() {
                    return WaitOutcome::Disconnected;
                }
            }
        }
    }
}

async fn consume_events(mut events: EventStream, cache: CacheWriter, mut printer: Printer, lost: CancellationToken)
{
    while let Some(event) = events.recv().await {
        if let Some(message) = cache.apply(event) {
            printer.print(&message);
        }
    }
    tracing::warn!("Event stream ended");
    lost.cancel();
}

/// Prints above the prompt while a line is being edited, when the terminal
/// supports it.
enum Printer
{
    External(Box<dyn ExternalPrinter + Send>),
    Stdout,
}

impl Printer
{
    fn new(editor: &mut DefaultEditor) -> Self
    {
        match editor.create_external_printer() {
            Ok(printer) => Self::External(Box::new(printer)),
            Err(err) => {
                tracing::debug!("External printer unavailable: {err}");
                Self::Stdout
            }
        }
    }

    fn print(&mut self, message: &Message)
    {
        let line = format_message(message);
        match self {
            Self::External(printer) => {
                if let Err(err) = printer.print(line.clone()) {
                    tracing::debug!("External print failed: {err}");
                    println!("{line}");
                }
            }
            Self::Stdout => println!("{line}"),
        }
    }
}

fn format_message(message: &Message) -> String
{
    let line = format!("** {}", message.body);
    if message.is_error {
        line.red().to_string()
    } else if message.level == Message::LEVEL_WARN {
        line.yellow().to_string()
    } else {
        line
    }
}

/// Owns the line editor between reads.
struct LineReader
{
    editor: Option<DefaultEditor>,
}

impl LineReader
{
    async fn read(&mut self, prompt: &str) -> Result<String, ReadlineError>
    {
        let mut editor = self
            .editor
            .take()
            .ok_or_else(|| ReadlineError::Io(io::Error::other("line editor unavailable")))?;
        let prompt = prompt.to_string();

        let (editor, line) = tokio::task::spawn_blocking(move || {
            let line = editor.readline(&prompt);
            (editor, line)
        })
        .await
        .map_err(|err| ReadlineError::Io(io::Error::other(err)))?;

        self.editor = Some(editor);
        line
    }

    fn remember(&mut self, line: &str)
    {
        if line.trim().is_empty() {
            return;
        }
        if let Some(editor) = &mut self.editor {
            if let Err(err) = editor.add_history_entry(line) {
                tracing::debug!("History entry dropped: {err}");
            }
        }
    }

    fn save_history(&mut self, path: &Path) -> Result<(), ReadlineError>
    {
        match &mut self.editor {
            Some(editor) => editor.save_history(path),
            None => Ok(()),
        }
    }
}
