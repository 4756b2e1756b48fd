//! Terminal error types.

use ferros_core::error::FerrosError;
use ferros_protocol::ClientError;

/// Errors surfaced by the terminal front-end.
///
/// Command errors are printed and the prompt carries on. Only
/// `ConnectionLost`, `Input`, and `ExitPrompt` end the session.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError
{
    /// The typed command matches no alias.
    #[error("command not available: {0}")]
    CommandNotFound(String),

    #[error("not enough arguments, usage: {0}")]
    NotEnoughArguments(&'static str),

    #[error("{0}")]
    InvalidArgument(String),

    /// The cached process status says the target is gone.
    #[error("Process exited with status {status}")]
    ProcessExited
    {
        status: u32
    },

    /// `print`/`info` need symbol information this session does not have.
    #[error("no program image loaded, cannot evaluate")]
    NoEvaluator,

    #[error(transparent)]
    Debugger(#[from] FerrosError),

    #[error(transparent)]
    Client(#[from] ClientError),

    /// The event stream ended; the server is gone.
    #[error("Lost connection to the debugger")]
    ConnectionLost,

    #[error("Prompt for input failed: {0}")]
    Input(String),

    /// The exit confirmation itself could not be read.
    #[error("Exit confirmation failed: {0}")]
    ExitPrompt(String),
}

impl TerminalError
{
    /// Process exit code for errors that end the session.
    #[must_use]
    pub const fn exit_code(&self) -> i32
    {
        match self {
            Self::ExitPrompt(_) => 2,
            _ => 1,
        }
    }
}

pub type TerminalResult<T> = std::result::Result<T, TerminalError>;
