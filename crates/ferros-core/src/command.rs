//! Commands accepted by the debugger.
//!
//! A closed set of kinds, each carrying only its own payload. The debugger
//! matches on it exhaustively, so adding a kind is a compile error until every
//! dispatcher handles it.

use crate::types::{Address, ThreadId};

/// A request against the debugged process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command
{
    /// Set a breakpoint at `file:line` or at a function's entry.
    AddBreakPoint
    {
        location: String
    },
    /// Remove every breakpoint.
    ClearBreakPoints,
    /// Remove the breakpoint at exactly this address.
    Clear
    {
        address: Address
    },
    /// Release the process; it keeps running on its own.
    Detach,
    /// Terminate the process.
    Kill,
    /// Select the thread used for thread-relative operations.
    SwitchThread
    {
        id: ThreadId
    },
    Continue,
    /// Single instruction step.
    Step,
    /// Step over calls to the next source line.
    Next,
}

impl Command
{
    /// Name of the command kind, as used on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str
    {
        match self {
            Self::AddBreakPoint { .. } => "AddBreakPoint",
            Self::ClearBreakPoints => "ClearBreakPoints",
            Self::Clear { .. } => "Clear",
            Self::Detach => "Detach",
            Self::Kill => "Kill",
            Self::SwitchThread { .. } => "SwitchThread",
            Self::Continue => "Continue",
            Self::Step => "Step",
            Self::Next => "Next",
        }
    }
}
