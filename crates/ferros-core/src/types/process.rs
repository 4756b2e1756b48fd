//! Process and thread identity, plus the lifecycle observed by the debugger.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Process identifier (PID) of the traced process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Thread identifier
///
/// On Linux this is the kernel TID. It is the handle clients use for
/// `SwitchThread`, so it serializes as a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    /// Get the raw `u64` representation of the thread identifier.
    #[must_use]
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for ThreadId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of the traced process as observed by the debugger
///
/// ## State Transitions
///
/// - `Attached` → `Running`: the first Continue/Step/StepOver
/// - `Running` → `Stopped`: breakpoint hit or step completion
/// - `Stopped` → `Running`: Continue/Step/StepOver
/// - `Attached`/`Running`/`Stopped` → `Detached`: Detach
/// - any → `Exited(status)`: the process handle reports termination
///
/// `Exited` is terminal. `Detached` only admits the transition to `Exited`,
/// which is discovered by status polling during resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState
{
    /// Attached or launched, not resumed yet.
    Attached,
    /// Executing under debugger control.
    Running,
    /// Stopped at a breakpoint or after a step.
    Stopped,
    /// Released from debugger control; still running on its own.
    Detached,
    /// Terminated with the given raw status.
    Exited(u32),
}

impl ProcessState
{
    /// Whether control operations may still reach the process handle.
    #[must_use]
    pub const fn is_controllable(self) -> bool
    {
        matches!(self, Self::Attached | Self::Running | Self::Stopped)
    }

    #[must_use]
    pub const fn has_exited(self) -> bool
    {
        matches!(self, Self::Exited(_))
    }
}

impl fmt::Display for ProcessState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Attached => f.write_str("attached"),
            Self::Running => f.write_str("running"),
            Self::Stopped => f.write_str("stopped"),
            Self::Detached => f.write_str("detached"),
            Self::Exited(status) => write!(f, "exited with status {status}"),
        }
    }
}

/// What a resume operation on the process handle ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason
{
    /// Stopped at a breakpoint at the given address.
    Breakpoint(u64),
    /// A single step or step-over completed.
    StepComplete,
    /// Stopped for another reason (signal, manual interrupt).
    Interrupted,
    /// The process terminated with the given raw status.
    Exited(u32),
}
