//! # Target Capabilities
//!
//! The debugger never talks to a traced process directly. It consumes two
//! capabilities, implemented per platform (or by the simulated backend in
//! [`crate::platform::sim`]):
//!
//! - [`ProcessHandle`]: low-level control of one traced process
//! - [`SymbolResolver`]: mapping between source locations and addresses
//!
//! A third capability, [`Evaluator`], is used by front-ends to render values
//! and symbol listings. The debugger itself never evaluates anything.
//!
//! ## Thread affinity
//!
//! `ProcessHandle` is deliberately not required to be `Send`. ptrace-style
//! control only works from the thread that attached, so a handle is built on
//! the Process Owner thread and stays there for its whole life. See
//! [`crate::owner::ProcessOwner`].

use crate::breakpoints::{BreakpointKind, BreakpointSite, InstalledBreakpoint};
use crate::error::{FerrosError, FerrosResult};
use crate::types::{Address, ProcessId, SourceLine, StopReason, Thread, ThreadId};

/// One thread as reported by the process handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadState
{
    pub id: ThreadId,
    pub pc: Address,
    /// Raw execution status code.
    pub status: u32,
}

/// Low-level control of a single traced process
///
/// ## Lifecycle
///
/// 1. Construct by attaching to or launching a process (on the owner thread)
/// 2. Resume / step / install breakpoints while it is live
/// 3. `detach()` or `kill()`
///
/// Once the process has exited, resume operations return
/// `Ok(StopReason::Exited(status))` or `Err(FerrosError::ProcessExited)`;
/// [`ProcessHandle::exit_status`] keeps reporting the final status.
pub trait ProcessHandle
{
    fn pid(&self) -> ProcessId;

    /// Resume the current thread until it stops or the process exits.
    ///
    /// ## Errors
    ///
    /// - `ProcessExited`: the process was already gone
    fn continue_execution(&mut self) -> FerrosResult<StopReason>;

    /// Execute a single instruction on the current thread.
    fn step(&mut self) -> FerrosResult<StopReason>;

    /// Run to the next source line of the current function, stepping over
    /// calls.
    fn step_over(&mut self) -> FerrosResult<StopReason>;

    /// Install a trap at `address`, reporting how it was implemented.
    fn set_breakpoint(&mut self, address: Address) -> FerrosResult<BreakpointKind>;

    /// Remove the trap at `address`.
    ///
    /// ## Errors
    ///
    /// - `NotFound`: nothing was installed there
    fn clear_breakpoint(&mut self, address: Address, kind: BreakpointKind) -> FerrosResult<()>;

    /// Every trap currently installed, including ones the handle placed itself.
    fn installed_breakpoints(&self) -> Vec<InstalledBreakpoint>;

    /// Enumerate the live threads of the process.
    fn threads(&self) -> FerrosResult<Vec<ThreadState>>;

    /// The thread resume and step operations act on.
    fn current_thread(&self) -> Option<ThreadId>;

    /// Make `id` the thread resume and step operations act on.
    ///
    /// ## Errors
    ///
    /// - `UnknownThread`: no live thread has this id
    fn switch_thread(&mut self, id: ThreadId) -> FerrosResult<()>;

    /// Raw status code of the last stop (or the exit status once exited).
    fn status_code(&self) -> u32;

    /// Final exit status, or `None` while the process is still alive.
    ///
    /// This is the one query that remains meaningful after exit and after
    /// detach.
    fn exit_status(&mut self) -> Option<u32>;

    /// Release the process; it keeps running independently.
    fn detach(&mut self) -> FerrosResult<()>;

    /// Terminate the process.
    fn kill(&mut self) -> FerrosResult<()>;
}

/// Mapping between source locations and machine addresses.
pub trait SymbolResolver
{
    /// Resolve `file:line` or a function name to a breakpoint site.
    ///
    /// ## Errors
    ///
    /// - `Resolution`: the location does not map to an address
    fn resolve_location(&self, location: &str) -> FerrosResult<BreakpointSite>;

    /// Source position of the instruction at `pc`, if known.
    fn location_for_pc(&self, pc: Address) -> Option<SourceLine>;

    /// Known source files, sorted.
    fn source_files(&self) -> Vec<String>;

    /// Known function names, sorted.
    fn functions(&self) -> Vec<String>;
}

/// Everything the debugger needs from a target.
pub trait Target: ProcessHandle + SymbolResolver {}

impl<T> Target for T where T: ProcessHandle + SymbolResolver {}

/// Symbol listings accepted by `info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKind
{
    Args,
    Funcs,
    Locals,
    Sources,
    Vars,
}

impl std::str::FromStr for InfoKind
{
    type Err = FerrosError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s {
            "args" => Ok(Self::Args),
            "funcs" => Ok(Self::Funcs),
            "locals" => Ok(Self::Locals),
            "sources" => Ok(Self::Sources),
            "vars" => Ok(Self::Vars),
            other => Err(FerrosError::InvalidArgument(format!(
                "unsupported info type {other:?}, must be args, funcs, locals, sources, or vars"
            ))),
        }
    }
}

/// Renders values and symbol listings for a front-end.
///
/// `pc` is the program counter of the thread the front-end considers current,
/// taken from its cache; it selects the function scope for args and locals.
pub trait Evaluator: Send + Sync
{
    /// Evaluate `expression` and return its display string.
    fn evaluate(&self, expression: &str, pc: Option<Address>) -> FerrosResult<String>;

    /// List symbols of the given kind, unsorted and unfiltered.
    fn info(&self, kind: InfoKind, pc: Option<Address>) -> FerrosResult<Vec<String>>;

    /// One line per thread, headed by a count.
    fn goroutines(&self, threads: &[Thread]) -> Vec<String>
    {
        let mut lines = vec![format!("[{} goroutines]", threads.len())];
        for thread in threads {
            let location = thread
                .current_line
                .as_ref()
                .map_or_else(|| "?".to_string(), |line| format!("{}:{}", line.file, line.line));
            lines.push(format!("Goroutine {} - {} {}", thread.id, location, thread.current_pc));
        }
        lines
    }
}
