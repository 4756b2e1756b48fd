//! # Error Types
//!
//! Error handling for the debugger control plane.
//!
//! We use `thiserror` to generate the `Error` trait implementations and
//! messages. Every variant here is reported to the invoking client; none of
//! them tears down a connection or the debugger itself.

use thiserror::Error;

use crate::breakpoints::BreakpointId;
use crate::types::{Address, ThreadId};

/// Main error type for debugger operations
///
/// ## Error Categories
///
/// 1. **Breakpoint errors**: Resolution, DuplicateAddress, NotFound
/// 2. **Thread errors**: UnknownThread
/// 3. **Process errors**: ProcessExited, AttachFailed, LaunchFailed
/// 4. **Owner errors**: OwnerStopped, OperationPanicked
/// 5. **Everything else**: InvalidArgument, Unsupported, Io
#[derive(Error, Debug)]
pub enum FerrosError
{
    /// The location does not map to an address
    ///
    /// Locations are either `file:line` or a function name. This happens when
    /// the file is unknown, the line carries no code, or no function has that
    /// name.
    #[error("Could not resolve location {0:?}")]
    Resolution(String),

    /// A breakpoint already exists at the resolved address.
    ///
    /// The stored collection is left unchanged.
    #[error("Breakpoint {existing} already exists at {address}")]
    DuplicateAddress
    {
        /// Address the new breakpoint resolved to
        address: Address,
        /// Identifier of the breakpoint already installed there
        existing: BreakpointId,
    },

    /// No breakpoint exists at the given address
    #[error("No breakpoint at address {0}")]
    NotFound(Address),

    /// No thread with this identifier is currently known
    #[error("Unknown thread {0}")]
    UnknownThread(ThreadId),

    /// The operation was attempted or completed against a terminated process
    ///
    /// Front-ends report this distinctly from ordinary failures; it is never
    /// fatal to the session.
    #[error("Process exited with status {status}")]
    ProcessExited
    {
        /// Raw exit status reported by the process handle
        status: u32,
    },

    /// Failed to attach to a running process
    #[error("Failed to attach to process: {0}")]
    AttachFailed(String),

    /// Failed to launch a new process under debugger control
    #[error("Failed to launch process: {0}")]
    LaunchFailed(String),

    /// The Process Owner thread is gone; nothing can reach the process anymore
    #[error("Process owner has stopped")]
    OwnerStopped,

    /// An operation panicked while running on the Process Owner thread
    ///
    /// The owner loop survives; only the submitter sees this error.
    #[error("Operation panicked on the process owner thread: {0}")]
    OperationPanicked(String),

    /// Invalid argument passed to a debugger function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The target does not support this operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// I/O error (for file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FerrosError
{
    /// Whether this is the distinguished "process already exited" condition.
    #[must_use]
    pub const fn is_process_exited(&self) -> bool
    {
        matches!(self, Self::ProcessExited { .. })
    }
}

/// Convenience type alias for `Result<T, FerrosError>`
///
/// ```rust
/// use ferros_core::error::FerrosResult;
/// fn foo() -> FerrosResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type FerrosResult<T> = std::result::Result<T, FerrosError>;
