//! Common module for library exports

pub use crate::breakpoints::{BreakpointId, BreakpointKind};
pub use crate::command::Command;
pub use crate::debugger::{spawn_resync, Debugger};
pub use crate::error::{FerrosError, FerrosResult};
pub use crate::events::{DebuggerEvent, EventBus, Message};
pub use crate::handle::{Evaluator, InfoKind, ProcessHandle, SymbolResolver, Target};
pub use crate::types::address::Address;
pub use crate::types::process::{ProcessId, ProcessState, StopReason, ThreadId};
pub use crate::types::snapshot::{Breakpoint, Process, SourceLine, Thread};
