//! # Types
//!
//! Data model shared by the debugger, the wire protocol, and front-ends.
//!
//! Identity types (`Address`, `ThreadId`, `ProcessId`) are newtypes so they
//! cannot be mixed up with each other or with plain counters. Snapshot types
//! (`Breakpoint`, `Thread`, `Process`) are immutable values handed out in
//! events; nothing outside the debugger ever holds a reference into live state.

pub mod address;
pub mod process;
pub mod snapshot;

// Re-export all public types
pub use address::Address;
pub use process::{ProcessId, ProcessState, StopReason, ThreadId};
pub use snapshot::{Breakpoint, Process, SourceLine, Thread};
