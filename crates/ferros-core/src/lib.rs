//! # ferros-core
//!
//! The debugger control plane for Ferros.
//!
//! This crate provides:
//! - The data model shared with clients (breakpoints, threads, process status)
//! - The [`ProcessOwner`](owner::ProcessOwner): serialized access to the traced
//!   process from one fixed thread
//! - The [`Debugger`]: authoritative state, command dispatch, event emission,
//!   and periodic resync
//! - The capabilities a target must provide ([`handle`]) and a simulated
//!   target implementing them ([`platform::sim`])
//!
//! ## Data flow
//!
//! ```text
//! Command -> Debugger -> ProcessOwner -> ProcessHandle
//!                 \
//!                  `-> EventBus -> every subscriber (full snapshots)
//! ```

pub mod breakpoints;
pub mod command;
pub mod debugger;
pub mod error;
pub mod events;
pub mod handle;
pub mod owner;
pub mod platform;
pub mod prelude;
pub mod types;

pub use debugger::{spawn_resync, Debugger};
// Re-export commonly used types
pub use error::{FerrosError, FerrosResult};
pub use types::{Address, ProcessId, ThreadId};
