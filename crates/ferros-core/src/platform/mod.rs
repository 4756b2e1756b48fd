//! # Platform Implementations
//!
//! Backends implementing [`crate::handle::ProcessHandle`] and
//! [`crate::handle::SymbolResolver`].
//!
//! - **sim**: a deterministic replay of a [`sim::ProgramImage`], used by the
//!   `ferros` binary when no native backend is available and by the test
//!   suite
//!
//! Native backends (ptrace on Linux, Mach on macOS) plug in behind the same
//! two traits; the debugger never sees anything else.

pub mod sim;
