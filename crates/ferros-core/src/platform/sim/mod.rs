//! # Simulated Target
//!
//! A deterministic, in-memory implementation of the target capabilities.
//!
//! The simulated target replays a [`ProgramImage`]: a hand-written line table
//! plus one execution trace per thread. It implements [`ProcessHandle`] and
//! [`SymbolResolver`] exactly like a ptrace backend would (breakpoints stop
//! execution, steps advance by one instruction, step-over runs to the next
//! line of the current function), so the whole control plane can be driven
//! and tested without a real tracee.
//!
//! [`ProcessHandle`]: crate::handle::ProcessHandle
//! [`SymbolResolver`]: crate::handle::SymbolResolver

pub mod evaluator;
pub mod image;
pub mod process;

pub use evaluator::ImageEvaluator;
pub use image::ProgramImage;
pub use process::SimulatedProcess;
