//! Snapshot types published to clients.
//!
//! These are the values carried by the `*Updated` events. A snapshot is always
//! a full replacement of the corresponding collection; clients never merge
//! them. Field names follow the wire protocol (camelCase).

use serde::{Deserialize, Serialize};

use super::{Address, ThreadId};
use crate::breakpoints::BreakpointId;

/// A breakpoint as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint
{
    pub id: BreakpointId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    pub file: String,
    pub line: u32,
    pub addr: Address,
    /// Internal breakpoint (e.g. installed for a step-over). Never part of
    /// a user-visible snapshot.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub temporary: bool,
}

/// Resolved source position of a program counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLine
{
    pub file: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// A traced thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread
{
    pub id: ThreadId,
    /// Raw execution status code reported by the process handle.
    pub status: u32,
    pub current_pc: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_line: Option<SourceLine>,
    /// Selected for thread-relative operations. Exactly one thread carries
    /// this flag while the process is stopped.
    #[serde(default)]
    pub is_current: bool,
}

/// Aggregate process status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process
{
    /// Known source files, sorted.
    pub files: Vec<String>,
    /// Raw exit/stop status code.
    pub status: u32,
    pub exited: bool,
}
