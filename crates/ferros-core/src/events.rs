//! Debugger event types and the event bus.
//!
//! Front-ends consume these events to follow the target without ever querying
//! the debugger. Every `*Updated` event carries a complete replacement
//! snapshot of its collection, never a delta, so a consumer that missed some
//! events is consistent again as soon as it sees the next one.
//!
//! ## Delivery
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel. Emitting never blocks
//! the debugger: each subscriber owns a bounded buffer, and a subscriber that
//! falls behind loses the oldest events instead of slowing everyone else down.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::types::{Breakpoint, Process, Thread};

/// Informational message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message
{
    pub body: String,
    pub level: i32,
    pub is_error: bool,
}

impl Message
{
    pub const LEVEL_INFO: i32 = 0;
    pub const LEVEL_WARN: i32 = 1;
    pub const LEVEL_ERROR: i32 = 2;

    #[must_use]
    pub fn info(body: impl Into<String>) -> Self
    {
        Self {
            body: body.into(),
            level: Self::LEVEL_INFO,
            is_error: false,
        }
    }

    #[must_use]
    pub fn warning(body: impl Into<String>) -> Self
    {
        Self {
            body: body.into(),
            level: Self::LEVEL_WARN,
            is_error: false,
        }
    }

    #[must_use]
    pub fn error(body: impl Into<String>) -> Self
    {
        Self {
            body: body.into(),
            level: Self::LEVEL_ERROR,
            is_error: true,
        }
    }
}

/// Event emitted by the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebuggerEvent
{
    /// Informational message (command results, errors, lifecycle notes).
    Message(Message),
    /// Full replacement of the user-visible breakpoint collection.
    BreakPointsUpdated
    {
        timestamp: DateTime<Utc>,
        breakpoints: Vec<Breakpoint>,
    },
    /// Full replacement of the thread collection.
    ThreadsUpdated
    {
        timestamp: DateTime<Utc>,
        threads: Vec<Thread>,
    },
    /// New aggregate process status.
    ProcessUpdated
    {
        process: Process
    },
}

impl DebuggerEvent
{
    /// Name of the event kind, as used on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str
    {
        match self {
            Self::Message(_) => "Message",
            Self::BreakPointsUpdated { .. } => "BreakPointsUpdated",
            Self::ThreadsUpdated { .. } => "ThreadsUpdated",
            Self::ProcessUpdated { .. } => "ProcessUpdated",
        }
    }

    #[must_use]
    pub fn breakpoints(breakpoints: Vec<Breakpoint>) -> Self
    {
        Self::BreakPointsUpdated {
            timestamp: Utc::now(),
            breakpoints,
        }
    }

    #[must_use]
    pub fn threads(threads: Vec<Thread>) -> Self
    {
        Self::ThreadsUpdated {
            timestamp: Utc::now(),
            threads,
        }
    }
}

/// Receiver side of the debugger event channel.
pub type EventReceiver = broadcast::Receiver<DebuggerEvent>;

/// Fan-out of debugger events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus
{
    sender: broadcast::Sender<DebuggerEvent>,
}

impl EventBus
{
    /// Create a bus whose subscribers each buffer up to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self
    {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every current subscriber without blocking.
    pub fn emit(&self, event: DebuggerEvent)
    {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => tracing::trace!(event = name, receivers, "Event emitted"),
            Err(_) => tracing::trace!(event = name, "Event emitted with no subscribers"),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> EventReceiver
    {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize
    {
        self.sender.receiver_count()
    }
}

impl Default for EventBus
{
    fn default() -> Self
    {
        Self::new(256)
    }
}
