//! Client-side view of the debugger.
//!
//! The cache is fed only by events. [`CacheWriter`] is deliberately not
//! `Clone`: the event-consuming task owns the single writer, and everything
//! else reads snapshots through a [`CacheReader`]. Each `*Updated` event
//! replaces its collection wholesale.

use ferros_core::events::{DebuggerEvent, Message};
use ferros_core::types::{Address, Breakpoint, Process, Thread};
use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cache
{
    pub process: Process,
    pub breakpoints: Vec<Breakpoint>,
    pub threads: Vec<Thread>,
}

impl Cache
{
    #[must_use]
    pub fn current_thread(&self) -> Option<&Thread>
    {
        self.threads.iter().find(|thread| thread.is_current)
    }

    /// Program counter of the current thread, if one is known.
    #[must_use]
    pub fn current_pc(&self) -> Option<Address>
    {
        self.current_thread().map(|thread| thread.current_pc)
    }
}

/// The one handle allowed to change the cache.
#[derive(Debug)]
pub struct CacheWriter
{
    sender: watch::Sender<Cache>,
}

pub type CacheReader = watch::Receiver<Cache>;

/// Create an empty cache.
#[must_use]
pub fn channel() -> (CacheWriter, CacheReader)
{
    let (sender, receiver) = watch::channel(Cache::default());
    (CacheWriter { sender }, receiver)
}

impl CacheWriter
{
    /// Fold one event into the cache. `Message` events leave the cache alone
    /// and are handed back for display.
    pub fn apply(&self, event: DebuggerEvent) -> Option<Message>
    {
        match event {
            DebuggerEvent::Message(message) => return Some(message),
            DebuggerEvent::BreakPointsUpdated { breakpoints, .. } => {
                self.sender.send_modify(|cache| cache.breakpoints = breakpoints);
            }
            DebuggerEvent::ThreadsUpdated { threads, .. } => {
                self.sender.send_modify(|cache| cache.threads = threads);
            }
            DebuggerEvent::ProcessUpdated { process } => {
                self.sender.send_modify(|cache| cache.process = process);
            }
        }
        None
    }

    #[must_use]
    pub fn subscribe(&self) -> CacheReader
    {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests
{
    use ferros_core::breakpoints::BreakpointId;
    use ferros_core::types::ThreadId;

    use super::*;

    fn breakpoint(id: u64) -> Breakpoint
    {
        Breakpoint {
            id: BreakpointId::from_raw(id),
            function_name: None,
            file: "main.go".into(),
            line: 10,
            addr: Address::new(0x1000 + id),
            temporary: false,
        }
    }

    fn thread(id: u64, current: bool) -> Thread
    {
        Thread {
            id: ThreadId(id),
            status: 0,
            current_pc: Address::new(0x2000 + id),
            current_line: None,
            is_current: current,
        }
    }

    #[test]
    fn test_snapshots_replace_collections()
    {
        let (writer, reader) = channel();

        writer.apply(DebuggerEvent::breakpoints(vec![breakpoint(1), breakpoint(2)]));
        writer.apply(DebuggerEvent::breakpoints(vec![breakpoint(3)]));
        assert_eq!(reader.borrow().breakpoints, vec![breakpoint(3)]);

        writer.apply(DebuggerEvent::threads(vec![thread(1, false), thread(2, true)]));
        assert_eq!(reader.borrow().current_pc(), Some(Address::new(0x2002)));

        writer.apply(DebuggerEvent::ProcessUpdated {
            process: Process {
                files: vec![],
                status: 9,
                exited: true,
            },
        });
        assert!(reader.borrow().process.exited);
        // Other collections are untouched by a process update.
        assert_eq!(reader.borrow().breakpoints.len(), 1);
    }

    #[test]
    fn test_messages_are_returned_not_stored()
    {
        let (writer, reader) = channel();
        let message = writer.apply(DebuggerEvent::Message(Message::info("hello")));
        assert_eq!(message.map(|m| m.body), Some("hello".to_string()));
        assert_eq!(*reader.borrow(), Cache::default());
    }

    #[tokio::test]
    async fn test_readers_are_woken_by_updates()
    {
        let (writer, mut reader) = channel();
        let task = tokio::spawn(async move {
            reader.changed().await.unwrap();
            reader.borrow().process.exited
        });

        writer.apply(DebuggerEvent::ProcessUpdated {
            process: Process {
                files: vec![],
                status: 0,
                exited: true,
            },
        });
        assert!(task.await.unwrap());
    }
}
