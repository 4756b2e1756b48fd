//! Debugger behaviour against the simulated target

use std::time::Duration;

use ferros_core::events::EventReceiver;
use ferros_core::platform::sim::{ProgramImage, SimulatedProcess};
use ferros_core::prelude::*;
use tokio_util::sync::CancellationToken;

async fn start() -> (Debugger, EventReceiver)
{
    let image = ProgramImage::demo();
    let debugger = Debugger::start(move || SimulatedProcess::launch(image), EventBus::new(64))
        .await
        .unwrap();
    let events = debugger.subscribe();
    (debugger, events)
}

/// Everything emitted so far.
fn drain(events: &mut EventReceiver) -> Vec<DebuggerEvent>
{
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn names(events: &[DebuggerEvent]) -> Vec<&'static str>
{
    events.iter().map(DebuggerEvent::name).collect()
}

#[tokio::test]
async fn test_breakpoint_ids_are_distinct_and_increasing()
{
    let (debugger, _events) = start().await;

    let mut last = 0;
    for location in ["main.go:10", "main.go:11", "main.add", "helpers.go:5", "main.worker"] {
        let bp = debugger.add_breakpoint(location).await.unwrap();
        assert!(bp.id.raw() > last, "{location} got id {}", bp.id);
        last = bp.id.raw();
    }
    assert_eq!(debugger.breakpoints().await.unwrap().len(), 5);
    debugger.shutdown().await;
}

#[tokio::test]
async fn test_add_breakpoint_emits_message_and_full_snapshot()
{
    let (debugger, mut events) = start().await;

    debugger.add_breakpoint("main.go:12").await.unwrap();
    debugger.add_breakpoint("main.add").await.unwrap();

    let emitted = drain(&mut events);
    assert_eq!(names(&emitted), vec!["Message", "BreakPointsUpdated", "Message", "BreakPointsUpdated"]);
    match &emitted[0] {
        DebuggerEvent::Message(message) => {
            assert_eq!(message.body, "Breakpoint 1 set at 0x401010 for main.main main.go:12");
            assert!(!message.is_error);
        }
        other => panic!("unexpected event {other:?}"),
    }
    match &emitted[3] {
        DebuggerEvent::BreakPointsUpdated { breakpoints, .. } => assert_eq!(breakpoints.len(), 2),
        other => panic!("unexpected event {other:?}"),
    }
    debugger.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_address_is_rejected_without_change()
{
    let (debugger, mut events) = start().await;

    let first = debugger.add_breakpoint("main.go:10").await.unwrap();
    drain(&mut events);

    // Same address, reached through the function name.
    let err = debugger.add_breakpoint("main.main").await.unwrap_err();
    match err {
        FerrosError::DuplicateAddress { address, existing } => {
            assert_eq!(address, Address::new(0x40_1000));
            assert_eq!(existing, first.id);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(debugger.breakpoints().await.unwrap(), vec![first]);
    assert!(drain(&mut events).is_empty());
    debugger.shutdown().await;
}

#[tokio::test]
async fn test_unresolvable_location()
{
    let (debugger, _events) = start().await;
    let err = debugger
        .handle(Command::AddBreakPoint {
            location: "main.go:999".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FerrosError::Resolution(_)));
    debugger.shutdown().await;
}

#[tokio::test]
async fn test_clear_breakpoints_leaves_empty_snapshot()
{
    let (debugger, mut events) = start().await;
    debugger.add_breakpoint("main.go:11").await.unwrap();
    debugger.add_breakpoint("main.add").await.unwrap();
    drain(&mut events);

    debugger.handle(Command::ClearBreakPoints).await.unwrap();

    assert!(debugger.breakpoints().await.unwrap().is_empty());
    let emitted = drain(&mut events);
    match emitted.last() {
        Some(DebuggerEvent::BreakPointsUpdated { breakpoints, .. }) => assert!(breakpoints.is_empty()),
        other => panic!("unexpected event {other:?}"),
    }
    debugger.shutdown().await;
}

#[tokio::test]
async fn test_clear_by_address()
{
    let (debugger, _events) = start().await;
    let bp = debugger.add_breakpoint("main.go:13").await.unwrap();

    let err = debugger.clear(Address::new(0xdead)).await.unwrap_err();
    assert!(matches!(err, FerrosError::NotFound(_)));

    let cleared = debugger.clear(bp.addr).await.unwrap();
    assert_eq!(cleared.id, bp.id);
    assert!(debugger.breakpoints().await.unwrap().is_empty());

    // Identifiers are not reused after a clear.
    let again = debugger.add_breakpoint("main.go:13").await.unwrap();
    assert!(again.id > bp.id);
    debugger.shutdown().await;
}

#[tokio::test]
async fn test_continue_stops_at_breakpoint_with_source_line()
{
    let (debugger, mut events) = start().await;
    debugger.add_breakpoint("main.add").await.unwrap();
    drain(&mut events);

    debugger.handle(Command::Continue).await.unwrap();
    assert_eq!(debugger.state().await.unwrap(), ProcessState::Stopped);

    let threads = debugger.threads().await.unwrap();
    let current: Vec<_> = threads.iter().filter(|t| t.is_current).collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].current_pc, Address::new(0x40_2000));
    assert_eq!(current[0].current_line.as_ref().map(|l| l.line), Some(3));

    let emitted = drain(&mut events);
    assert_eq!(names(&emitted), vec!["Message", "ThreadsUpdated", "ProcessUpdated"]);
    debugger.shutdown().await;
}

#[tokio::test]
async fn test_next_steps_over_the_call()
{
    let (debugger, _events) = start().await;
    debugger.add_breakpoint("main.go:12").await.unwrap();
    debugger.continue_execution().await.unwrap();

    debugger.handle(Command::Next).await.unwrap();

    let threads = debugger.threads().await.unwrap();
    let current = threads.iter().find(|t| t.is_current).unwrap();
    assert_eq!(current.current_line.as_ref().map(|l| l.line), Some(13));
    debugger.shutdown().await;
}

#[tokio::test]
async fn test_resume_after_exit_is_a_no_op()
{
    let (debugger, mut events) = start().await;

    debugger.continue_execution().await.unwrap();
    assert_eq!(debugger.state().await.unwrap(), ProcessState::Exited(0));
    let process = debugger.process().await.unwrap();
    assert!(process.exited);
    drain(&mut events);

    for command in [Command::Continue, Command::Step, Command::Next] {
        debugger.handle(command).await.unwrap();
    }
    assert_eq!(debugger.state().await.unwrap(), ProcessState::Exited(0));
    assert!(drain(&mut events).is_empty());
    debugger.shutdown().await;
}

#[tokio::test]
async fn test_switch_thread()
{
    let (debugger, _events) = start().await;

    let err = debugger.switch_thread(ThreadId(42)).await.unwrap_err();
    assert!(matches!(err, FerrosError::UnknownThread(ThreadId(42))));
    let current = debugger.threads().await.unwrap().into_iter().find(|t| t.is_current).unwrap();
    assert_eq!(current.id, ThreadId(1));

    debugger.handle(Command::SwitchThread { id: ThreadId(2) }).await.unwrap();
    let threads = debugger.threads().await.unwrap();
    assert_eq!(threads.iter().filter(|t| t.is_current).count(), 1);
    assert!(threads.iter().any(|t| t.id == ThreadId(2) && t.is_current));
    debugger.shutdown().await;
}

#[tokio::test]
async fn test_kill_is_idempotent()
{
    let (debugger, mut events) = start().await;

    debugger.handle(Command::Kill).await.unwrap();
    debugger.handle(Command::Kill).await.unwrap();

    assert_eq!(debugger.state().await.unwrap(), ProcessState::Exited(137));
    let exits = drain(&mut events)
        .into_iter()
        .filter(|event| matches!(event, DebuggerEvent::ProcessUpdated { process } if process.exited))
        .count();
    assert_eq!(exits, 1);

    let err = debugger.add_breakpoint("main.go:10").await.unwrap_err();
    assert!(err.is_process_exited());
    debugger.shutdown().await;
}

#[tokio::test]
async fn test_detach_then_resync_observes_exit()
{
    let (debugger, _events) = start().await;
    debugger.add_breakpoint("main.go:10").await.unwrap();

    debugger.handle(Command::Detach).await.unwrap();
    assert_eq!(debugger.state().await.unwrap(), ProcessState::Detached);
    assert!(debugger.breakpoints().await.unwrap().is_empty());
    debugger.handle(Command::Detach).await.unwrap();

    debugger.resync().await.unwrap();
    assert_eq!(debugger.state().await.unwrap(), ProcessState::Exited(0));
    debugger.shutdown().await;
}

#[tokio::test]
async fn test_resync_emits_all_three_snapshots_unconditionally()
{
    let (debugger, mut events) = start().await;

    debugger.resync().await.unwrap();
    debugger.resync().await.unwrap();

    let emitted = drain(&mut events);
    assert_eq!(
        names(&emitted),
        vec![
            "BreakPointsUpdated",
            "ThreadsUpdated",
            "ProcessUpdated",
            "BreakPointsUpdated",
            "ThreadsUpdated",
            "ProcessUpdated"
        ]
    );
    match &emitted[2] {
        DebuggerEvent::ProcessUpdated { process } => {
            assert_eq!(process.files, vec!["helpers.go", "main.go"]);
            assert!(!process.exited);
        }
        other => panic!("unexpected event {other:?}"),
    }
    debugger.shutdown().await;
}

#[tokio::test]
async fn test_resync_task_ticks_until_cancelled()
{
    let (debugger, mut events) = start().await;
    let cancel = CancellationToken::new();
    let task = spawn_resync(debugger.clone(), Duration::from_millis(10), cancel.clone());

    let first = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
    assert_eq!(first.name(), "BreakPointsUpdated");

    cancel.cancel();
    task.await.unwrap();
    debugger.shutdown().await;
}

#[tokio::test]
async fn test_commands_after_shutdown_fail()
{
    let (debugger, _events) = start().await;
    debugger.shutdown().await;
    let err = debugger.handle(Command::Continue).await.unwrap_err();
    assert!(matches!(err, FerrosError::OwnerStopped));
}
