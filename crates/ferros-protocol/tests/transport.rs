//! Client and server talking over a real socket

use std::time::Duration;

use bytes::Bytes;
use ferros_core::events::{DebuggerEvent, EventBus};
use ferros_core::platform::sim::{ProgramImage, SimulatedProcess};
use ferros_core::{spawn_resync, Debugger};
use ferros_protocol::codec::FrameCodec;
use ferros_protocol::wire::decode_event;
use ferros_protocol::{Client, ClientError, EventStream, Server};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

struct Harness
{
    addr: String,
    debugger: Debugger,
    cancel: CancellationToken,
}

impl Harness
{
    async fn start(resync: Option<Duration>) -> Self
    {
        let image = ProgramImage::demo();
        let debugger = Debugger::start(move || SimulatedProcess::launch(image), EventBus::new(256))
            .await
            .unwrap();
        let server = Server::bind("127.0.0.1:0", debugger.clone()).await.unwrap();
        let addr = server.local_addr().unwrap().to_string();

        let cancel = CancellationToken::new();
        tokio::spawn(server.run(cancel.clone()));
        if let Some(period) = resync {
            spawn_resync(debugger.clone(), period, cancel.clone());
        }

        Self { addr, debugger, cancel }
    }

    async fn stop(self)
    {
        self.cancel.cancel();
        self.debugger.shutdown().await;
    }
}

/// Wait for the first event matching `pred`.
async fn wait_for<F>(events: &mut EventStream, mut pred: F) -> DebuggerEvent
where
    F: FnMut(&DebuggerEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event stream ended");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_add_breakpoint_reaches_client_snapshot()
{
    let harness = Harness::start(Some(Duration::from_millis(50))).await;
    let mut client = Client::open(&harness.addr).await.unwrap();
    let mut events = client.events().unwrap();

    client.add_breakpoint("main.go:10").unwrap();

    let event = wait_for(&mut events, |event| {
        matches!(event, DebuggerEvent::BreakPointsUpdated { breakpoints, .. } if !breakpoints.is_empty())
    })
    .await;
    let DebuggerEvent::BreakPointsUpdated { breakpoints, .. } = event else {
        unreachable!()
    };
    assert_eq!(breakpoints.len(), 1);
    assert_eq!(breakpoints[0].file, "main.go");
    assert_eq!(breakpoints[0].line, 10);
    assert_eq!(breakpoints[0].id.raw(), 1);

    client.close();
    harness.stop().await;
}

#[tokio::test]
async fn test_kill_is_observed_by_every_client()
{
    let harness = Harness::start(Some(Duration::from_millis(50))).await;
    let mut first = Client::open(&harness.addr).await.unwrap();
    let mut second = Client::open(&harness.addr).await.unwrap();
    let mut first_events = first.events().unwrap();
    let mut second_events = second.events().unwrap();

    // A resync snapshot proves both connections are subscribed.
    wait_for(&mut first_events, |_| true).await;
    wait_for(&mut second_events, |_| true).await;

    first.kill().unwrap();

    for events in [&mut first_events, &mut second_events] {
        wait_for(events, |event| {
            matches!(event, DebuggerEvent::ProcessUpdated { process } if process.exited)
        })
        .await;
    }
    harness.stop().await;
}

#[tokio::test]
async fn test_failed_command_is_reported_as_message()
{
    let harness = Harness::start(None).await;
    let mut client = Client::open(&harness.addr).await.unwrap();
    let mut events = client.events().unwrap();

    client.add_breakpoint("nowhere.go:1").unwrap();

    let event = wait_for(&mut events, |event| matches!(event, DebuggerEvent::Message(_))).await;
    let DebuggerEvent::Message(message) = event else {
        unreachable!()
    };
    assert!(message.is_error);
    assert!(message.body.contains("nowhere.go:1"));
    harness.stop().await;
}

#[tokio::test]
async fn test_malformed_frames_do_not_end_the_connection()
{
    let harness = Harness::start(None).await;
    let stream = TcpStream::connect(&harness.addr).await.unwrap();
    let (read, write) = stream.into_split();
    let mut sink = FramedWrite::new(write, FrameCodec::new());
    let mut frames = FramedRead::new(read, FrameCodec::new());

    sink.send(Bytes::from_static(b"not json")).await.unwrap();
    sink.send(Bytes::from_static(br#"{"name":"Halt","halt":{}}"#)).await.unwrap();
    sink.send(Bytes::from_static(br#"{"name":"AddBreakPoint","addBreakPoint":{"location":"main.add"}}"#))
        .await
        .unwrap();

    let body = tokio::time::timeout(WAIT, frames.next()).await.unwrap().unwrap().unwrap().unwrap();
    match decode_event(&body).unwrap() {
        DebuggerEvent::Message(message) => {
            assert_eq!(message.body, "Breakpoint 1 set at 0x402000 for main.add helpers.go:3");
        }
        other => panic!("unexpected event {other:?}"),
    }
    harness.stop().await;
}

#[tokio::test]
async fn test_event_stream_ends_when_server_stops()
{
    let harness = Harness::start(None).await;
    let mut client = Client::open(&harness.addr).await.unwrap();
    let mut events = client.events().unwrap();

    // Round trip once so the connection is being served.
    client.add_breakpoint("main.go:11").unwrap();
    wait_for(&mut events, |_| true).await;

    harness.stop().await;

    let end = tokio::time::timeout(WAIT, async {
        while events.recv().await.is_some() {}
    })
    .await;
    assert!(end.is_ok());
}

#[tokio::test]
async fn test_events_can_only_be_taken_once()
{
    let harness = Harness::start(None).await;
    let mut client = Client::open(&harness.addr).await.unwrap();

    assert!(client.events().is_ok());
    assert!(matches!(client.events(), Err(ClientError::EventsTaken)));

    client.close();
    assert!(matches!(client.step(), Err(ClientError::Closed)));
    harness.stop().await;
}

#[tokio::test]
async fn test_connection_error_when_nothing_listens()
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    match Client::open(&addr).await {
        Err(ClientError::Connection { addr: reported, .. }) => assert_eq!(reported, addr),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("connected to a closed port"),
    }
}
