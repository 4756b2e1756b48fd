//! Client side of the wire protocol.
//!
//! Commands are fire-and-forget: each method queues one frame for the
//! writer task and returns immediately. Their effects, failures included,
//! arrive later on the [`EventStream`].

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use ferros_core::command::Command;
use ferros_core::events::DebuggerEvent;
use ferros_core::types::{Address, ThreadId};
use futures::{SinkExt, Stream, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::codec::FrameCodec;
use crate::error::{ClientError, CodecError};
use crate::wire::{decode_event, encode_command};

/// Connection to a Transport Server.
pub struct Client
{
    peer: SocketAddr,
    commands: mpsc::UnboundedSender<Command>,
    events: Option<EventStream>,
    cancel: CancellationToken,
}

impl Client
{
    /// Connect to the server at `addr`.
    ///
    /// ## Errors
    ///
    /// - `Connection`: the server could not be reached
    pub async fn open(addr: &str) -> Result<Self, ClientError>
    {
        let stream = TcpStream::connect(addr).await.map_err(|source| ClientError::Connection {
            addr: addr.to_string(),
            source,
        })?;
        let peer = stream.peer_addr().map_err(|source| ClientError::Connection {
            addr: addr.to_string(),
            source,
        })?;
        tracing::info!(%peer, "Connected to debugger");

        let (read, write) = stream.into_split();
        let cancel = CancellationToken::new();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_commands(
            FramedWrite::new(write, FrameCodec::new()),
            commands_rx,
            cancel.clone(),
        ));
        tokio::spawn(read_events(FramedRead::new(read, FrameCodec::new()), events_tx, cancel.clone()));

        Ok(Self {
            peer,
            commands: commands_tx,
            events: Some(EventStream { inner: events_rx }),
            cancel,
        })
    }

    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr
    {
        self.peer
    }

    /// Take the event stream of this connection. It ends when the connection
    /// closes; reconnect to get a new one.
    ///
    /// ## Errors
    ///
    /// - `EventsTaken`: the stream was already taken
    pub fn events(&mut self) -> Result<EventStream, ClientError>
    {
        self.events.take().ok_or(ClientError::EventsTaken)
    }

    /// Queue `command` for sending.
    ///
    /// ## Errors
    ///
    /// - `Closed`: the connection is gone
    pub fn send(&self, command: Command) -> Result<(), ClientError>
    {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }
        self.commands.send(command).map_err(|_| ClientError::Closed)
    }

    pub fn add_breakpoint(&self, location: impl Into<String>) -> Result<(), ClientError>
    {
        self.send(Command::AddBreakPoint {
            location: location.into(),
        })
    }

    pub fn clear_breakpoints(&self) -> Result<(), ClientError>
    {
        self.send(Command::ClearBreakPoints)
    }

    /// Clear the breakpoint at exactly `address`.
    pub fn clear(&self, address: Address) -> Result<(), ClientError>
    {
        self.send(Command::Clear { address })
    }

    pub fn detach(&self) -> Result<(), ClientError>
    {
        self.send(Command::Detach)
    }

    pub fn kill(&self) -> Result<(), ClientError>
    {
        self.send(Command::Kill)
    }

    pub fn continue_execution(&self) -> Result<(), ClientError>
    {
        self.send(Command::Continue)
    }

    pub fn step(&self) -> Result<(), ClientError>
    {
        self.send(Command::Step)
    }

    /// Step over calls.
    pub fn next(&self) -> Result<(), ClientError>
    {
        self.send(Command::Next)
    }

    pub fn switch_thread(&self, id: ThreadId) -> Result<(), ClientError>
    {
        self.send(Command::SwitchThread { id })
    }

    /// Close the connection. Queued commands that were not written yet are
    /// dropped, and the event stream ends.
    pub fn close(&self)
    {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool
    {
        self.cancel.is_cancelled()
    }
}

impl Drop for Client
{
    fn drop(&mut self)
    {
        self.cancel.cancel();
    }
}

/// Decoded events from one connection, in arrival order.
///
/// Unbounded: the reader task never waits for the consumer.
#[derive(Debug)]
pub struct EventStream
{
    inner: mpsc::UnboundedReceiver<DebuggerEvent>,
}

impl EventStream
{
    /// The next event, or `None` once the connection has closed.
    pub async fn recv(&mut self) -> Option<DebuggerEvent>
    {
        self.inner.recv().await
    }
}

impl Stream for EventStream
{
    type Item = DebuggerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>>
    {
        self.inner.poll_recv(cx)
    }
}

async fn write_commands(
    mut sink: FramedWrite<OwnedWriteHalf, FrameCodec>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
)
{
    loop {
        let command = tokio::select! {
            () = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        let name = command.name();
        if let Err(err) = send_command(&mut sink, command).await {
            tracing::warn!(command = name, "Failed to send command: {err}");
            cancel.cancel();
            break;
        }
        tracing::trace!(command = name, "Command sent");
    }
}

async fn send_command(sink: &mut FramedWrite<OwnedWriteHalf, FrameCodec>, command: Command) -> Result<(), CodecError>
{
    sink.send(encode_command(command)?).await
}

async fn read_events(
    mut frames: FramedRead<OwnedReadHalf, FrameCodec>,
    events: mpsc::UnboundedSender<DebuggerEvent>,
    cancel: CancellationToken,
)
{
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = frames.next() => frame,
        };

        match frame {
            None => {
                tracing::info!("Server closed the connection");
                break;
            }
            Some(Err(err)) => {
                tracing::warn!("Connection lost: {err}");
                break;
            }
            Some(Ok(Err(err))) => tracing::warn!("Dropping malformed frame: {err}"),
            Some(Ok(Ok(body))) => match decode_event(&body) {
                Ok(event) => {
                    if events.send(event).is_err() {
                        // Nobody is listening any more.
                        break;
                    }
                }
                Err(err) => tracing::warn!("Dropping undecodable event: {err}"),
            },
        }
    }
    cancel.cancel();
}
