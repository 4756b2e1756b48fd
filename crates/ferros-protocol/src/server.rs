//! Transport Server.
//!
//! Every accepted connection gets two loops:
//!
//! - **inbound** decodes command frames one at a time and runs them against
//!   the [`Debugger`] in arrival order. A frame that cannot be decoded is
//!   logged and dropped. A command that fails is answered with a `Message`
//!   event sent to that connection only.
//! - **outbound** forwards every debugger event (plus the direct replies) to
//!   the socket. A write failure ends this connection's outbound loop and
//!   nothing else.
//!
//! The server keeps no session state beyond those two loops.

use std::io;
use std::net::SocketAddr;

use ferros_core::error::FerrosError;
use ferros_core::events::{DebuggerEvent, EventReceiver, Message};
use ferros_core::Debugger;
use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::codec::FrameCodec;
use crate::error::{CodecError, ServerError};
use crate::wire::{decode_command, encode_event};

/// Listener serving one [`Debugger`] to any number of clients.
pub struct Server
{
    listener: TcpListener,
    debugger: Debugger,
}

impl Server
{
    /// Start listening on `addr`.
    ///
    /// ## Errors
    ///
    /// - `Bind`: the address is invalid or already in use
    pub async fn bind(addr: &str, debugger: Debugger) -> Result<Self, ServerError>
    {
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        tracing::info!(addr = %addr, "Listening for clients");
        Ok(Self { listener, debugger })
    }

    /// The address actually bound, useful after binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr>
    {
        self.listener.local_addr()
    }

    /// Accept connections until `cancel` fires. Cancelling also closes every
    /// open connection.
    pub async fn run(self, cancel: CancellationToken)
    {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_connection(
                            stream,
                            peer,
                            self.debugger.clone(),
                            cancel.child_token(),
                        ));
                    }
                    Err(err) => tracing::warn!("Failed to accept connection: {err}"),
                },
            }
        }
        tracing::info!("Server stopped accepting connections");
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, debugger: Debugger, cancel: CancellationToken)
{
    tracing::info!(%peer, "Client connected");

    // Subscribe before reading any command so no event it causes is missed.
    let events = debugger.subscribe();
    let (read, write) = stream.into_split();
    let (replies_tx, replies_rx) = mpsc::unbounded_channel();

    let outbound = tokio::spawn(write_events(
        FramedWrite::new(write, FrameCodec::new()),
        events,
        replies_rx,
        cancel.clone(),
        peer,
    ));

    read_commands(FramedRead::new(read, FrameCodec::new()), &debugger, &replies_tx, &cancel, peer).await;

    cancel.cancel();
    if let Err(err) = outbound.await {
        tracing::warn!(%peer, "Outbound task failed: {err}");
    }
    tracing::info!(%peer, "Client disconnected");
}

async fn read_commands(
    mut frames: FramedRead<OwnedReadHalf, FrameCodec>,
    debugger: &Debugger,
    replies: &mpsc::UnboundedSender<DebuggerEvent>,
    cancel: &CancellationToken,
    peer: SocketAddr,
)
{
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = frames.next() => frame,
        };

        let body = match frame {
            None => break,
            Some(Err(err)) => {
                tracing::debug!(%peer, "Inbound stream ended: {err}");
                break;
            }
            Some(Ok(Err(err))) => {
                tracing::warn!(%peer, "Dropping malformed frame: {err}");
                continue;
            }
            Some(Ok(Ok(body))) => body,
        };

        let command = match decode_command(&body) {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!(%peer, "Dropping undecodable command: {err}");
                continue;
            }
        };

        let name = command.name();
        if let Err(err) = debugger.handle(command).await {
            tracing::warn!(%peer, command = name, "Command failed: {err}");
            if replies.send(DebuggerEvent::Message(failure_message(&err))).is_err() {
                break;
            }
        }
    }
}

/// The message reported back to the client whose command failed.
fn failure_message(err: &FerrosError) -> Message
{
    if err.is_process_exited() {
        Message::warning(err.to_string())
    } else {
        Message::error(err.to_string())
    }
}

async fn write_events(
    mut sink: FramedWrite<OwnedWriteHalf, FrameCodec>,
    mut events: EventReceiver,
    mut replies: mpsc::UnboundedReceiver<DebuggerEvent>,
    cancel: CancellationToken,
    peer: SocketAddr,
)
{
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            reply = replies.recv() => match reply {
                Some(event) => event,
                None => break,
            },
            received = events.recv() => match received {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%peer, skipped, "Client fell behind, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };

        if let Err(err) = send_event(&mut sink, event).await {
            tracing::warn!(%peer, "Failed to deliver event: {err}");
            break;
        }
    }
}

async fn send_event(sink: &mut FramedWrite<OwnedWriteHalf, FrameCodec>, event: DebuggerEvent)
    -> Result<(), CodecError>
{
    sink.send(encode_event(event)?).await
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_failure_message_levels()
    {
        let exited = failure_message(&FerrosError::ProcessExited { status: 0 });
        assert_eq!(exited.body, "Process exited with status 0");
        assert!(!exited.is_error);
        assert_eq!(exited.level, Message::LEVEL_WARN);

        let unknown = failure_message(&FerrosError::UnknownThread(ferros_core::ThreadId(9)));
        assert!(unknown.is_error);
    }
}
