//! Error types for the wire protocol, the server, and the client.

use std::io;

/// Errors that can occur while framing or decoding a message.
///
/// Everything except `Io` and `MessageTooLarge` is recoverable: the offending
/// frame is dropped and the connection carries on.
#[derive(Debug, thiserror::Error)]
pub enum CodecError
{
    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The header section contained invalid UTF-8.
    #[error("invalid UTF-8 in header")]
    InvalidUtf8,

    /// The Content-Length header value could not be parsed as an integer.
    #[error("malformed Content-Length header value")]
    MalformedContentLength,

    /// No Content-Length header was found in the frame.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// The frame body exceeds the configured maximum size.
    #[error("message size {size} exceeds maximum allowed {max}")]
    MessageTooLarge
    {
        size: usize, max: usize
    },

    /// The frame body is not a valid command or event.
    #[error("invalid message body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by [`crate::client::Client`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError
{
    /// The connection to the server could not be established.
    #[error("Failed to connect to {addr}: {source}")]
    Connection
    {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The connection has been closed; no more commands can be sent.
    #[error("Connection closed")]
    Closed,

    /// The event stream of this connection was already handed out.
    #[error("Event stream already taken")]
    EventsTaken,
}

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError
{
    /// The listener could not be started.
    #[error("Failed to listen on {addr}: {source}")]
    Bind
    {
        addr: String,
        #[source]
        source: io::Error,
    },
}
