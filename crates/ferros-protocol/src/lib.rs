//! # ferros-protocol
//!
//! Wire protocol between a Ferros debugger and its front-ends.
//!
//! - [`codec`]: `Content-Length` framing over a byte stream
//! - [`wire`]: the JSON command and event envelopes
//! - [`server`]: serves a [`Debugger`](ferros_core::Debugger) to any number
//!   of clients
//! - [`client`]: fire-and-forget commands plus an event stream
//!
//! ```text
//! Client --commands--> Server --> Debugger
//!   ^                               |
//!   `-----------events--------------'
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod server;
pub mod wire;

pub use client::{Client, EventStream};
pub use error::{ClientError, CodecError, ServerError};
pub use server::Server;
