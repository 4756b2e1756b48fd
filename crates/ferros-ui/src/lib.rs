//! # ferros-ui
//!
//! Line-oriented terminal front-end for the Ferros debugger.
//!
//! The terminal talks to a debugger only through a
//! [`ferros_protocol::Client`]. It keeps a local [`cache::Cache`] that is
//! updated solely from events, and reads the cache to validate and describe
//! commands before sending them.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ferros_protocol::Client;
//! use ferros_ui::{Terminal, TerminalOptions};
//! use ferros_utils::FerrosConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FerrosConfig::default();
//! let client = Client::open("127.0.0.1:4711").await?;
//! Terminal::new(client, TerminalOptions::from(&config)).run().await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod commands;
pub mod error;
pub mod terminal;

pub use cache::{Cache, CacheReader, CacheWriter};
pub use commands::{Commander, Commands, Context, Outcome};
pub use error::{TerminalError, TerminalResult};
pub use terminal::{wait_for_exit, Terminal, TerminalOptions, WaitOutcome};
