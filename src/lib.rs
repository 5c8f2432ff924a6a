//! Async client for the MPD (Music Player Daemon) text protocol.
//!
//! Protocol reference: https://www.musicpd.org/doc/protocol/
//!
//! Architecture:
//! - `protocol.rs` - command line formatting and response block decoders
//! - `transport.rs` - buffered line transport over a byte stream
//! - `client.rs` - connection handle exposing the command vocabulary
//! - `error.rs` - error taxonomy
//!
//! ```no_run
//! # async fn demo() -> Result<(), mpdc::MpdError> {
//! let client = mpdc::Client::connect("127.0.0.1:6600").await?;
//! let status = client.status().await?;
//! println!("state: {:?}", status.get("state"));
//! client.close().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod protocol;
mod transport;

pub use client::Client;
pub use error::MpdError;
pub use protocol::Attrs;
