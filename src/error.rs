//! MPD client error types.

use thiserror::Error;

/// Errors that can occur when talking to an MPD server.
#[derive(Debug, Error)]
pub enum MpdError {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Connection closed by server")]
  Disconnected,

  #[error("Invalid server greeting: {0}")]
  Handshake(String),

  /// The server rejected the command with an `ACK` line. The message is
  /// passed through verbatim, including MPD's `[code@index] {command}`
  /// prefix when present. The connection remains usable.
  #[error("Server rejected command: {0}")]
  Ack(String),

  /// The response did not match the protocol grammar. The connection is
  /// left open, but the stream may be desynchronized.
  #[error("Malformed response: {0}")]
  Malformed(String),

  #[error("Invalid argument: {0}")]
  Validation(String),

  /// A successful response lacked an expected field, or a field could not
  /// be converted to the expected type.
  #[error("Unexpected response shape: {0}")]
  Shape(String),

  #[error("Connection is closed")]
  Closed,
}

impl MpdError {
  /// Whether this error leaves the connection unusable.
  ///
  /// Transport failures and peer disconnects are fatal; protocol-level
  /// rejections and caller mistakes are not.
  pub fn is_fatal(&self) -> bool {
    matches!(self, MpdError::Io(_) | MpdError::Disconnected)
  }
}
