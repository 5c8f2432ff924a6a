//! Buffered line transport over a byte stream.
//!
//! MPD frames everything as newline-terminated text lines, so this is the
//! only I/O primitive the client needs: write one line, read one line.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::MpdError;

/// Byte stream the transport can run over (TCP in production, an in-memory
/// duplex pipe in tests).
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<S: AsyncRead + AsyncWrite + Send + Unpin> Connection for S {}

/// Newline-terminated line reader/writer over an owned stream.
pub struct LineStream {
  stream: BufReader<Box<dyn Connection>>,
  line: String,
}

impl LineStream {
  pub fn new<S: Connection + 'static>(stream: S) -> Self {
    Self {
      stream: BufReader::new(Box::new(stream)),
      line: String::new(),
    }
  }

  /// Read one line, without its trailing newline.
  ///
  /// End-of-stream is a peer disconnect, never a valid way to end a
  /// response block.
  pub async fn read_line(&mut self) -> Result<&str, MpdError> {
    self.line.clear();
    let n = self.stream.read_line(&mut self.line).await?;
    if n == 0 {
      log::debug!("peer closed the connection");
      return Err(MpdError::Disconnected);
    }
    Ok(self.line.trim_end_matches(['\r', '\n']))
  }

  /// Write one line and flush it.
  pub async fn write_line(&mut self, line: &str) -> Result<(), MpdError> {
    self.stream.write_all(line.as_bytes()).await?;
    self.stream.write_all(b"\n").await?;
    self.stream.flush().await?;
    Ok(())
  }
}
