//! High-level MPD client with command methods.
//!
//! One [`Client`] owns one connection. The protocol is strictly half-duplex
//! request/response with no pipelining, so every command holds the session
//! lock from the moment its line is written until its whole response block
//! has been drained.

use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;

use crate::error::MpdError;
use crate::protocol::{Attrs, AttrsDecoder, Command, Decode, OkDecoder, PlaylistDecoder};
use crate::transport::LineStream;

/// Server greeting prefix sent immediately after connect.
const GREETING_PREFIX: &str = "OK MPD";

/// Connection handle to an MPD server.
///
/// Commands are serialized internally; sharing one client between tasks is
/// safe but calls queue behind each other. Independent clients run fully in
/// parallel.
pub struct Client {
  /// `None` once closed. Closing is terminal.
  conn: Mutex<Option<LineStream>>,
  version: String,
}

impl std::fmt::Debug for Client {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Client").field("version", &self.version).finish_non_exhaustive()
  }
}

impl Client {
  /// Connect to MPD at `addr` (e.g. `"127.0.0.1:6600"`) and validate the
  /// server greeting.
  pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, MpdError> {
    let stream = TcpStream::connect(addr).await?;
    Self::handshake(LineStream::new(stream)).await
  }

  /// Run the greeting handshake over an established stream. On failure the
  /// stream is dropped; no client value exists without a valid greeting.
  pub(crate) async fn handshake(mut conn: LineStream) -> Result<Self, MpdError> {
    let line = conn.read_line().await?;
    let version = match line.strip_prefix(GREETING_PREFIX) {
      Some(rest) => rest.trim().to_string(),
      None => {
        return Err(MpdError::Handshake(format!("no greeting: {:?}", line)));
      }
    };
    log::debug!("connected to MPD, protocol version {}", version);
    Ok(Self {
      conn: Mutex::new(Some(conn)),
      version,
    })
  }

  /// Protocol version announced in the server greeting.
  pub fn protocol_version(&self) -> &str {
    &self.version
  }

  /// Write one command and drain exactly its response block.
  ///
  /// The lock is held for the whole cycle, so a second command cannot be
  /// written while a response is still being read. A transport error drops
  /// the connection; protocol-level errors leave it open.
  async fn exchange<D: Decode>(&self, cmd: Command, mut decoder: D) -> Result<D::Output, MpdError> {
    let mut guard = self.conn.lock().await;
    let conn = guard.as_mut().ok_or(MpdError::Closed)?;
    let result = Self::run(conn, &cmd, &mut decoder).await;
    if let Err(err) = &result {
      if err.is_fatal() {
        log::warn!("dropping connection after transport error: {}", err);
        *guard = None;
      }
    }
    result
  }

  async fn run<D: Decode>(
    conn: &mut LineStream,
    cmd: &Command,
    decoder: &mut D,
  ) -> Result<D::Output, MpdError> {
    log::trace!("-> {}", cmd.as_line());
    conn.write_line(cmd.as_line()).await?;
    loop {
      let line = conn.read_line().await?;
      if let Some(output) = decoder.feed(line)? {
        return Ok(output);
      }
    }
  }

  /// Issue a command whose success response has no body.
  async fn command_ok(&self, cmd: Command) -> Result<(), MpdError> {
    self.exchange(cmd, OkDecoder).await
  }

  /// No-op command, useful for keeping the connection alive.
  pub async fn ping(&self) -> Result<(), MpdError> {
    self.command_ok(Command::ping()).await
  }

  /// Attributes of the song currently playing.
  pub async fn current_song(&self) -> Result<Attrs, MpdError> {
    self.exchange(Command::current_song(), AttrsDecoder::new()).await
  }

  /// Current player status (state, volume, song position, ...).
  pub async fn status(&self) -> Result<Attrs, MpdError> {
    self.exchange(Command::status(), AttrsDecoder::new()).await
  }

  /// Start playback at playlist position `pos`, or resume at the current
  /// position when `pos` is `None`.
  pub async fn play(&self, pos: Option<u32>) -> Result<(), MpdError> {
    self.command_ok(Command::play(pos)).await
  }

  /// Like [`Client::play`], but identifying the song by id.
  pub async fn play_id(&self, id: Option<u32>) -> Result<(), MpdError> {
    self.command_ok(Command::play_id(id)).await
  }

  /// Pause playback if `paused` is true; resume otherwise.
  pub async fn pause(&self, paused: bool) -> Result<(), MpdError> {
    self.command_ok(Command::pause(paused)).await
  }

  pub async fn stop(&self) -> Result<(), MpdError> {
    self.command_ok(Command::stop()).await
  }

  /// Play the next song in the playlist.
  pub async fn next(&self) -> Result<(), MpdError> {
    self.command_ok(Command::next()).await
  }

  /// Play the previous song in the playlist.
  pub async fn previous(&self) -> Result<(), MpdError> {
    self.command_ok(Command::previous()).await
  }

  /// Seek to `time` seconds within the song at playlist position `pos`.
  pub async fn seek(&self, pos: u32, time: u32) -> Result<(), MpdError> {
    self.command_ok(Command::seek(pos, time)).await
  }

  /// Like [`Client::seek`], but identifying the song by id.
  pub async fn seek_id(&self, id: u32, time: u32) -> Result<(), MpdError> {
    self.command_ok(Command::seek_id(id, time)).await
  }

  /// Add the file or directory `uri` to the playlist. Directories add
  /// recursively.
  pub async fn add(&self, uri: &str) -> Result<(), MpdError> {
    self.command_ok(Command::add(uri)?).await
  }

  /// Add `uri` to the playlist (at position `pos` when given) and return
  /// the id the server assigned to it.
  pub async fn add_id(&self, uri: &str, pos: Option<u32>) -> Result<i64, MpdError> {
    let attrs = self
      .exchange(Command::add_id(uri, pos)?, AttrsDecoder::new())
      .await?;
    let id = attrs
      .get("Id")
      .ok_or_else(|| MpdError::Shape("addid did not return Id".to_string()))?;
    id.parse()
      .map_err(|_| MpdError::Shape(format!("addid returned non-integer Id: {:?}", id)))
  }

  /// Delete the songs at positions `[start, end)`, or the single song at
  /// `start` when `end` is `None`.
  pub async fn delete(&self, start: u32, end: Option<u32>) -> Result<(), MpdError> {
    self.command_ok(Command::delete(start, end)).await
  }

  /// Delete the song identified by `id`.
  pub async fn delete_id(&self, id: u32) -> Result<(), MpdError> {
    self.command_ok(Command::delete_id(id)).await
  }

  /// Clear the current playlist.
  pub async fn clear(&self) -> Result<(), MpdError> {
    self.command_ok(Command::clear()).await
  }

  /// Attributes for songs in the current playlist.
  ///
  /// Selection follows the `(start, end)` convention of the protocol's
  /// range arguments: both negative lists the whole playlist; `start >= 0`
  /// with `end < 0` lists the single song at `start`; both non-negative
  /// lists positions `[start, end)`. A negative `start` with a non-negative
  /// `end` fails validation before anything is sent.
  pub async fn playlist_info(&self, start: i32, end: i32) -> Result<Vec<Attrs>, MpdError> {
    if start < 0 && end >= 0 {
      return Err(MpdError::Validation(format!(
        "negative start index with end {}",
        end
      )));
    }
    if start >= 0 && end < 0 {
      return self
        .exchange(Command::playlist_info(Some(start as u32)), PlaylistDecoder::new())
        .await;
    }
    let mut records = self
      .exchange(Command::playlist_info(None), PlaylistDecoder::new())
      .await?;
    if start < 0 {
      return Ok(records);
    }
    let (start, end) = (start as usize, end as usize);
    if start > end || end > records.len() {
      return Err(MpdError::Validation(format!(
        "range {}..{} out of bounds for playlist of {}",
        start,
        end,
        records.len()
      )));
    }
    records.truncate(end);
    records.drain(..start);
    Ok(records)
  }

  /// Close the connection.
  ///
  /// Sends a best-effort `close` line (the server hangs up without
  /// replying, so no response is awaited) and releases the transport.
  /// Idempotent; later operations fail with [`MpdError::Closed`].
  pub async fn close(&self) {
    let mut guard = self.conn.lock().await;
    if let Some(conn) = guard.as_mut() {
      if let Err(err) = conn.write_line(Command::close().as_line()).await {
        log::debug!("close write failed: {}", err);
      }
      *guard = None;
      log::debug!("connection closed");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

  /// One scripted request/response pair for the fake server.
  struct Step {
    expect: &'static str,
    reply: &'static [&'static str],
  }

  /// Spawn a scripted MPD peer on the far end of an in-memory duplex pipe
  /// and hand back a connected client. The peer greets, then answers each
  /// expected command line with its scripted reply. A mismatched command
  /// panics the peer task, which surfaces client-side as a disconnect.
  async fn scripted_client(greeting: &'static str, script: Vec<Step>) -> Result<Client, MpdError> {
    let (local, remote) = tokio::io::duplex(4096);
    tokio::spawn(async move {
      let mut remote = BufReader::new(remote);
      remote
        .write_all(format!("{}\n", greeting).as_bytes())
        .await
        .unwrap();
      remote.flush().await.unwrap();
      let mut line = String::new();
      for step in script {
        line.clear();
        remote.read_line(&mut line).await.unwrap();
        assert_eq!(line.trim_end(), step.expect);
        for reply in step.reply {
          remote
            .write_all(format!("{}\n", reply).as_bytes())
            .await
            .unwrap();
        }
        remote.flush().await.unwrap();
      }
    });
    Client::handshake(LineStream::new(local)).await
  }

  fn step(expect: &'static str, reply: &'static [&'static str]) -> Step {
    Step { expect, reply }
  }

  #[tokio::test]
  async fn test_handshake_captures_version() {
    let client = scripted_client("OK MPD 0.23.5", vec![]).await.unwrap();
    assert_eq!(client.protocol_version(), "0.23.5");
  }

  #[tokio::test]
  async fn test_handshake_rejects_bad_greeting() {
    let err = scripted_client("HELLO 1.0", vec![]).await.unwrap_err();
    assert!(matches!(err, MpdError::Handshake(_)));
  }

  #[tokio::test]
  async fn test_status_returns_attrs() {
    let client = scripted_client(
      "OK MPD 0.23.5",
      vec![step("status", &["volume: 50", "state: play", "OK"])],
    )
    .await
    .unwrap();
    let status = client.status().await.unwrap();
    assert_eq!(status["volume"], "50");
    assert_eq!(status["state"], "play");
  }

  #[tokio::test]
  async fn test_current_song_empty_when_stopped() {
    let client = scripted_client("OK MPD 0.23.5", vec![step("currentsong", &["OK"])])
      .await
      .unwrap();
    assert!(client.current_song().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_ack_keeps_session_usable() {
    let client = scripted_client(
      "OK MPD 0.23.5",
      vec![
        step("play 99", &["ACK [50@0] {play} Bad song index"]),
        step("ping", &["OK"]),
      ],
    )
    .await
    .unwrap();
    let err = client.play(Some(99)).await.unwrap_err();
    match err {
      MpdError::Ack(msg) => assert_eq!(msg, "[50@0] {play} Bad song index"),
      other => panic!("expected Ack, got {:?}", other),
    }
    client.ping().await.unwrap();
  }

  #[tokio::test]
  async fn test_previous_sends_previous_command() {
    let client = scripted_client("OK MPD 0.23.5", vec![step("previous", &["OK"])])
      .await
      .unwrap();
    client.previous().await.unwrap();
  }

  #[tokio::test]
  async fn test_playlist_info_full_listing() {
    let client = scripted_client(
      "OK MPD 0.23.5",
      vec![step(
        "playlistinfo",
        &["file: x", "Title: Song A", "file: y", "Title: Song B", "OK"],
      )],
    )
    .await
    .unwrap();
    let songs = client.playlist_info(-1, -1).await.unwrap();
    assert_eq!(songs.len(), 2);
    assert_eq!(songs[0]["file"], "x");
    assert_eq!(songs[1]["Title"], "Song B");
  }

  #[tokio::test]
  async fn test_playlist_info_single_position() {
    let client = scripted_client(
      "OK MPD 0.23.5",
      vec![step("playlistinfo 2", &["file: z", "OK"])],
    )
    .await
    .unwrap();
    let songs = client.playlist_info(2, -1).await.unwrap();
    assert_eq!(songs.len(), 1);
    assert_eq!(songs[0]["file"], "z");
  }

  #[tokio::test]
  async fn test_playlist_info_client_side_slice() {
    let reply: &'static [&'static str] = &[
      "file: a", "file: b", "file: c", "file: d", "file: e", "OK",
    ];
    let client = scripted_client("OK MPD 0.23.5", vec![step("playlistinfo", reply)])
      .await
      .unwrap();
    let songs = client.playlist_info(0, 2).await.unwrap();
    assert_eq!(songs.len(), 2);
    assert_eq!(songs[0]["file"], "a");
    assert_eq!(songs[1]["file"], "b");
  }

  #[tokio::test]
  async fn test_playlist_info_invalid_range_sends_nothing() {
    // Empty script: any write would panic the peer and show up as an error
    // on the next call.
    let client = scripted_client("OK MPD 0.23.5", vec![]).await.unwrap();
    let err = client.playlist_info(-1, 3).await.unwrap_err();
    assert!(matches!(err, MpdError::Validation(_)));
  }

  #[tokio::test]
  async fn test_playlist_info_slice_out_of_bounds() {
    let client = scripted_client(
      "OK MPD 0.23.5",
      vec![step("playlistinfo", &["file: a", "OK"])],
    )
    .await
    .unwrap();
    let err = client.playlist_info(0, 5).await.unwrap_err();
    assert!(matches!(err, MpdError::Validation(_)));
  }

  #[tokio::test]
  async fn test_add_quotes_uri() {
    let client = scripted_client(
      "OK MPD 0.23.5",
      vec![step("add \"music/a b.ogg\"", &["OK"])],
    )
    .await
    .unwrap();
    client.add("music/a b.ogg").await.unwrap();
  }

  #[tokio::test]
  async fn test_add_id_returns_id() {
    let client = scripted_client(
      "OK MPD 0.23.5",
      vec![step("addid \"x.ogg\"", &["Id: 42", "OK"])],
    )
    .await
    .unwrap();
    assert_eq!(client.add_id("x.ogg", None).await.unwrap(), 42);
  }

  #[tokio::test]
  async fn test_add_id_positional_sends_one_command() {
    let client = scripted_client(
      "OK MPD 0.23.5",
      vec![step("addid \"x.ogg\" 5", &["Id: 7", "OK"]), step("ping", &["OK"])],
    )
    .await
    .unwrap();
    assert_eq!(client.add_id("x.ogg", Some(5)).await.unwrap(), 7);
    // The peer would have choked on a second addid line before the ping.
    client.ping().await.unwrap();
  }

  #[tokio::test]
  async fn test_add_id_missing_id_is_shape_error() {
    let client = scripted_client("OK MPD 0.23.5", vec![step("addid \"x.ogg\"", &["OK"])])
      .await
      .unwrap();
    let err = client.add_id("x.ogg", None).await.unwrap_err();
    assert!(matches!(err, MpdError::Shape(_)));
  }

  #[tokio::test]
  async fn test_add_id_non_integer_id_is_shape_error() {
    let client = scripted_client(
      "OK MPD 0.23.5",
      vec![step("addid \"x.ogg\"", &["Id: soon", "OK"])],
    )
    .await
    .unwrap();
    let err = client.add_id("x.ogg", None).await.unwrap_err();
    assert!(matches!(err, MpdError::Shape(_)));
  }

  #[tokio::test]
  async fn test_malformed_line_halts_decoding() {
    let client = scripted_client(
      "OK MPD 0.23.5",
      vec![step("status", &["garbage", "OK"])],
    )
    .await
    .unwrap();
    let err = client.status().await.unwrap_err();
    assert!(matches!(err, MpdError::Malformed(_)));
  }

  #[tokio::test]
  async fn test_close_is_idempotent() {
    let client = scripted_client("OK MPD 0.23.5", vec![step("close", &[])])
      .await
      .unwrap();
    client.close().await;
    client.close().await;
  }

  #[tokio::test]
  async fn test_operations_after_close_fail_fast() {
    let client = scripted_client("OK MPD 0.23.5", vec![step("close", &[])])
      .await
      .unwrap();
    client.close().await;
    assert!(matches!(client.ping().await.unwrap_err(), MpdError::Closed));
    assert!(matches!(
      client.status().await.unwrap_err(),
      MpdError::Closed
    ));
  }

  #[tokio::test]
  async fn test_transport_error_marks_session_closed() {
    // The peer reads the ping and exits without replying, dropping its end.
    let client = scripted_client("OK MPD 0.23.5", vec![step("ping", &[])])
      .await
      .unwrap();
    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, MpdError::Disconnected));
    assert!(matches!(client.ping().await.unwrap_err(), MpdError::Closed));
  }

  #[tokio::test]
  async fn test_repeated_commands_share_no_state() {
    let client = scripted_client(
      "OK MPD 0.23.5",
      vec![
        step("status", &["state: play", "OK"]),
        step("status", &["state: stop", "OK"]),
        step("ping", &["OK"]),
        step("ping", &["OK"]),
      ],
    )
    .await
    .unwrap();
    let first = client.status().await.unwrap();
    assert_eq!(first.len(), 1);
    let second = client.status().await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second["state"], "stop");
    client.ping().await.unwrap();
    client.ping().await.unwrap();
  }
}
