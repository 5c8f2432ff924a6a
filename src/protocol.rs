//! MPD wire protocol: command line formatting and response block decoding.
//!
//! Reference: https://www.musicpd.org/doc/protocol/
//!
//! A response block is zero or more `key: value` data lines followed by one
//! terminator line, either `OK` or `ACK <message>`. Which decoder applies is
//! decided by the caller from the command it sent; the protocol does not
//! self-describe the response shape.

use std::collections::HashMap;

use crate::error::MpdError;

/// Attributes of one server-reported entity (a song, the player status, ...).
pub type Attrs = HashMap<String, String>;

/// Key that opens a new record in multi-record responses.
const RECORD_MARKER: &str = "file";

/// Separator between key and value in a data line.
const PAIR_SEPARATOR: &str = ": ";

/// A single command line being assembled for dispatch.
#[derive(Debug, Clone)]
pub struct Command {
  line: String,
}

impl Command {
  fn new(verb: &str) -> Self {
    Self {
      line: verb.to_string(),
    }
  }

  /// Append a decimal integer argument.
  fn int(mut self, value: u32) -> Self {
    self.line.push(' ');
    self.line.push_str(&value.to_string());
    self
  }

  /// Append a double-quoted string argument, backslash-escaping embedded
  /// quotes and backslashes. Newlines cannot be framed at all and fail
  /// validation.
  fn quoted(mut self, value: &str) -> Result<Self, MpdError> {
    if value.contains('\n') {
      return Err(MpdError::Validation(format!(
        "argument contains a newline: {:?}",
        value
      )));
    }
    self.line.push(' ');
    self.line.push('"');
    for c in value.chars() {
      if c == '"' || c == '\\' {
        self.line.push('\\');
      }
      self.line.push(c);
    }
    self.line.push('"');
    Ok(self)
  }

  /// The wire line, without the trailing newline.
  pub fn as_line(&self) -> &str {
    &self.line
  }

  pub fn ping() -> Self {
    Self::new("ping")
  }

  pub fn current_song() -> Self {
    Self::new("currentsong")
  }

  pub fn status() -> Self {
    Self::new("status")
  }

  /// Start playback at playlist position `pos`, or at the current position
  /// when `pos` is `None`.
  pub fn play(pos: Option<u32>) -> Self {
    match pos {
      Some(pos) => Self::new("play").int(pos),
      None => Self::new("play"),
    }
  }

  /// Like [`Command::play`], but identifying the song by id.
  pub fn play_id(id: Option<u32>) -> Self {
    match id {
      Some(id) => Self::new("playid").int(id),
      None => Self::new("playid"),
    }
  }

  pub fn pause(paused: bool) -> Self {
    Self::new("pause").int(u32::from(paused))
  }

  pub fn stop() -> Self {
    Self::new("stop")
  }

  pub fn next() -> Self {
    Self::new("next")
  }

  pub fn previous() -> Self {
    Self::new("previous")
  }

  /// Seek to `time` seconds within the song at playlist position `pos`.
  pub fn seek(pos: u32, time: u32) -> Self {
    Self::new("seek").int(pos).int(time)
  }

  /// Like [`Command::seek`], but identifying the song by id.
  pub fn seek_id(id: u32, time: u32) -> Self {
    Self::new("seekid").int(id).int(time)
  }

  /// Add the file or directory `uri` to the playlist.
  pub fn add(uri: &str) -> Result<Self, MpdError> {
    Self::new("add").quoted(uri)
  }

  /// Add `uri` to the playlist, at position `pos` when given. Exactly one
  /// command line is produced either way.
  pub fn add_id(uri: &str, pos: Option<u32>) -> Result<Self, MpdError> {
    let cmd = Self::new("addid").quoted(uri)?;
    Ok(match pos {
      Some(pos) => cmd.int(pos),
      None => cmd,
    })
  }

  /// Delete the songs at positions `[start, end)`, or the single song at
  /// `start` when `end` is `None`.
  pub fn delete(start: u32, end: Option<u32>) -> Self {
    match end {
      Some(end) => Self::new("delete").int(start).int(end),
      None => Self::new("delete").int(start),
    }
  }

  pub fn delete_id(id: u32) -> Self {
    Self::new("deleteid").int(id)
  }

  pub fn clear() -> Self {
    Self::new("clear")
  }

  /// List the whole playlist, or the single entry at `pos` when given.
  pub fn playlist_info(pos: Option<u32>) -> Self {
    match pos {
      Some(pos) => Self::new("playlistinfo").int(pos),
      None => Self::new("playlistinfo"),
    }
  }

  pub fn close() -> Self {
    Self::new("close")
  }
}

/// One classified response line.
enum Line<'a> {
  /// Success terminator (`OK`).
  Done,
  /// Error terminator; the server-supplied message after `ACK`.
  Ack(&'a str),
  /// Data line split at the first `": "`.
  Pair(&'a str, &'a str),
}

fn classify(line: &str) -> Result<Line<'_>, MpdError> {
  if line == "OK" {
    return Ok(Line::Done);
  }
  if let Some(rest) = line.strip_prefix("ACK") {
    return Ok(Line::Ack(rest.strip_prefix(' ').unwrap_or(rest)));
  }
  match line.split_once(PAIR_SEPARATOR) {
    Some((key, value)) => Ok(Line::Pair(key, value)),
    None => Err(MpdError::Malformed(format!("can't parse line: {}", line))),
  }
}

/// Decodes one response block, fed one line at a time.
///
/// `feed` returns `Ok(Some(output))` on the success terminator, `Ok(None)`
/// when more lines are expected, and an error on `ACK` or a grammar
/// violation. Decoders hold no I/O: the same line sequence always produces
/// the same outcome.
pub trait Decode {
  type Output;

  fn feed(&mut self, line: &str) -> Result<Option<Self::Output>, MpdError>;
}

/// Flat decode: every data line lands in one attribute map.
#[derive(Debug, Default)]
pub struct AttrsDecoder {
  attrs: Attrs,
}

impl AttrsDecoder {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Decode for AttrsDecoder {
  type Output = Attrs;

  fn feed(&mut self, line: &str) -> Result<Option<Attrs>, MpdError> {
    match classify(line)? {
      Line::Done => Ok(Some(std::mem::take(&mut self.attrs))),
      Line::Ack(msg) => Err(MpdError::Ack(msg.to_string())),
      Line::Pair(key, value) => {
        self.attrs.insert(key.to_string(), value.to_string());
        Ok(None)
      }
    }
  }
}

/// Record-sequence decode: a `file` key opens a new record, subsequent data
/// lines belong to it. Record order matches server emission order.
#[derive(Debug, Default)]
pub struct PlaylistDecoder {
  records: Vec<Attrs>,
}

impl PlaylistDecoder {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Decode for PlaylistDecoder {
  type Output = Vec<Attrs>;

  fn feed(&mut self, line: &str) -> Result<Option<Vec<Attrs>>, MpdError> {
    match classify(line)? {
      Line::Done => Ok(Some(std::mem::take(&mut self.records))),
      Line::Ack(msg) => Err(MpdError::Ack(msg.to_string())),
      Line::Pair(key, value) => {
        if key == RECORD_MARKER {
          self.records.push(Attrs::new());
        }
        match self.records.last_mut() {
          Some(record) => {
            record.insert(key.to_string(), value.to_string());
            Ok(None)
          }
          // A record cannot begin before its opening marker line.
          None => Err(MpdError::Malformed(format!("unexpected: {}", line))),
        }
      }
    }
  }
}

/// Decode for control commands whose success response carries no body.
#[derive(Debug, Default)]
pub struct OkDecoder;

impl Decode for OkDecoder {
  type Output = ();

  fn feed(&mut self, line: &str) -> Result<Option<()>, MpdError> {
    match classify(line)? {
      Line::Done => Ok(Some(())),
      Line::Ack(msg) => Err(MpdError::Ack(msg.to_string())),
      Line::Pair(..) => Err(MpdError::Malformed(format!(
        "unexpected response: {}",
        line
      ))),
    }
  }
}
