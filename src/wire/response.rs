use crate::buf_ext::WireExt;
use crate::error::WireError;
use bytes::{Buf, BytesMut};
use std::io::Cursor;

/// Status code carried by every response header.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u16)]
pub enum ResponseStatus {
  Ok = 0,
  OkSoFar = 4000,
  Attn = 4001,
  AuthMore = 4002,
  Error = 4003,
  Redirect = 4004,
  Wait = 4005,
  WaitResp = 4006,
}

impl ResponseStatus {
  pub fn from_u16(v: u16) -> Result<Self, WireError> {
    Ok(match v {
      0 => ResponseStatus::Ok,
      4000 => ResponseStatus::OkSoFar,
      4001 => ResponseStatus::Attn,
      4002 => ResponseStatus::AuthMore,
      4003 => ResponseStatus::Error,
      4004 => ResponseStatus::Redirect,
      4005 => ResponseStatus::Wait,
      4006 => ResponseStatus::WaitResp,
      other => return Err(WireError::UnknownTag(other)),
    })
  }
}

/// A decoded response frame: the stream-id it answers, its status, and
/// whatever data segment followed the fixed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerResponse {
  pub stream_id: u16,
  pub status: ResponseStatus,
  pub data: Vec<u8>,
}

impl ServerResponse {
  /// Fixed header size: stream-id (2) + status (2) + dlen (4).
  const HEADER_LEN: usize = 8;

  /// Attempts to pull one complete frame off the front of `buf`, the way
  /// the teacher's `Packet::check`/`Packet::parse` split works: `Ok(None)`
  /// means "keep reading from the socket", not an error.
  pub fn try_decode(buf: &mut BytesMut) -> Result<Option<Self>, WireError> {
    if buf.len() < Self::HEADER_LEN {
      return Ok(None);
    }

    let mut cursor = Cursor::new(&buf[..]);
    let stream_id = cursor.safe_get_u16()?;
    let status = cursor.safe_get_u16()?;
    let dlen = cursor.safe_get_u32()? as usize;

    if cursor.remaining() < dlen {
      return Ok(None);
    }

    let data = cursor.safe_get_fixed(dlen)?;
    let consumed = Self::HEADER_LEN + dlen;
    buf.advance(consumed);

    Ok(Some(ServerResponse {
      stream_id,
      status: ResponseStatus::from_u16(status)?,
      data,
    }))
  }
}

/// The action byte an unsolicited (`kXR_attn`) message carries.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AttnAction {
  AsyncDi,
  AsyncRd,
  AsyncWt,
  AsyncGo,
  AsynResp,
  Unknown(u32),
}

impl AttnAction {
  pub fn from_u32(v: u32) -> Self {
    match v {
      5000 => AttnAction::AsyncDi,
      5001 => AttnAction::AsyncRd,
      5002 => AttnAction::AsyncWt,
      5003 => AttnAction::AsyncGo,
      5004 => AttnAction::AsynResp,
      other => AttnAction::Unknown(other),
    }
  }
}

/// The action-specific payload carried after an `AttnAction`.
#[derive(Debug, Clone)]
pub enum AttnBody {
  /// `asyncdi`: disconnect now, retry after `wsec` seconds.
  Disconnect { wsec: i32 },
  /// `asyncrd`: permanently move to a new host/port.
  Redirect { host: String, port: u16 },
  /// `asyncwt`: hold off for `wsec` seconds before retrying.
  Wait { wsec: i32 },
  /// `asyncgo`: the hold from a prior `asyncwt` is over.
  Go,
  /// `asynresp`: the deferred answer to a request sent with `kXR_wait`,
  /// carrying the stream-id it resolves and the embedded response frame.
  AsyncResponse { stream_id: u16, response: Box<ServerResponse> },
}

/// Decodes an attn message's data segment: a 32-bit action code followed
/// by an action-specific body.
pub fn parse_attn(data: &[u8]) -> Result<(AttnAction, AttnBody), WireError> {
  let mut cursor = Cursor::new(data);
  let actnum = cursor.safe_get_u32()?;
  let action = AttnAction::from_u32(actnum);

  let body = match action {
    AttnAction::AsyncDi => AttnBody::Disconnect {
      wsec: cursor.safe_get_u32()? as i32,
    },
    AttnAction::AsyncRd => {
      let port = cursor.safe_get_u32()? as u16;
      let rest = &data[cursor.position() as usize..];
      let host = String::from_utf8_lossy(rest).trim_end_matches('\0').to_owned();
      AttnBody::Redirect { host, port }
    }
    AttnAction::AsyncWt => AttnBody::Wait {
      wsec: cursor.safe_get_u32()? as i32,
    },
    AttnAction::AsyncGo => AttnBody::Go,
    AttnAction::AsynResp => {
      let stream_id = cursor.safe_get_u16()?;
      let mut embedded = BytesMut::from(&data[cursor.position() as usize..]);
      let response = ServerResponse::try_decode(&mut embedded)?.ok_or_else(|| {
        WireError::Malformed("truncated asynresp embedded frame".into())
      })?;
      AttnBody::AsyncResponse {
        stream_id,
        response: Box::new(response),
      }
    }
    AttnAction::Unknown(_) => AttnBody::Go,
  };

  Ok((action, body))
}

/// One entry in a `locate` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocateInfo {
  pub host_port: String,
  pub info_type: LocateInfoType,
  pub writable: bool,
}

/// Node kind reported for a locate entry, per the reference client's
/// `S/s/M/m` token prefixes: data server, pending data server, manager,
/// pending manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateInfoType {
  DataServer,
  DataServerPending,
  Manager,
  ManagerPending,
}

/// Parses one whitespace-delimited locate token, e.g. `Sw[::d1.example.com]:1095`.
/// The grammar is strictly bracketed (`T[w|r][::<host>]:<port>`); a token is
/// at minimum a type char, an access char, and a bracketed `host:port` tail,
/// so anything shorter than 8 bytes is rejected outright.
pub fn parse_locate_token(token: &str) -> Result<LocateInfo, WireError> {
  if token.len() < 8 {
    return Err(WireError::Malformed(format!(
      "locate token too short: {:?}",
      token
    )));
  }

  let mut chars = token.chars();
  let type_char = chars.next().unwrap();
  let access_char = chars.next().unwrap();
  let rest = chars.as_str();

  let info_type = match type_char {
    'S' => LocateInfoType::DataServer,
    's' => LocateInfoType::DataServerPending,
    'M' => LocateInfoType::Manager,
    'm' => LocateInfoType::ManagerPending,
    other => {
      return Err(WireError::Malformed(format!(
        "unknown locate node type {:?}",
        other
      )))
    }
  };

  let writable = match access_char {
    'w' => true,
    'r' => false,
    other => {
      return Err(WireError::Malformed(format!(
        "unknown locate access char {:?}",
        other
      )))
    }
  };

  let stripped = rest
    .strip_prefix("[::")
    .ok_or_else(|| WireError::Malformed(format!("locate token missing bracketed host: {:?}", token)))?;
  let close = stripped
    .find(']')
    .ok_or_else(|| WireError::Malformed(format!("unterminated bracket in {:?}", token)))?;
  let host = &stripped[..close];
  let tail = &stripped[close + 1..];
  let port = tail
    .strip_prefix(':')
    .ok_or_else(|| WireError::Malformed(format!("missing port in {:?}", token)))?;
  let host_port = format!("{}:{}", host, port);

  Ok(LocateInfo {
    host_port,
    info_type,
    writable,
  })
}

bitflags::bitflags! {
  /// Info bits carried alongside a `statx` entry.
  pub struct StatXFlags: u8 {
    const IS_DIR = 0x01;
    const OTHER = 0x02;
    const OFFLINE = 0x04;
    const READABLE = 0x08;
    const WRITABLE = 0x10;
  }
}
