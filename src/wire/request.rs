use bytes::{BufMut, BytesMut};

use crate::wire::StreamId;

/// Request-id tags, matching the constants enumerated in §6 of the spec.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u16)]
pub enum RequestId {
  Stat = 3001,
  StatX = 3022,
  Rm = 3005,
  Rmdir = 3006,
  Chmod = 3008,
  Mkdir = 3009,
  Mv = 3013,
  Truncate = 3021,
  Prepare = 3017,
  Protocol = 3019,
  Query = 3020,
  Dirlist = 3004,
  Locate = 3003,
}

bitflags::bitflags! {
  /// `stat`/`statx` option byte.
  pub struct StatOptions: u8 {
    const VFS = 0x01;
  }
}

bitflags::bitflags! {
  /// POSIX-style mode bits for `mkdir`/`chmod`, composed from 4/2/1 read,
  /// write, exec triples. Bit positions match the wire's `kXR_*` constants.
  pub struct ModeBits: u16 {
    const UR = 0x100;
    const UW = 0x080;
    const UX = 0x040;
    const GR = 0x020;
    const GW = 0x010;
    const GX = 0x008;
    const OR = 0x004;
    const OW = 0x002;
    const OX = 0x001;
  }
}

bitflags::bitflags! {
  pub struct MkdirOptions: u8 {
    const MKDIRPATH = 0x01;
  }
}

bitflags::bitflags! {
  /// `locate` option byte.
  pub struct LocateOptions: u8 {
    const NOWAIT = 0x01;
  }
}

bitflags::bitflags! {
  /// `prepare` option byte — only the bits this core composes are named;
  /// unknown bits round-trip untouched because the type is a thin wrapper
  /// around `u8`.
  pub struct PrepareOptions: u8 {
    const STAGE = 0x01;
    const COLOCATE = 0x02;
    const FRESH = 0x04;
  }
}

/// Composes the POSIX-ish `(user, group, other)` triples the spec
/// describes for `mkdir`/`chmod` into the wire's mode bitfield. Bit
/// composition is monotone: each triple only ever sets bits, never clears
/// ones set by another triple. Any bits in `u`/`g`/`o` above 3 are ignored.
pub fn compose_mode(user: u8, group: u8, other: u8) -> ModeBits {
  let mut mode = ModeBits::empty();

  if user & 0b100 != 0 {
    mode.insert(ModeBits::UR);
  }
  if user & 0b010 != 0 {
    mode.insert(ModeBits::UW);
  }
  if user & 0b001 != 0 {
    mode.insert(ModeBits::UX);
  }

  if group & 0b100 != 0 {
    mode.insert(ModeBits::GR);
  }
  if group & 0b010 != 0 {
    mode.insert(ModeBits::GW);
  }
  if group & 0b001 != 0 {
    mode.insert(ModeBits::GX);
  }

  if other & 0b100 != 0 {
    mode.insert(ModeBits::OR);
  }
  if other & 0b010 != 0 {
    mode.insert(ModeBits::OW);
  }
  if other & 0b001 != 0 {
    mode.insert(ModeBits::OX);
  }

  mode
}

/// A typed request body. Each variant knows its own request-id and how to
/// lay out its fixed fields plus data segment.
#[derive(Debug, Clone)]
pub enum Request {
  Stat { path: String, vfs: bool },
  StatX { paths: Vec<String> },
  Mkdir { path: String, mode: ModeBits },
  Chmod { path: String, mode: ModeBits },
  Rm { path: String },
  Rmdir { path: String },
  Mv { src: String, dst: String },
  Truncate { path: String, new_size: i64 },
  Prepare { paths: Vec<String>, option: PrepareOptions, priority: u8 },
  Protocol,
  QueryChecksum { path: String },
  Dirlist { path: String },
  Locate { path: String, nowait: bool },
}

impl Request {
  pub fn request_id(&self) -> RequestId {
    match self {
      Request::Stat { .. } => RequestId::Stat,
      Request::StatX { .. } => RequestId::StatX,
      Request::Mkdir { .. } => RequestId::Mkdir,
      Request::Chmod { .. } => RequestId::Chmod,
      Request::Rm { .. } => RequestId::Rm,
      Request::Rmdir { .. } => RequestId::Rmdir,
      Request::Mv { .. } => RequestId::Mv,
      Request::Truncate { .. } => RequestId::Truncate,
      Request::Prepare { .. } => RequestId::Prepare,
      Request::Protocol => RequestId::Protocol,
      Request::QueryChecksum { .. } => RequestId::Query,
      Request::Dirlist { .. } => RequestId::Dirlist,
      Request::Locate { .. } => RequestId::Locate,
    }
  }

  /// Name used purely for log/error messages, mirroring the `opname`
  /// string the teacher passes down to `SendGenCommand`.
  pub fn opname(&self) -> &'static str {
    match self {
      Request::Stat { .. } => "Stat",
      Request::StatX { .. } => "SysStatX",
      Request::Mkdir { .. } => "Mkdir",
      Request::Chmod { .. } => "Chmod",
      Request::Rm { .. } => "Rm",
      Request::Rmdir { .. } => "Rmdir",
      Request::Mv { .. } => "Mv",
      Request::Truncate { .. } => "Truncate",
      Request::Prepare { .. } => "Prepare",
      Request::Protocol => "Protocol",
      Request::QueryChecksum { .. } => "GetChecksum",
      Request::Dirlist { .. } => "DirList",
      Request::Locate { .. } => "LocalLocate",
    }
  }

  /// The `\n`/space-joined data segment this request carries, if any.
  fn data_segment(&self) -> Vec<u8> {
    match self {
      Request::Stat { path, .. } => path.as_bytes().to_vec(),
      Request::StatX { paths } => paths.join("\n").into_bytes(),
      Request::Mkdir { path, .. } => path.as_bytes().to_vec(),
      Request::Chmod { path, .. } => path.as_bytes().to_vec(),
      Request::Rm { path } => path.as_bytes().to_vec(),
      Request::Rmdir { path } => path.as_bytes().to_vec(),
      Request::Mv { src, dst } => format!("{} {}", src, dst).into_bytes(),
      Request::Truncate { path, .. } => path.as_bytes().to_vec(),
      Request::Prepare { paths, .. } => paths.join("\n").into_bytes(),
      Request::Protocol => Vec::new(),
      Request::QueryChecksum { path } => path.as_bytes().to_vec(),
      Request::Dirlist { path } => path.as_bytes().to_vec(),
      Request::Locate { path, .. } => path.as_bytes().to_vec(),
    }
  }

  /// Fixed, request-specific fields that precede the data segment.
  fn fixed_body(&self) -> Vec<u8> {
    let mut b = BytesMut::new();
    match self {
      Request::Stat { vfs, .. } => {
        let opts = if *vfs { StatOptions::VFS.bits() } else { 0 };
        b.put_u8(opts);
      }
      Request::Mkdir { mode, .. } => {
        b.put_u16(mode.bits());
        b.put_u8(MkdirOptions::MKDIRPATH.bits());
      }
      Request::Chmod { mode, .. } => {
        b.put_u16(mode.bits());
      }
      Request::Truncate { new_size, .. } => {
        b.put_i64(*new_size);
      }
      Request::Prepare { option, priority, .. } => {
        b.put_u8(option.bits());
        b.put_u8(*priority);
      }
      Request::QueryChecksum { .. } => {
        b.put_slice(b"cksum");
      }
      Request::Locate { nowait, .. } => {
        let opts = if *nowait { LocateOptions::NOWAIT.bits() } else { 0 };
        b.put_u8(opts);
      }
      _ => {}
    }
    b.to_vec()
  }

  /// Serializes the full on-wire frame: stream-id, request-id, fixed
  /// body, data segment length (network order), data segment.
  pub fn encode(&self, stream_id: StreamId) -> Vec<u8> {
    let fixed = self.fixed_body();
    let data = self.data_segment();

    let mut b = BytesMut::with_capacity(2 + 2 + fixed.len() + 4 + data.len());
    b.put_u16(stream_id);
    b.put_u16(self.request_id() as u16);
    b.put_slice(&fixed);
    b.put_u32(data.len() as u32);
    b.put_slice(&data);
    b.to_vec()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mode_composition_sets_exactly_the_requested_bits() {
    for u in 0u8..8 {
      for g in 0u8..8 {
        for o in 0u8..8 {
          let mode = compose_mode(u, g, o);

          assert_eq!(mode.contains(ModeBits::UR), u & 4 != 0);
          assert_eq!(mode.contains(ModeBits::UW), u & 2 != 0);
          assert_eq!(mode.contains(ModeBits::UX), u & 1 != 0);
          assert_eq!(mode.contains(ModeBits::GR), g & 4 != 0);
          assert_eq!(mode.contains(ModeBits::GW), g & 2 != 0);
          assert_eq!(mode.contains(ModeBits::GX), g & 1 != 0);
          assert_eq!(mode.contains(ModeBits::OR), o & 4 != 0);
          assert_eq!(mode.contains(ModeBits::OW), o & 2 != 0);
          assert_eq!(mode.contains(ModeBits::OX), o & 1 != 0);
        }
      }
    }
  }

  #[test]
  fn higher_bits_are_ignored() {
    // Bits above the 0..=7 range (e.g. from a caller passing a raw octal
    // digit > 7) must not leak into the composed mode.
    let mode = compose_mode(0b1100, 0, 0);
    assert_eq!(mode, ModeBits::UR);
  }

  #[test]
  fn mv_data_segment_is_space_joined() {
    let req = Request::Mv {
      src: "/a".into(),
      dst: "/b".into(),
    };
    assert_eq!(req.data_segment(), b"/a /b".to_vec());
  }

  #[test]
  fn encode_places_dlen_in_network_order() {
    let req = Request::Rm { path: "/x".into() };
    let frame = req.encode(7);
    // stream id
    assert_eq!(&frame[0..2], &7u16.to_be_bytes());
    // request id
    assert_eq!(&frame[2..4], &(RequestId::Rm as u16).to_be_bytes());
    // dlen (no fixed body for Rm)
    assert_eq!(&frame[4..8], &2u32.to_be_bytes());
    assert_eq!(&frame[8..], b"/x");
  }
}
