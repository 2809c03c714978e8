//! The simple operation façade (§4.3): one request/response round trip
//! per call, with typed decoding of the ASCII/binary payloads the
//! reference client parses with `sscanf`.

use std::sync::Arc;

use crate::driver::ConnectionDriver;
use crate::error::{AdminError, AdminResult, WireError};
use crate::util::split_non_empty_lines;
use crate::wire::response::StatXFlags;
use crate::wire::request::compose_mode;
use crate::wire::Request;

/// `stat(path)` result: id, size, flags, mtime — the reference client's
/// `%ld %lld %ld %ld` tuple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatInfo {
  pub id: i64,
  pub size: i64,
  pub flags: i64,
  pub modtime: i64,
}

/// `stat_vfs(path)` result — the reference client's
/// `%d %lld %d %d %lld %d` tuple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VfsInfo {
  pub rw_servers: i32,
  pub rw_free: i64,
  pub rw_util: i32,
  pub stg_servers: i32,
  pub stg_free: i64,
  pub stg_util: i32,
}

/// `protocol()` result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolInfo {
  pub proto: u32,
  pub kind: u32,
}

fn next_token<'a>(tokens: &mut impl Iterator<Item = &'a str>, field: &str) -> AdminResult<&'a str> {
  tokens
    .next()
    .ok_or_else(|| AdminError::Wire(WireError::Malformed(format!("missing field {}", field))))
}

fn parse_i64(s: &str, field: &str) -> AdminResult<i64> {
  s.parse()
    .map_err(|_| AdminError::Wire(WireError::Malformed(format!("bad {} field: {:?}", field, s))))
}

fn parse_i32(s: &str, field: &str) -> AdminResult<i32> {
  s.parse()
    .map_err(|_| AdminError::Wire(WireError::Malformed(format!("bad {} field: {:?}", field, s))))
}

pub async fn stat(driver: &Arc<dyn ConnectionDriver>, path: &str) -> AdminResult<StatInfo> {
  let req = Request::Stat {
    path: path.to_owned(),
    vfs: false,
  };
  let payload = driver.send_gen_command(&req, req.opname()).await?;
  let text = String::from_utf8_lossy(&payload);
  let mut tokens = text.split_ascii_whitespace();

  Ok(StatInfo {
    id: parse_i64(next_token(&mut tokens, "id")?, "id")?,
    size: parse_i64(next_token(&mut tokens, "size")?, "size")?,
    flags: parse_i64(next_token(&mut tokens, "flags")?, "flags")?,
    modtime: parse_i64(next_token(&mut tokens, "modtime")?, "modtime")?,
  })
}

pub async fn stat_vfs(driver: &Arc<dyn ConnectionDriver>, path: &str) -> AdminResult<VfsInfo> {
  let req = Request::Stat {
    path: path.to_owned(),
    vfs: true,
  };
  let payload = driver.send_gen_command(&req, "StatVFS").await?;
  let text = String::from_utf8_lossy(&payload);
  let mut tokens = text.split_ascii_whitespace();

  Ok(VfsInfo {
    rw_servers: parse_i32(next_token(&mut tokens, "rw_servers")?, "rw_servers")?,
    rw_free: parse_i64(next_token(&mut tokens, "rw_free")?, "rw_free")?,
    rw_util: parse_i32(next_token(&mut tokens, "rw_util")?, "rw_util")?,
    stg_servers: parse_i32(next_token(&mut tokens, "stg_servers")?, "stg_servers")?,
    stg_free: parse_i64(next_token(&mut tokens, "stg_free")?, "stg_free")?,
    stg_util: parse_i32(next_token(&mut tokens, "stg_util")?, "stg_util")?,
  })
}

/// `sys_statx(paths)`: one info byte per input path.
pub async fn sys_statx(driver: &Arc<dyn ConnectionDriver>, paths: &[String]) -> AdminResult<Vec<StatXFlags>> {
  let req = Request::StatX { paths: paths.to_vec() };
  let payload = driver.send_gen_command(&req, req.opname()).await?;

  if payload.len() < paths.len() {
    return Err(AdminError::Wire(WireError::Malformed(format!(
      "statx returned {} info bytes for {} paths",
      payload.len(),
      paths.len()
    ))));
  }

  Ok(
    payload[..paths.len()]
      .iter()
      .map(|&b| StatXFlags::from_bits_truncate(b))
      .collect(),
  )
}

pub async fn exist_files(driver: &Arc<dyn ConnectionDriver>, paths: &[String]) -> AdminResult<Vec<bool>> {
  let info = sys_statx(driver, paths).await?;
  Ok(
    info
      .into_iter()
      .map(|f| !f.intersects(StatXFlags::IS_DIR | StatXFlags::OFFLINE | StatXFlags::OTHER))
      .collect(),
  )
}

pub async fn exist_dirs(driver: &Arc<dyn ConnectionDriver>, paths: &[String]) -> AdminResult<Vec<bool>> {
  let info = sys_statx(driver, paths).await?;
  Ok(info.into_iter().map(|f| f.contains(StatXFlags::IS_DIR)).collect())
}

pub async fn is_file_online(driver: &Arc<dyn ConnectionDriver>, paths: &[String]) -> AdminResult<Vec<bool>> {
  let info = sys_statx(driver, paths).await?;
  Ok(info.into_iter().map(|f| !f.contains(StatXFlags::OFFLINE)).collect())
}

pub async fn mkdir(driver: &Arc<dyn ConnectionDriver>, path: &str, user: u8, group: u8, other: u8) -> AdminResult<()> {
  let req = Request::Mkdir {
    path: path.to_owned(),
    mode: compose_mode(user, group, other),
  };
  driver.send_gen_command(&req, req.opname()).await?;
  Ok(())
}

pub async fn chmod(driver: &Arc<dyn ConnectionDriver>, path: &str, user: u8, group: u8, other: u8) -> AdminResult<()> {
  let req = Request::Chmod {
    path: path.to_owned(),
    mode: compose_mode(user, group, other),
  };
  driver.send_gen_command(&req, req.opname()).await?;
  Ok(())
}

pub async fn rm(driver: &Arc<dyn ConnectionDriver>, path: &str) -> AdminResult<()> {
  let req = Request::Rm { path: path.to_owned() };
  driver.send_gen_command(&req, req.opname()).await?;
  Ok(())
}

pub async fn rmdir(driver: &Arc<dyn ConnectionDriver>, path: &str) -> AdminResult<()> {
  let req = Request::Rmdir { path: path.to_owned() };
  driver.send_gen_command(&req, req.opname()).await?;
  Ok(())
}

pub async fn truncate(driver: &Arc<dyn ConnectionDriver>, path: &str, new_size: i64) -> AdminResult<()> {
  let req = Request::Truncate {
    path: path.to_owned(),
    new_size,
  };
  driver.send_gen_command(&req, req.opname()).await?;
  Ok(())
}

pub async fn mv(driver: &Arc<dyn ConnectionDriver>, src: &str, dst: &str) -> AdminResult<()> {
  let req = Request::Mv {
    src: src.to_owned(),
    dst: dst.to_owned(),
  };
  driver.send_gen_command(&req, req.opname()).await?;
  Ok(())
}

pub async fn protocol(driver: &Arc<dyn ConnectionDriver>) -> AdminResult<ProtocolInfo> {
  let req = Request::Protocol;
  let payload = driver.send_gen_command(&req, req.opname()).await?;
  if payload.len() < 8 {
    return Err(AdminError::Wire(WireError::Malformed(
      "protocol response shorter than 8 bytes".into(),
    )));
  }
  let proto = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
  let kind = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
  Ok(ProtocolInfo { proto, kind })
}

pub async fn dirlist(driver: &Arc<dyn ConnectionDriver>, path: &str) -> AdminResult<Vec<String>> {
  let req = Request::Dirlist { path: path.to_owned() };
  let payload = driver.send_gen_command(&req, req.opname()).await?;
  let text = String::from_utf8_lossy(&payload);
  Ok(split_non_empty_lines(&text))
}

pub async fn get_checksum(driver: &Arc<dyn ConnectionDriver>, path: &str) -> AdminResult<Vec<u8>> {
  let req = Request::QueryChecksum { path: path.to_owned() };
  let payload = driver.send_gen_command(&req, req.opname()).await?;
  Ok(payload.to_vec())
}

/// Single-call `prepare`: takes an already `\n`-joined path list and
/// issues exactly one request. Used both directly and as the primitive
/// the bulk façade chunks over.
pub async fn prepare_once(
  driver: &Arc<dyn ConnectionDriver>,
  paths: &[String],
  option: crate::wire::request::PrepareOptions,
  priority: u8,
) -> AdminResult<()> {
  let req = Request::Prepare {
    paths: paths.to_vec(),
    option,
    priority,
  };
  driver.send_gen_command(&req, req.opname()).await?;
  Ok(())
}
