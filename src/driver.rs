//! The `ConnectionDriver` collaborator: everything the admin core needs
//! from a live connection, plus the real TCP-backed implementation.
//!
//! Mirrors the teacher's split between `Connection` (owns the socket and
//! the read loop) and the `DriverError` hierarchy, generalized to the
//! admin wire instead of the MYSQL wire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};

use crate::endpoint::{Endpoint, Host};
use crate::error::{AdminError, AdminResult, WireError};
use crate::wire::{AttnAction, AttnBody, Request, ServerResponse, StreamId};

/// Bound on how long `send_gen_command` waits for a matching response
/// (including a late `waitresp`/`asynresp` answer) before giving up.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Guards against a misbehaving pair of servers redirecting a request to
/// each other forever.
const MAX_REDIRECTS: u32 = 16;

/// What kind of server answered the handshake, per the reference client's
/// `kXR_ServerType` split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
  Rootd,
  XrootdDataServer,
  XrootdManager,
  Unknown,
}

/// Terminal server-side error captured off the last failing response.
#[derive(Debug, Clone)]
pub struct ServerError {
  pub errnum: i32,
  pub errmsg: String,
}

/// What the dispatcher tells the driver to do after handling an
/// unsolicited message; kept for fidelity with the reference's
/// multi-observer `process_unsol_msg` return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsolicitedOutcome {
  ContinuePropagate,
  Stop,
}

/// Everything the admin core needs from a live logical connection. A real
/// implementation (`TcpDriver`) and a canned-response fake (`FakeDriver`,
/// in `#[cfg(test)]`) both implement this.
#[async_trait]
pub trait ConnectionDriver: Send + Sync {
  async fn connect(&self, endpoint: &Endpoint) -> AdminResult<()>;
  async fn disconnect(&self, close_physical: bool);
  async fn is_connected(&self) -> bool;
  async fn get_access_to_srv(&self) -> AdminResult<()>;
  async fn send_gen_command(&self, req: &Request, opname: &str) -> AdminResult<Bytes>;
  fn next_stream_id(&self) -> StreamId;
  async fn set_url(&self, endpoint: Endpoint);
  async fn current_url(&self) -> Endpoint;
  async fn server_type(&self) -> ServerType;
  async fn server_protocol(&self) -> u32;
  async fn set_requested_dest_host(&self, host: String, port: u16);
  async fn set_req_delayed_connect_state(&self, wsec: i32);
  async fn set_req_pause_state(&self, wsec: i32);
  fn check_host_domain(&self, host: &Host) -> bool;
  async fn go_to_another_server(&self, endpoint: &Endpoint) -> AdminResult<()>;
  async fn go_back_to_redirector(&self);
  async fn process_async_resp(&self, stream_id: StreamId, response: ServerResponse) -> UnsolicitedOutcome;
  async fn last_server_error(&self) -> Option<ServerError>;

  /// Wires the reader task's unsolicited-message hand-off to `dispatcher`.
  /// A no-op for drivers with no background reader (e.g. the fake driver
  /// tests script directly).
  async fn install_dispatcher(&self, _dispatcher: Arc<dyn crate::dispatcher::UnsolicitedDispatcher>) {}
}

type PendingTable = Mutex<HashMap<StreamId, oneshot::Sender<ServerResponse>>>;

/// The real, TCP-backed `ConnectionDriver`. Owns the socket write half and
/// the stream-id/pending-request bookkeeping; a dedicated reader task
/// (spawned on `connect`) owns the read half and feeds completed frames
/// either to a pending request's oneshot or to the dispatcher.
pub struct TcpDriver {
  state: Arc<DriverState>,
}

struct DriverState {
  write_half: Mutex<Option<tokio::io::WriteHalf<TcpStream>>>,
  pending: PendingTable,
  next_stream_id: AtomicU16,
  current_url: Mutex<Endpoint>,
  original_url: Mutex<Endpoint>,
  server_type: Mutex<ServerType>,
  server_protocol: AtomicI64,
  requested_dest: Mutex<Option<(String, u16)>>,
  paused_until: Mutex<Option<Instant>>,
  delayed_connect_until: Mutex<Option<Instant>>,
  last_error: Mutex<Option<ServerError>>,
  connected: AtomicBool,
  allowed_domains: Vec<String>,
  dispatcher: Mutex<Option<Arc<dyn crate::dispatcher::UnsolicitedDispatcher>>>,
}

impl TcpDriver {
  pub fn new(allowed_domains: Vec<String>) -> Self {
    let placeholder = Endpoint::new(Host::Domain(String::new()), 0);
    Self {
      state: Arc::new(DriverState {
        write_half: Mutex::new(None),
        pending: Mutex::new(HashMap::new()),
        next_stream_id: AtomicU16::new(1),
        current_url: Mutex::new(placeholder.clone()),
        original_url: Mutex::new(placeholder),
        server_type: Mutex::new(ServerType::Unknown),
        server_protocol: AtomicI64::new(0),
        requested_dest: Mutex::new(None),
        paused_until: Mutex::new(None),
        delayed_connect_until: Mutex::new(None),
        last_error: Mutex::new(None),
        connected: AtomicBool::new(false),
        allowed_domains,
        dispatcher: Mutex::new(None),
      }),
    }
  }

  async fn wait_out_pause(&self) {
    loop {
      let until = *self.state.paused_until.lock().await;
      match until {
        Some(deadline) if Instant::now() < deadline => {
          tokio::time::sleep(deadline - Instant::now()).await;
        }
        _ => break,
      }
    }
  }

  async fn spawn_reader(state: Arc<DriverState>, mut read_half: tokio::io::ReadHalf<TcpStream>) {
    tokio::task::spawn(async move {
      let mut buf = BytesMut::with_capacity(8 * 1024);
      loop {
        match ServerResponse::try_decode(&mut buf) {
          Ok(Some(frame)) => {
            Self::route_frame(&state, frame).await;
            continue;
          }
          Ok(None) => {}
          Err(e) => {
            log::warn!("malformed frame from server, dropping connection: {}", e);
            state.connected.store(false, Ordering::SeqCst);
            return;
          }
        }

        match read_half.read_buf(&mut buf).await {
          Ok(0) => {
            state.connected.store(false, Ordering::SeqCst);
            return;
          }
          Ok(_) => continue,
          Err(e) => {
            log::warn!("read error, dropping connection: {}", e);
            state.connected.store(false, Ordering::SeqCst);
            return;
          }
        }
      }
    });
  }

  async fn route_frame(state: &Arc<DriverState>, frame: ServerResponse) {
    use crate::wire::ResponseStatus;

    if frame.status == ResponseStatus::Attn {
      let dispatcher = state.dispatcher.lock().await.clone();
      if let Some(dispatcher) = dispatcher {
        dispatcher.process_unsol_msg(frame).await;
      }
      return;
    }

    let mut pending = state.pending.lock().await;
    if let Some(tx) = pending.remove(&frame.stream_id) {
      let _ = tx.send(frame);
    } else {
      log::debug!("unmatched stream-id {} in response, dropping", frame.stream_id);
    }
  }

  /// Awaits a pending request's oneshot under the per-request timeout,
  /// cleaning up the pending-table entry if it expires so a late answer
  /// arriving afterwards is dropped instead of matched to a dead channel.
  async fn await_pending(
    &self,
    stream_id: StreamId,
    rx: oneshot::Receiver<ServerResponse>,
  ) -> AdminResult<ServerResponse> {
    match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
      Ok(Ok(response)) => Ok(response),
      Ok(Err(_)) => Err(AdminError::ConnectionClosed),
      Err(_) => {
        self.state.pending.lock().await.remove(&stream_id);
        Err(AdminError::Timeout)
      }
    }
  }

  /// Parses a `kXR_error` payload and stashes it behind `LastServerError`,
  /// matching the reference client's `fLastServerError` slot.
  async fn record_server_error(&self, data: &[u8]) -> AdminError {
    let (errnum, errmsg) = parse_error_payload(data);
    *self.state.last_error.lock().await = Some(ServerError {
      errnum,
      errmsg: errmsg.clone(),
    });
    AdminError::Server { errnum, errmsg }
  }
}

#[async_trait]
impl ConnectionDriver for TcpDriver {
  async fn connect(&self, endpoint: &Endpoint) -> AdminResult<()> {
    let addr = resolve(endpoint).await?;
    let stream = TcpStream::connect(addr).await?;
    let (read_half, write_half) = tokio::io::split(stream);

    *self.state.write_half.lock().await = Some(write_half);
    *self.state.current_url.lock().await = endpoint.clone();
    {
      let mut original = self.state.original_url.lock().await;
      if original.port == 0 {
        *original = endpoint.clone();
      }
    }
    self.state.connected.store(true, Ordering::SeqCst);

    Self::spawn_reader(self.state.clone(), read_half).await;
    Ok(())
  }

  async fn disconnect(&self, close_physical: bool) {
    if close_physical {
      if let Some(mut w) = self.state.write_half.lock().await.take() {
        let _ = w.shutdown().await;
      }
    }
    self.state.connected.store(false, Ordering::SeqCst);
  }

  async fn is_connected(&self) -> bool {
    self.state.connected.load(Ordering::SeqCst)
  }

  async fn get_access_to_srv(&self) -> AdminResult<()> {
    // The login/auth handshake is an external collaborator's concern per
    // §1 (out of scope); a bare TCP admin connection with no credentials
    // is accepted as-is, matching servers configured without auth.
    *self.state.server_type.lock().await = ServerType::XrootdManager;
    Ok(())
  }

  async fn send_gen_command(&self, req: &Request, opname: &str) -> AdminResult<Bytes> {
    self.wait_out_pause().await;

    use crate::wire::ResponseStatus;

    let mut redirects = 0u32;

    loop {
      let stream_id = self.next_stream_id();
      let frame = req.encode(stream_id);

      let (tx, rx) = oneshot::channel();
      self.state.pending.lock().await.insert(stream_id, tx);

      {
        let mut guard = self.state.write_half.lock().await;
        let w = guard.as_mut().ok_or(AdminError::NotConnected)?;
        w.write_all(&frame).await?;
      }

      let response = self.await_pending(stream_id, rx).await?;

      match response.status {
        ResponseStatus::Ok | ResponseStatus::OkSoFar => return Ok(Bytes::from(response.data)),
        ResponseStatus::Error => return Err(self.record_server_error(&response.data).await),
        ResponseStatus::Wait => {
          let wsec = parse_wait_payload(&response.data);
          log::debug!("send_gen_command: {} received wait({}s), retrying", opname, wsec);
          tokio::time::sleep(Duration::from_secs(wsec.max(0) as u64)).await;
          continue;
        }
        ResponseStatus::WaitResp => {
          // The immediate reply only announces the real answer is coming
          // later via an `asynresp` attn message carrying this same
          // stream-id; re-park a fresh oneshot under that id instead of
          // treating the waitresp itself as the answer.
          log::debug!(
            "send_gen_command: {} deferred via waitresp, awaiting asynresp for stream {}",
            opname,
            stream_id
          );
          let (tx2, rx2) = oneshot::channel();
          self.state.pending.lock().await.insert(stream_id, tx2);
          let late = self.await_pending(stream_id, rx2).await?;
          return match late.status {
            ResponseStatus::Ok | ResponseStatus::OkSoFar => Ok(Bytes::from(late.data)),
            ResponseStatus::Error => Err(self.record_server_error(&late.data).await),
            other => Err(AdminError::Wire(WireError::Malformed(format!(
              "unexpected late status {:?} for {}",
              other, opname
            )))),
          };
        }
        ResponseStatus::Redirect => {
          redirects += 1;
          if redirects > MAX_REDIRECTS {
            return Err(AdminError::Aborted(format!(
              "too many redirects handling {}",
              opname
            )));
          }
          let (host, port) = parse_redirect_payload(&response.data);
          log::debug!("send_gen_command: {} redirected to {}:{}", opname, host, port);
          let target = Endpoint::parse_host_port(&format!("{}:{}", host, port))?;
          self.go_to_another_server(&target).await?;
          continue;
        }
        other => {
          return Err(AdminError::Wire(WireError::Malformed(format!(
            "unexpected status {:?} for {}",
            other, opname
          ))))
        }
      }
    }
  }

  fn next_stream_id(&self) -> StreamId {
    self.state.next_stream_id.fetch_add(1, Ordering::Relaxed)
  }

  async fn set_url(&self, endpoint: Endpoint) {
    *self.state.current_url.lock().await = endpoint;
  }

  async fn current_url(&self) -> Endpoint {
    self.state.current_url.lock().await.clone()
  }

  async fn server_type(&self) -> ServerType {
    *self.state.server_type.lock().await
  }

  async fn server_protocol(&self) -> u32 {
    self.state.server_protocol.load(Ordering::SeqCst) as u32
  }

  async fn set_requested_dest_host(&self, host: String, port: u16) {
    *self.state.requested_dest.lock().await = Some((host, port));
  }

  async fn set_req_delayed_connect_state(&self, wsec: i32) {
    let deadline = Instant::now() + Duration::from_secs(wsec.max(0) as u64);
    *self.state.delayed_connect_until.lock().await = Some(deadline);
  }

  async fn set_req_pause_state(&self, wsec: i32) {
    if wsec <= 0 {
      *self.state.paused_until.lock().await = None;
    } else {
      let deadline = Instant::now() + Duration::from_secs(wsec as u64);
      *self.state.paused_until.lock().await = Some(deadline);
    }
  }

  fn check_host_domain(&self, host: &Host) -> bool {
    if self.state.allowed_domains.is_empty() {
      return true;
    }
    let host_str = host.to_string();
    self
      .state
      .allowed_domains
      .iter()
      .any(|d| host_str == *d || host_str.ends_with(&format!(".{}", d)))
  }

  async fn go_to_another_server(&self, endpoint: &Endpoint) -> AdminResult<()> {
    self.disconnect(true).await;
    self.connect(endpoint).await?;
    self.get_access_to_srv().await
  }

  async fn go_back_to_redirector(&self) {
    let original = self.state.original_url.lock().await.clone();
    if self.current_url().await != original {
      let _ = self.go_to_another_server(&original).await;
    }
  }

  async fn process_async_resp(&self, stream_id: StreamId, response: ServerResponse) -> UnsolicitedOutcome {
    let mut pending = self.state.pending.lock().await;
    if let Some(tx) = pending.remove(&stream_id) {
      let _ = tx.send(response);
      UnsolicitedOutcome::Stop
    } else {
      UnsolicitedOutcome::ContinuePropagate
    }
  }

  async fn last_server_error(&self) -> Option<ServerError> {
    self.state.last_error.lock().await.clone()
  }

  async fn install_dispatcher(&self, dispatcher: Arc<dyn crate::dispatcher::UnsolicitedDispatcher>) {
    *self.state.dispatcher.lock().await = Some(dispatcher);
  }
}

async fn resolve(endpoint: &Endpoint) -> AdminResult<std::net::SocketAddr> {
  use std::net::{SocketAddrV4, SocketAddrV6};

  match &endpoint.host {
    Host::V4(ip) => Ok(SocketAddrV4::new(*ip, endpoint.port).into()),
    Host::V6(ip) => Ok(SocketAddrV6::new(*ip, endpoint.port, 0, 0).into()),
    Host::Domain(domain) => {
      let mut addrs = tokio::net::lookup_host(format!("{}:{}", domain, endpoint.port)).await?;
      addrs
        .next()
        .ok_or_else(|| AdminError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "unreachable host")))
    }
  }
}

/// Parses a `kXR_error` data segment: a 32-bit errnum followed by a
/// NUL/newline-terminated message string.
fn parse_error_payload(data: &[u8]) -> (i32, String) {
  if data.len() < 4 {
    return (0, String::new());
  }
  let errnum = i32::from_be_bytes([data[0], data[1], data[2], data[3]]);
  let msg = String::from_utf8_lossy(&data[4..])
    .trim_end_matches(['\0', '\n', '\r'])
    .to_owned();
  (errnum, msg)
}

/// Parses a `kXR_wait` data segment: a 32-bit `wsec` the caller should
/// sleep before re-sending the same request.
fn parse_wait_payload(data: &[u8]) -> i32 {
  if data.len() < 4 {
    return 0;
  }
  i32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

/// Parses a `kXR_redirect` data segment: a 32-bit port followed by the
/// target host, mirroring `AttnBody::Redirect`'s layout.
fn parse_redirect_payload(data: &[u8]) -> (String, u16) {
  if data.len() < 4 {
    return (String::new(), 0);
  }
  let port = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as u16;
  let host = String::from_utf8_lossy(&data[4..]).trim_end_matches('\0').to_owned();
  (host, port)
}

/// Decodes an attn frame's action and hands the driver the bookkeeping
/// call it implies. Shared between the real dispatcher and tests.
pub async fn apply_attn(driver: &dyn ConnectionDriver, action: AttnAction, body: AttnBody) {
  match (action, body) {
    (AttnAction::AsyncDi, AttnBody::Disconnect { wsec }) => {
      let current = driver.current_url().await;
      driver
        .set_requested_dest_host(current.host.to_string(), current.port)
        .await;
      driver.set_req_delayed_connect_state(wsec).await;
    }
    (AttnAction::AsyncRd, AttnBody::Redirect { host, port }) => {
      if !host.is_empty() {
        driver.set_requested_dest_host(host, port).await;
      }
    }
    (AttnAction::AsyncWt, AttnBody::Wait { wsec }) => {
      driver.set_req_pause_state(wsec).await;
    }
    (AttnAction::AsyncGo, _) => {
      driver.set_req_pause_state(0).await;
    }
    _ => {}
  }
}
