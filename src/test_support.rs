//! A scriptable, in-memory `ConnectionDriver` used to drive the connect
//! loop, dispatcher, locate engine and batch façade deterministically in
//! tests, without a real xrootd server. Mirrors the trait-based
//! testability pattern the teacher repo uses for its `Connection`.

#![cfg(test)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU16, Ordering};
use tokio::sync::Mutex;

use crate::driver::{ConnectionDriver, ServerError, ServerType, UnsolicitedOutcome};
use crate::endpoint::{Endpoint, Host};
use crate::error::{AdminError, AdminResult};
use crate::wire::{Request, ServerResponse, StreamId};

#[derive(Default)]
struct Inner {
  connected: bool,
  current_url: Endpoint,
  original_url: Option<Endpoint>,
  server_type: ServerType,
  server_protocol: u32,
  allowed_domains: Vec<String>,
  requested_dest: Option<(String, u16)>,
  pause_state: Option<i32>,
  delayed_connect: Option<i32>,
  last_error: Option<ServerError>,
  auth_failures: HashMap<String, (i32, String)>,
  connect_failures: HashSet<String>,
  responses: HashMap<(String, String), VecDeque<AdminResult<Bytes>>>,
}

impl Default for ServerType {
  fn default() -> Self {
    ServerType::XrootdManager
  }
}

impl Default for Endpoint {
  fn default() -> Self {
    Endpoint::new(Host::Domain(String::new()), 0)
  }
}

pub struct FakeDriver {
  inner: Mutex<Inner>,
  connect_attempts: AtomicU32,
  stream_ids: AtomicU16,
}

impl FakeDriver {
  pub fn new() -> Self {
    Self {
      inner: Mutex::new(Inner::default()),
      connect_attempts: AtomicU32::new(0),
      stream_ids: AtomicU16::new(1),
    }
  }

  pub async fn mark_connected(&self) {
    self.inner.lock().await.connected = true;
  }

  pub async fn set_allowed_domains(&self, domains: Vec<String>) {
    self.inner.lock().await.allowed_domains = domains;
  }

  pub async fn script_auth_failure(&self, endpoint: &Endpoint, errnum: i32, msg: &str) {
    self
      .inner
      .lock()
      .await
      .auth_failures
      .insert(endpoint.host_with_port(), (errnum, msg.to_owned()));
  }

  pub async fn script_connect_failure(&self, endpoint: &Endpoint) {
    self
      .inner
      .lock()
      .await
      .connect_failures
      .insert(endpoint.host_with_port());
  }

  pub async fn script_response(&self, endpoint: &Endpoint, opname: &str, result: AdminResult<Vec<u8>>) {
    let mut inner = self.inner.lock().await;
    inner
      .responses
      .entry((endpoint.host_with_port(), opname.to_owned()))
      .or_insert_with(VecDeque::new)
      .push_back(result.map(Bytes::from));
  }

  pub async fn set_server_protocol(&self, proto: u32) {
    self.inner.lock().await.server_protocol = proto;
  }

  pub async fn connect_attempts(&self) -> u32 {
    self.connect_attempts.load(Ordering::SeqCst)
  }

  pub async fn pause_state(&self) -> Option<i32> {
    self.inner.lock().await.pause_state
  }

  pub async fn requested_dest(&self) -> Option<(String, u16)> {
    self.inner.lock().await.requested_dest.clone()
  }

  pub async fn delayed_connect_state(&self) -> Option<i32> {
    self.inner.lock().await.delayed_connect
  }
}

#[async_trait]
impl ConnectionDriver for FakeDriver {
  async fn connect(&self, endpoint: &Endpoint) -> AdminResult<()> {
    self.connect_attempts.fetch_add(1, Ordering::SeqCst);
    let mut inner = self.inner.lock().await;
    if inner.connect_failures.contains(&endpoint.host_with_port()) {
      return Err(AdminError::ConnectExhausted);
    }
    inner.current_url = endpoint.clone();
    if inner.original_url.is_none() {
      inner.original_url = Some(endpoint.clone());
    }
    inner.connected = true;
    Ok(())
  }

  async fn disconnect(&self, _close_physical: bool) {
    self.inner.lock().await.connected = false;
  }

  async fn is_connected(&self) -> bool {
    self.inner.lock().await.connected
  }

  async fn get_access_to_srv(&self) -> AdminResult<()> {
    let inner = self.inner.lock().await;
    if let Some((errnum, errmsg)) = inner.auth_failures.get(&inner.current_url.host_with_port()) {
      return Err(AdminError::Server {
        errnum: *errnum,
        errmsg: errmsg.clone(),
      });
    }
    Ok(())
  }

  async fn send_gen_command(&self, req: &Request, opname: &str) -> AdminResult<Bytes> {
    let mut inner = self.inner.lock().await;
    let key = (inner.current_url.host_with_port(), opname.to_owned());
    match inner.responses.get_mut(&key).and_then(VecDeque::pop_front) {
      Some(result) => result,
      None => panic!(
        "FakeDriver: no scripted response for {} at {} (request: {:?})",
        opname, key.0, req
      ),
    }
  }

  fn next_stream_id(&self) -> StreamId {
    self.stream_ids.fetch_add(1, Ordering::Relaxed)
  }

  async fn set_url(&self, endpoint: Endpoint) {
    self.inner.lock().await.current_url = endpoint;
  }

  async fn current_url(&self) -> Endpoint {
    self.inner.lock().await.current_url.clone()
  }

  async fn server_type(&self) -> ServerType {
    self.inner.lock().await.server_type
  }

  async fn server_protocol(&self) -> u32 {
    self.inner.lock().await.server_protocol
  }

  async fn set_requested_dest_host(&self, host: String, port: u16) {
    self.inner.lock().await.requested_dest = Some((host, port));
  }

  async fn set_req_delayed_connect_state(&self, wsec: i32) {
    self.inner.lock().await.delayed_connect = Some(wsec);
  }

  async fn set_req_pause_state(&self, wsec: i32) {
    self.inner.lock().await.pause_state = Some(wsec);
  }

  fn check_host_domain(&self, host: &Host) -> bool {
    let inner = self.inner.try_lock();
    let allowed = match inner {
      Ok(guard) => guard.allowed_domains.clone(),
      Err(_) => Vec::new(),
    };
    if allowed.is_empty() {
      return true;
    }
    let host_str = host.to_string();
    allowed.iter().any(|d| host_str == *d || host_str.ends_with(&format!(".{}", d)))
  }

  async fn go_to_another_server(&self, endpoint: &Endpoint) -> AdminResult<()> {
    self.disconnect(true).await;
    self.connect(endpoint).await?;
    self.get_access_to_srv().await
  }

  async fn go_back_to_redirector(&self) {
    let original = self.inner.lock().await.original_url.clone();
    if let Some(original) = original {
      if self.current_url().await != original {
        let _ = self.go_to_another_server(&original).await;
      }
    }
  }

  async fn process_async_resp(&self, _stream_id: StreamId, _response: ServerResponse) -> UnsolicitedOutcome {
    UnsolicitedOutcome::ContinuePropagate
  }

  async fn last_server_error(&self) -> Option<ServerError> {
    self.inner.lock().await.last_error.clone()
  }
}
