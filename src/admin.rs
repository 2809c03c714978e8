//! The public admin surface (§4.7): `AdminClient`, the single entry point
//! binding the connect loop, wire façades and locate engine together.

use std::sync::Arc;

use crate::batch;
use crate::config::Config;
use crate::connect;
use crate::dispatcher::Dispatcher;
use crate::driver::{ConnectionDriver, TcpDriver};
use crate::endpoint::EndpointSet;
use crate::error::AdminResult;
use crate::locate;
use crate::ops::{self, ProtocolInfo, StatInfo, VfsInfo};
use crate::wire::request::PrepareOptions;
use crate::wire::response::StatXFlags;
use crate::wire::LocateInfo;

/// The administrative client. Owns one [`ConnectionDriver`] for its
/// lifetime, created in [`AdminClient::connect`] and torn down by
/// [`AdminClient::shutdown`] (or best-effort by `Drop`, since async
/// teardown isn't available from a synchronous `Drop::drop`).
pub struct AdminClient {
  driver: Arc<dyn ConnectionDriver>,
}

impl AdminClient {
  /// Connects to `url` (a `root://host:port/...`-shaped admin URL),
  /// running the connect loop (§4.1) against a real TCP driver.
  pub async fn connect(url: &str, config: &Config) -> AdminResult<Self> {
    let mut endpoints = EndpointSet::from_url_str(url)?;
    let driver: Arc<dyn ConnectionDriver> = Arc::new(TcpDriver::new(Vec::new()));
    Self::connect_with_driver(driver, &mut endpoints, config).await
  }

  /// As [`AdminClient::connect`], but against an already-constructed
  /// driver — the seam the fake-driver test suite and any caller with a
  /// non-default domain allowlist use.
  pub async fn connect_with_driver(
    driver: Arc<dyn ConnectionDriver>,
    endpoints: &mut EndpointSet,
    config: &Config,
  ) -> AdminResult<Self> {
    connect::connect(&driver, endpoints, config).await?;

    let dispatcher = Arc::new(Dispatcher::new(driver.clone()));
    driver.install_dispatcher(dispatcher).await;

    Ok(Self { driver })
  }

  /// Synchronously best-effort closes the underlying socket. Prefer this
  /// over relying on `Drop` when the runtime is still alive to await it.
  pub async fn shutdown(&self) {
    self.driver.disconnect(true).await;
  }

  pub async fn stat(&self, path: &str) -> AdminResult<StatInfo> {
    ops::stat(&self.driver, path).await
  }

  pub async fn stat_vfs(&self, path: &str) -> AdminResult<VfsInfo> {
    ops::stat_vfs(&self.driver, path).await
  }

  pub async fn sys_statx(&self, paths: &[String]) -> AdminResult<Vec<StatXFlags>> {
    ops::sys_statx(&self.driver, paths).await
  }

  pub async fn exist_files(&self, paths: &[String]) -> AdminResult<Vec<bool>> {
    ops::exist_files(&self.driver, paths).await
  }

  pub async fn exist_dirs(&self, paths: &[String]) -> AdminResult<Vec<bool>> {
    ops::exist_dirs(&self.driver, paths).await
  }

  pub async fn is_file_online(&self, paths: &[String]) -> AdminResult<Vec<bool>> {
    ops::is_file_online(&self.driver, paths).await
  }

  pub async fn mkdir(&self, path: &str, user: u8, group: u8, other: u8) -> AdminResult<()> {
    ops::mkdir(&self.driver, path, user, group, other).await
  }

  pub async fn chmod(&self, path: &str, user: u8, group: u8, other: u8) -> AdminResult<()> {
    ops::chmod(&self.driver, path, user, group, other).await
  }

  pub async fn rm(&self, path: &str) -> AdminResult<()> {
    ops::rm(&self.driver, path).await
  }

  pub async fn rmdir(&self, path: &str) -> AdminResult<()> {
    ops::rmdir(&self.driver, path).await
  }

  pub async fn truncate(&self, path: &str, new_size: i64) -> AdminResult<()> {
    ops::truncate(&self.driver, path, new_size).await
  }

  pub async fn mv(&self, src: &str, dst: &str) -> AdminResult<()> {
    ops::mv(&self.driver, src, dst).await
  }

  pub async fn protocol(&self) -> AdminResult<ProtocolInfo> {
    ops::protocol(&self.driver).await
  }

  pub async fn dirlist(&self, path: &str) -> AdminResult<Vec<String>> {
    ops::dirlist(&self.driver, path).await
  }

  pub async fn get_checksum(&self, path: &str) -> AdminResult<Vec<u8>> {
    ops::get_checksum(&self.driver, path).await
  }

  pub async fn prepare(&self, paths: &[String], option: PrepareOptions, priority: u8) -> AdminResult<()> {
    batch::prepare(&self.driver, paths, option, priority).await
  }

  pub async fn locate_one(&self, path: &str, writable: bool) -> AdminResult<Option<LocateInfo>> {
    locate::locate_one(&self.driver, path, writable).await
  }

  pub async fn locate_all(&self, path: &str) -> AdminResult<Vec<LocateInfo>> {
    locate::locate_all(&self.driver, path).await
  }

  /// The redirect-handler contract §6 describes the admin registering
  /// itself for: there is no open-file concept in this core, so this is
  /// a fixed no-op, matching §4.7.
  pub fn open_file_when_redirected(&self) -> (bool, bool) {
    // (was_open, ok)
    (false, true)
  }
}
