//! The cluster-wide locate engine (§4.5): bounded BFS expansion across
//! managers until data servers are resolved, with writable-preference
//! selection and a legacy-protocol fallback through plain `stat`.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::driver::ConnectionDriver;
use crate::endpoint::Endpoint;
use crate::error::{AdminError, AdminResult};
use crate::ops;
use crate::wire::{parse_locate_token, LocateInfo, LocateInfoType, Request};

const MAX_LEVELS: u32 = 4;
const LEGACY_PROTOCOL_CUTOFF: u32 = 0x290;

fn is_data_server(entry: &LocateInfo) -> bool {
  matches!(
    entry.info_type,
    LocateInfoType::DataServer | LocateInfoType::DataServerPending
  )
}

/// Issues one `locate` request against the currently-connected server and
/// appends every well-formed token it returns to `results`.
async fn local_locate(
  driver: &Arc<dyn ConnectionDriver>,
  path: &str,
  nowait: bool,
  results: &mut Vec<LocateInfo>,
) -> AdminResult<usize> {
  let req = Request::Locate {
    path: path.to_owned(),
    nowait,
  };
  let payload = driver.send_gen_command(&req, req.opname()).await?;
  let text = String::from_utf8_lossy(&payload);

  let mut manager_count = 0;
  for token in text.split_ascii_whitespace() {
    match parse_locate_token(token) {
      Ok(info) => {
        if !is_data_server(&info) {
          manager_count += 1;
        }
        results.push(info);
      }
      Err(e) => {
        log::warn!("LocalLocate: invalid server response token {:?}: {}", token, e);
      }
    }
  }
  Ok(manager_count)
}

async fn legacy_fallback(driver: &Arc<dyn ConnectionDriver>, path: &str) -> AdminResult<Vec<LocateInfo>> {
  let _ = ops::stat(driver, path).await?;
  let current = driver.current_url().await;
  Ok(vec![LocateInfo {
    host_port: current.host_with_port(),
    info_type: LocateInfoType::DataServer,
    writable: true,
  }])
}

/// The shared BFS traversal §4.5 describes: seeds a queue with the
/// current endpoint as a Manager, expands manager entries level by
/// level (up to [`MAX_LEVELS`]), and always rewinds to the original
/// redirector before returning — success, failure, or depth-exceeded.
///
/// `early_stop`, when given, lets `locate_one` return as soon as a
/// satisfying data server turns up instead of exhausting every level.
async fn traverse(
  driver: &Arc<dyn ConnectionDriver>,
  path: &str,
  nowait: bool,
  early_stop: Option<&(dyn Fn(&LocateInfo) -> bool + Send + Sync)>,
) -> AdminResult<Vec<LocateInfo>> {
  let current = driver.current_url().await;
  let mut queue: VecDeque<LocateInfo> = VecDeque::new();
  queue.push_back(LocateInfo {
    host_port: current.host_with_port(),
    info_type: LocateInfoType::Manager,
    writable: true,
  });

  let mut results: Vec<LocateInfo> = Vec::new();
  let mut first_iteration = true;
  let mut level = 0u32;

  let outcome = loop {
    if level > MAX_LEVELS {
      break Err(AdminError::TooManyLevels);
    }

    let qrytodo = queue.len();
    let mut stop = true;
    let mut found_early = false;

    for _ in 0..qrytodo {
      let entry = match queue.pop_front() {
        Some(e) => e,
        None => break,
      };

      stop = false;

      let endpoint = match Endpoint::parse_host_port(&entry.host_port) {
        Ok(ep) => ep,
        Err(e) => {
          log::warn!("locate: malformed manager endpoint {:?}: {}", entry.host_port, e);
          queue.push_back(entry);
          continue;
        }
      };

      if first_iteration {
        first_iteration = false;
      } else if driver.go_to_another_server(&endpoint).await.is_err() {
        log::warn!("locate: failed to connect to manager {}, deferring", entry.host_port);
        queue.push_back(entry);
        continue;
      }

      let before = results.len();
      if let Err(e) = local_locate(driver, path, nowait, &mut results).await {
        log::warn!("locate: transport failure expanding {}: {}", entry.host_port, e);
      }

      if let Some(pred) = early_stop {
        if results[before..].iter().any(|info| is_data_server(info) && pred(info)) {
          found_early = true;
          break;
        }
      }
      // The manager entry itself is erased regardless of outcome; any
      // children it reported are already appended to `results`.
    }

    for info in &results {
      if !is_data_server(info) {
        queue.push_back(info.clone());
      }
    }
    results.retain(is_data_server);

    if found_early || stop {
      break Ok(());
    }

    level += 1;
  };

  driver.go_back_to_redirector().await;
  outcome.map(|()| results)
}

/// `locate_all(path)`: every data server the traversal discovers.
pub async fn locate_all(driver: &Arc<dyn ConnectionDriver>, path: &str) -> AdminResult<Vec<LocateInfo>> {
  if driver.server_protocol().await < LEGACY_PROTOCOL_CUTOFF {
    let result = legacy_fallback(driver, path).await;
    driver.go_back_to_redirector().await;
    return result;
  }

  traverse(driver, path, false, None).await
}

/// `locate_one(path, writable)`: the first data server satisfying the
/// writable preference, or `Ok(None)` if the cluster has none. Depth
/// exceeded is a hard `Err`, never a false "not found".
pub async fn locate_one(
  driver: &Arc<dyn ConnectionDriver>,
  path: &str,
  writable: bool,
) -> AdminResult<Option<LocateInfo>> {
  let entries = if driver.server_protocol().await < LEGACY_PROTOCOL_CUTOFF {
    let result = legacy_fallback(driver, path).await;
    driver.go_back_to_redirector().await;
    result?
  } else {
    let pred = move |info: &LocateInfo| !writable || info.writable;
    traverse(driver, path, false, Some(&pred)).await?
  };

  Ok(select_writable(&entries, writable))
}

fn select_writable(entries: &[LocateInfo], writable: bool) -> Option<LocateInfo> {
  entries
    .iter()
    .find(|e| is_data_server(e) && (!writable || e.writable))
    .cloned()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::endpoint::{Endpoint, Host};
  use crate::test_support::FakeDriver;

  fn ep(host: &str, port: u16) -> Endpoint {
    Endpoint::new(Host::Domain(host.into()), port)
  }

  #[tokio::test]
  async fn traversal_resolves_writable_data_server() {
    let m0 = ep("m0.example.com", 1094);
    let m1 = ep("m1.example.com", 1094);
    let m2 = ep("m2.example.com", 1094);

    let fake = Arc::new(FakeDriver::new());
    fake.connect(&m0).await.unwrap();
    fake
      .script_response(
        &m0,
        "LocalLocate",
        Ok(b"Mw[::m1.example.com]:1094 Mw[::m2.example.com]:1094".to_vec()),
      )
      .await;
    fake
      .script_response(
        &m1,
        "LocalLocate",
        Ok(b"Sw[::d1.example.com]:1095 Sr[::d2.example.com]:1095".to_vec()),
      )
      .await;
    fake
      .script_response(&m2, "LocalLocate", Ok(b"Sr[::d3.example.com]:1095".to_vec()))
      .await;

    let driver: Arc<dyn ConnectionDriver> = fake.clone();

    let found = locate_one(&driver, "/x", true).await.unwrap();
    assert_eq!(found.unwrap().host_port, "d1.example.com:1095");
    assert_eq!(driver.current_url().await, m0);
  }

  #[tokio::test]
  async fn locate_all_returns_every_data_server_no_managers() {
    let m0 = ep("m0.example.com", 1094);
    let m1 = ep("m1.example.com", 1094);
    let m2 = ep("m2.example.com", 1094);

    let fake = Arc::new(FakeDriver::new());
    fake.connect(&m0).await.unwrap();
    fake
      .script_response(
        &m0,
        "LocalLocate",
        Ok(b"Mw[::m1.example.com]:1094 Mw[::m2.example.com]:1094".to_vec()),
      )
      .await;
    fake
      .script_response(
        &m1,
        "LocalLocate",
        Ok(b"Sw[::d1.example.com]:1095 Sr[::d2.example.com]:1095".to_vec()),
      )
      .await;
    fake
      .script_response(&m2, "LocalLocate", Ok(b"Sr[::d3.example.com]:1095".to_vec()))
      .await;

    let driver: Arc<dyn ConnectionDriver> = fake.clone();

    let all = locate_all(&driver, "/x").await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(is_data_server));
    assert_eq!(driver.current_url().await, m0);
  }

  #[tokio::test]
  async fn depth_exceeded_is_a_hard_error_and_rewinds() {
    let m0 = ep("m0.example.com", 1094);
    let fake = Arc::new(FakeDriver::new());
    fake.connect(&m0).await.unwrap();
    // Every level re-reports the same single manager, so the loop never
    // terminates on an empty `stop` and must hit the depth cap.
    for _ in 0..6 {
      fake
        .script_response(&m0, "LocalLocate", Ok(b"Mw[::m0.example.com]:1094".to_vec()))
        .await;
    }

    let driver: Arc<dyn ConnectionDriver> = fake.clone();
    let result = locate_all(&driver, "/x").await;
    assert!(matches!(result, Err(AdminError::TooManyLevels)));
    assert_eq!(driver.current_url().await, m0);
  }

  #[tokio::test]
  async fn legacy_protocol_synthesizes_single_data_server() {
    let m0 = ep("m0.example.com", 1094);
    let fake = Arc::new(FakeDriver::new());
    fake.connect(&m0).await.unwrap();
    fake.set_server_protocol(0x100).await;
    fake
      .script_response(&m0, "Stat", Ok(b"0 1024 0 0".to_vec()))
      .await;

    let driver: Arc<dyn ConnectionDriver> = fake.clone();
    let all = locate_all(&driver, "/x").await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].host_port, "m0.example.com:1094");
    assert_eq!(driver.current_url().await, m0);
  }
}
