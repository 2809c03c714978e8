//! The batch façade (§4.6): bulk prepare, chunked over the single-call
//! `prepare` primitive in `ops`.
//!
//! Existence/online checks (`exist_files`, `exist_dirs`, `is_file_online`)
//! are one-shot vectorized `statx` decodes and live in `ops` next to
//! `sys_statx`, the primitive they share.

use std::sync::Arc;

use crate::driver::ConnectionDriver;
use crate::error::AdminResult;
use crate::ops::prepare_once;
use crate::util::join_window;
use crate::wire::request::PrepareOptions;

/// Below this many paths, `prepare` fires once with the whole list
/// `\n`-joined; at or above it, the reference client iterates in chunks
/// of 50.
const BULK_PREPARE_THRESHOLD: usize = 75;
const CHUNK_SIZE: usize = 50;

/// Bulk `prepare`: a single call for small path lists, otherwise chunked
/// by [`CHUNK_SIZE`] starting at `i = 0, 1, 2, …` — overlapping windows,
/// matching the reference's loop shape (see SPEC_FULL.md §9 for why the
/// windows overlap and how out-of-range windows are handled). Each
/// window is clamped to the vector's bounds; the loop stops as soon as a
/// computed window would be empty, and aborts on the first sub-call
/// failure.
pub async fn prepare(
  driver: &Arc<dyn ConnectionDriver>,
  paths: &[String],
  option: PrepareOptions,
  priority: u8,
) -> AdminResult<()> {
  if paths.len() < BULK_PREPARE_THRESHOLD {
    return prepare_once(driver, paths, option, priority).await;
  }

  let joined: Vec<String> = paths.to_vec();
  let mut i = 0usize;
  loop {
    if i >= joined.len() {
      break;
    }

    let window_end = i + CHUNK_SIZE - 1;
    let chunk = join_window(&joined, i, window_end);
    if chunk.is_empty() {
      break;
    }

    let chunk_paths: Vec<String> = chunk.split('\n').map(str::to_owned).collect();
    prepare_once(driver, &chunk_paths, option, priority).await?;

    i += 1;
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::endpoint::{Endpoint, Host};
  use crate::test_support::FakeDriver;

  fn paths(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("/p{}", i)).collect()
  }

  #[tokio::test]
  async fn small_list_is_a_single_call() {
    let fake = Arc::new(FakeDriver::new());
    let ep = Endpoint::new(Host::Domain("h".into()), 1094);
    fake.connect(&ep).await.unwrap();
    fake.script_response(&ep, "Prepare", Ok(Vec::new())).await;
    let driver: Arc<dyn ConnectionDriver> = fake;

    prepare(&driver, &paths(10), PrepareOptions::empty(), 0).await.unwrap();
  }

  #[tokio::test]
  async fn large_list_chunks_and_stops_on_first_failure() {
    let fake = Arc::new(FakeDriver::new());
    let ep = Endpoint::new(Host::Domain("h".into()), 1094);
    fake.connect(&ep).await.unwrap();
    // First chunk succeeds, second fails; the loop must abort there
    // rather than continuing to the remaining windows.
    fake.script_response(&ep, "Prepare", Ok(Vec::new())).await;
    fake
      .script_response(
        &ep,
        "Prepare",
        Err(crate::error::AdminError::Server {
          errnum: 1,
          errmsg: "nope".into(),
        }),
      )
      .await;
    let driver: Arc<dyn ConnectionDriver> = fake.clone();

    let result = prepare(&driver, &paths(80), PrepareOptions::empty(), 0).await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn chunk_windows_clamp_to_bounds() {
    let items = paths(3);
    assert_eq!(join_window(&items, 0, 49), "/p0\n/p1\n/p2");
    assert_eq!(join_window(&items, 2, 51), "/p2");
    assert_eq!(join_window(&items, 3, 52), "");
  }
}
