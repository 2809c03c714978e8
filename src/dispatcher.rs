//! The unsolicited-message state machine (§4.4). Runs on the driver's
//! reader task; must be safe to invoke concurrently with outbound
//! requests, which is why it only ever touches the driver through its
//! `Arc`-shared, internally-synchronized methods.

use async_trait::async_trait;
use std::sync::Arc;

use crate::driver::{apply_attn, ConnectionDriver, UnsolicitedOutcome};
use crate::wire::{parse_attn, AttnAction, AttnBody, ResponseStatus, ServerResponse};

/// The hand-off contract the reader task invokes for every frame it
/// classifies as unsolicited (`kXR_attn` or any non-ok status arriving
/// with no matching pending request).
#[async_trait]
pub trait UnsolicitedDispatcher: Send + Sync {
  async fn process_unsol_msg(&self, msg: ServerResponse);
}

/// The one dispatcher this core ships: it owns no state of its own beyond
/// a handle to the driver it mutates.
pub struct Dispatcher {
  driver: Arc<dyn ConnectionDriver>,
}

impl Dispatcher {
  pub fn new(driver: Arc<dyn ConnectionDriver>) -> Self {
    Self { driver }
  }
}

#[async_trait]
impl UnsolicitedDispatcher for Dispatcher {
  async fn process_unsol_msg(&self, msg: ServerResponse) {
    if msg.status != ResponseStatus::Attn {
      // A non-ok status delivered with no pending request to match is
      // forwarded straight to the driver's async-response path.
      self.driver.process_async_resp(msg.stream_id, msg).await;
      return;
    }

    let (action, body) = match parse_attn(&msg.data) {
      Ok(parsed) => parsed,
      Err(e) => {
        log::warn!("malformed attn message, dropping: {}", e);
        return;
      }
    };

    match (action, body) {
      (AttnAction::AsynResp, AttnBody::AsyncResponse { stream_id, response }) => {
        match self.driver.process_async_resp(stream_id, *response).await {
          UnsolicitedOutcome::Stop => {}
          UnsolicitedOutcome::ContinuePropagate => {
            log::debug!("asynresp for stream {} had no pending request", stream_id);
          }
        }
      }
      (AttnAction::Unknown(code), _) => {
        log::warn!("unknown attn action code {}, propagating", code);
      }
      (action, body) => {
        apply_attn(self.driver.as_ref(), action, body).await;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::FakeDriver;

  #[tokio::test]
  async fn asyncwt_pauses_and_asyncgo_resumes() {
    let fake = Arc::new(FakeDriver::new());
    let dispatcher = Dispatcher::new(fake.clone());

    let mut data = Vec::new();
    data.extend_from_slice(&5002u32.to_be_bytes()); // asyncwt
    data.extend_from_slice(&9u32.to_be_bytes());
    dispatcher
      .process_unsol_msg(ServerResponse {
        stream_id: 0,
        status: ResponseStatus::Attn,
        data,
      })
      .await;
    assert_eq!(fake.pause_state().await, Some(9));

    let mut data = Vec::new();
    data.extend_from_slice(&5003u32.to_be_bytes()); // asyncgo
    dispatcher
      .process_unsol_msg(ServerResponse {
        stream_id: 0,
        status: ResponseStatus::Attn,
        data,
      })
      .await;
    assert_eq!(fake.pause_state().await, Some(0));
  }

  #[tokio::test]
  async fn asyncrd_sets_requested_destination() {
    let fake = Arc::new(FakeDriver::new());
    let dispatcher = Dispatcher::new(fake.clone());

    let mut data = Vec::new();
    data.extend_from_slice(&5001u32.to_be_bytes()); // asyncrd
    data.extend_from_slice(&1095u32.to_be_bytes());
    data.extend_from_slice(b"redirect.example.com");
    dispatcher
      .process_unsol_msg(ServerResponse {
        stream_id: 0,
        status: ResponseStatus::Attn,
        data,
      })
      .await;

    assert_eq!(
      fake.requested_dest().await,
      Some(("redirect.example.com".to_owned(), 1095))
    );
  }

  #[tokio::test]
  async fn asyncdi_arms_delayed_reconnect() {
    let fake = Arc::new(FakeDriver::new());
    let dispatcher = Dispatcher::new(fake.clone());

    let mut data = Vec::new();
    data.extend_from_slice(&5000u32.to_be_bytes()); // asyncdi
    data.extend_from_slice(&5u32.to_be_bytes());
    dispatcher
      .process_unsol_msg(ServerResponse {
        stream_id: 0,
        status: ResponseStatus::Attn,
        data,
      })
      .await;

    assert_eq!(fake.delayed_connect_state().await, Some(5));
  }

  #[tokio::test]
  async fn unknown_action_is_logged_and_dropped() {
    let fake = Arc::new(FakeDriver::new());
    let dispatcher = Dispatcher::new(fake.clone());

    let mut data = Vec::new();
    data.extend_from_slice(&9999u32.to_be_bytes());
    // Should not panic, should leave state untouched.
    dispatcher
      .process_unsol_msg(ServerResponse {
        stream_id: 0,
        status: ResponseStatus::Attn,
        data,
      })
      .await;
    assert_eq!(fake.pause_state().await, None);
  }
}
