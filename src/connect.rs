//! The connection establishment loop (§4.1): randomized, bounded retry
//! across an endpoint set, with domain filtering and auth-terminal
//! handling.

use std::sync::Arc;

use crate::config::Config;
use crate::driver::{ConnectionDriver, ServerType};
use crate::endpoint::EndpointSet;
use crate::error::{AdminError, AdminResult, NOT_AUTHORIZED};

/// Runs the connect loop against `driver`, drawing candidates from
/// `endpoints`. Idempotent: returns immediately if already connected.
pub async fn connect(
  driver: &Arc<dyn ConnectionDriver>,
  endpoints: &mut EndpointSet,
  config: &Config,
) -> AdminResult<()> {
  if driver.is_connected().await {
    return Ok(());
  }

  if endpoints.is_empty() {
    return Err(AdminError::InvalidUrl);
  }

  // `initial_size` is the candidate count the "all endpoints tried"
  // auth-terminal check is measured against (§4.1 step 4); `max_tries` is
  // the unrelated, overall `FIRSTCONNECTMAXCNT` attempt budget. Conflating
  // the two would make a 2-endpoint set that always returns NOT_AUTHORIZED
  // retry 15 times instead of failing terminally after 2.
  let initial_size = endpoints.len() as u32;
  let max_tries = config.first_connect_max_cnt.max(1);
  let mut tried = 0u32;
  let mut endpoints_tried = 0u32;

  loop {
    if tried >= max_tries {
      break;
    }

    let endpoint = loop {
      if endpoints.is_empty() {
        log::error!("connect: access denied to all URL domains requested");
        return Err(AdminError::AllDomainsDenied);
      }
      let candidate = endpoints.random().cloned().expect("checked non-empty above");
      if driver.check_host_domain(&candidate.host) {
        break candidate;
      }
      log::debug!("connect: rejecting {} (domain filter)", candidate.host_with_port());
      endpoints.erase(&candidate);
    };

    tried += 1;
    endpoints_tried += 1;
    log::debug!(
      "connect: trying {} (attempt {}/{})",
      endpoint.host_with_port(),
      tried,
      max_tries
    );

    if driver.connect(&endpoint).await.is_ok() {
      match driver.get_access_to_srv().await {
        Ok(()) => {
          log::info!("connect: access to {} granted", endpoint.host_with_port());

          let server_type = driver.server_type().await;
          match server_type {
            ServerType::Unknown => {
              driver.disconnect(true).await;
              log::error!("connect: server at {} is of unknown type", endpoint.host_with_port());
              return Err(AdminError::ConnectExhausted);
            }
            ServerType::Rootd => {
              // May be reused elsewhere; leave the physical connection
              // open but report Connect as failed for this core.
              return Err(AdminError::ConnectExhausted);
            }
            ServerType::XrootdDataServer | ServerType::XrootdManager => {
              return Ok(());
            }
          }
        }
        Err(AdminError::Server { errnum, errmsg }) if errnum == NOT_AUTHORIZED => {
          if endpoints_tried >= initial_size {
            driver.disconnect(true).await;
            let msg = errmsg.trim_end_matches(['\0', '\n', '\r']).to_owned();
            log::error!("connect: authentication failure: {}", msg);
            return Err(AdminError::AuthenticationFailure(msg));
          }
          log::debug!("connect: auth failed for {}, trying next endpoint", endpoint.host_with_port());
          driver.disconnect(true).await;
        }
        Err(e) => {
          log::debug!("connect: access to {} failed: {}", endpoint.host_with_port(), e);
          driver.disconnect(true).await;
        }
      }
    } else {
      log::debug!("connect: transport connect to {} failed", endpoint.host_with_port());
    }

    if tried < max_tries {
      log::info!(
        "connect: attempt failed, sleeping {:?} before retry",
        config.reconnect_timeout
      );
      tokio::time::sleep(config.reconnect_timeout).await;
    }
  }

  Err(AdminError::ConnectExhausted)
}
