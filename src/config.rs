use std::env;
use std::time::Duration;

const ENV_DEBUG_LEVEL: &str = "XrdClientDebugLevel";
const ENV_FIRST_CONNECT_MAX_CNT: &str = "FirstConnectMaxCnt";
const ENV_RECONNECT_TIMEOUT: &str = "ReconnectTimeout";

const DEFAULT_FIRST_CONNECT_MAX_CNT: u32 = 15;
const DEFAULT_RECONNECT_TIMEOUT_SECS: u64 = 15;

/// Process configuration read once from the environment and threaded
/// explicitly from then on — see the "Globals" design note.
#[derive(Debug, Clone, Copy)]
pub struct Config {
  pub debug_level: log::LevelFilter,
  pub first_connect_max_cnt: u32,
  pub reconnect_timeout: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      debug_level: log::LevelFilter::Info,
      first_connect_max_cnt: DEFAULT_FIRST_CONNECT_MAX_CNT,
      reconnect_timeout: Duration::from_secs(DEFAULT_RECONNECT_TIMEOUT_SECS),
    }
  }
}

impl Config {
  /// Reads the three environment variables this core recognizes, falling
  /// back to defaults for anything unset or unparsable.
  pub fn from_env() -> Self {
    let mut cfg = Self::default();

    if let Ok(raw) = env::var(ENV_DEBUG_LEVEL) {
      if let Some(level) = level_from_xrd_debug(&raw) {
        cfg.debug_level = level;
      }
    }

    if let Ok(raw) = env::var(ENV_FIRST_CONNECT_MAX_CNT) {
      if let Ok(n) = raw.parse() {
        cfg.first_connect_max_cnt = n;
      }
    }

    if let Ok(raw) = env::var(ENV_RECONNECT_TIMEOUT) {
      if let Ok(secs) = raw.parse() {
        cfg.reconnect_timeout = Duration::from_secs(secs);
      }
    }

    cfg
  }
}

/// `XrdClientDebugLevel` is historically a small integer (-1 quiet, 0 normal,
/// 1 user debug, 2 high debug, 3 dump); map it onto `log::LevelFilter` so the
/// rest of the crate can just use the `log` macros.
fn level_from_xrd_debug(raw: &str) -> Option<log::LevelFilter> {
  let n: i32 = raw.parse().ok()?;
  Some(match n {
    i32::MIN..=-1 => log::LevelFilter::Off,
    0 => log::LevelFilter::Info,
    1 => log::LevelFilter::Debug,
    _ => log::LevelFilter::Trace,
  })
}
