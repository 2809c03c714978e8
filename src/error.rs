use std::io;

/// The server errnum the protocol uses for a failed login/auth handshake
/// (`kXR_NotAuthorized`), the one error the connect loop treats specially.
pub const NOT_AUTHORIZED: i32 = 3010;

/// Errors raised while decoding bytes off the wire, below the level of any
/// particular operation.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
  #[error("failed due to IO error")]
  Io(#[from] io::Error),
  #[error("malformed response: {0}")]
  Malformed(String),
  #[error("unknown request/response tag: {0}")]
  UnknownTag(u16),
}

/// Errors surfaced by `AdminClient` and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
  #[error("failed due to IO error")]
  Io(#[from] io::Error),

  #[error("wire error")]
  Wire(#[from] WireError),

  #[error("the URL provided is incorrect")]
  InvalidUrl,

  #[error("access denied to all URL domains requested")]
  AllDomainsDenied,

  #[error("authentication failure: {0}")]
  AuthenticationFailure(String),

  #[error("unable to connect to any endpoint in the configured set")]
  ConnectExhausted,

  #[error("server error {errnum}: {errmsg}")]
  Server { errnum: i32, errmsg: String },

  #[error("the cluster exposes too many levels")]
  TooManyLevels,

  #[error("not connected")]
  NotConnected,

  #[error("connection closed by peer")]
  ConnectionClosed,

  #[error("request timed out")]
  Timeout,

  #[error("operation aborted: {0}")]
  Aborted(String),
}

pub type AdminResult<T> = Result<T, AdminError>;
