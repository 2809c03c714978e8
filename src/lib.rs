//! Administrative client core for a clustered xrootd-style object storage
//! service: typed request/response framing, an unsolicited-message state
//! machine, and a cluster-wide locate traversal, built around a
//! `ConnectionDriver` collaborator that owns the actual socket.

pub mod admin;
pub mod batch;
pub mod buf_ext;
pub mod config;
pub mod connect;
pub mod dispatcher;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod locate;
pub mod ops;
pub mod util;
pub mod wire;

#[cfg(test)]
mod test_support;

pub use admin::AdminClient;
pub use config::Config;
pub use error::{AdminError, AdminResult};
