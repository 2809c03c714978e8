use std::convert::TryFrom;

use crate::error::AdminError;
use rand::seq::SliceRandom;
use rand::thread_rng;
use url::Url;

/// A resolvable host, mirroring the teacher's `conn::Host` three-way split
/// between a domain name and the two IP families.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Host {
  Domain(String),
  V4(std::net::Ipv4Addr),
  V6(std::net::Ipv6Addr),
}

impl std::fmt::Display for Host {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Host::Domain(d) => write!(f, "{}", d),
      Host::V4(ip) => write!(f, "{}", ip),
      Host::V6(ip) => write!(f, "{}", ip),
    }
  }
}

impl From<url::Host<&str>> for Host {
  fn from(h: url::Host<&str>) -> Self {
    match h {
      url::Host::Domain(s) => Host::Domain(s.to_owned()),
      url::Host::Ipv4(ip) => Host::V4(ip),
      url::Host::Ipv6(ip) => Host::V6(ip),
    }
  }
}

/// A single candidate (host, port) pair, with the optional user/token
/// prefix an xrootd URL may carry (`root://user@host:port/path`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
  pub host: Host,
  pub port: u16,
  pub user: Option<String>,
  pub token: Option<String>,
}

impl Endpoint {
  pub fn new(host: Host, port: u16) -> Self {
    Self {
      host,
      port,
      user: None,
      token: None,
    }
  }

  /// `host:port`, the comparison key used throughout the spec (`HostWPort`).
  pub fn host_with_port(&self) -> String {
    format!("{}:{}", self.host, self.port)
  }

  /// Parses a `host:port` token as produced by a locate response.
  pub fn parse_host_port(s: &str) -> Result<Self, AdminError> {
    let (host, port) = s.rsplit_once(':').ok_or(AdminError::InvalidUrl)?;
    let port: u16 = port.parse().map_err(|_| AdminError::InvalidUrl)?;
    let host = if let Ok(ip) = host.parse::<std::net::Ipv4Addr>() {
      Host::V4(ip)
    } else if let Ok(ip) = host.parse::<std::net::Ipv6Addr>() {
      Host::V6(ip)
    } else {
      Host::Domain(host.to_owned())
    };
    Ok(Self::new(host, port))
  }
}

impl TryFrom<&Url> for Endpoint {
  type Error = AdminError;

  fn try_from(url: &Url) -> Result<Self, Self::Error> {
    let host = url.host().map(Host::from).ok_or(AdminError::InvalidUrl)?;
    let port = url.port().unwrap_or(1094);
    let user = {
      let u = url.username();
      if u.is_empty() {
        None
      } else {
        Some(u.to_owned())
      }
    };
    let token = url.password().map(str::to_owned);
    Ok(Self {
      host,
      port,
      user,
      token,
    })
  }
}

/// The randomly-sampled, only-ever-shrinking pool of candidate endpoints
/// the connect loop draws from. Expanded once from the user's initial URL
/// (a `url` crate host-list such as `root://a.example.com,b.example.com//path`
/// would be expanded by the caller into one `Endpoint` per host before
/// construction; this type itself only manages the draw/erase bookkeeping).
#[derive(Debug, Default)]
pub struct EndpointSet {
  endpoints: Vec<Endpoint>,
}

impl EndpointSet {
  pub fn new(endpoints: Vec<Endpoint>) -> Self {
    Self { endpoints }
  }

  /// Builds a set from a single URL string, failing the way the reference
  /// client's `XrdClientUrlSet` does on an unparsable URL.
  pub fn from_url_str(raw: &str) -> Result<Self, AdminError> {
    let url = Url::parse(raw).map_err(|_| AdminError::InvalidUrl)?;
    let endpoint = Endpoint::try_from(&url)?;
    Ok(Self::new(vec![endpoint]))
  }

  pub fn len(&self) -> usize {
    self.endpoints.len()
  }

  pub fn is_empty(&self) -> bool {
    self.endpoints.is_empty()
  }

  /// No-op rewind kept for fidelity with the reference's `Rewind()`; this
  /// port doesn't track a read cursor, only a shrinking pool, so there is
  /// nothing to reset.
  pub fn rewind(&mut self) {}

  /// Draws and returns a uniformly random endpoint without removing it.
  pub fn random(&self) -> Option<&Endpoint> {
    self.endpoints.choose(&mut thread_rng())
  }

  pub fn erase(&mut self, endpoint: &Endpoint) {
    self.endpoints.retain(|e| e != endpoint);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_host_port_token() {
    let ep = Endpoint::parse_host_port("d1.example.com:1095").unwrap();
    assert_eq!(ep.host_with_port(), "d1.example.com:1095");
  }

  #[test]
  fn rejects_token_without_port() {
    assert!(Endpoint::parse_host_port("d1.example.com").is_err());
  }

  #[test]
  fn endpoint_set_only_shrinks() {
    let a = Endpoint::new(Host::Domain("a".into()), 1);
    let b = Endpoint::new(Host::Domain("b".into()), 2);
    let mut set = EndpointSet::new(vec![a.clone(), b.clone()]);
    assert_eq!(set.len(), 2);
    set.erase(&a);
    assert_eq!(set.len(), 1);
    assert_eq!(set.random(), Some(&b));
  }

  #[test]
  fn invalid_url_is_rejected() {
    assert!(EndpointSet::from_url_str("not a url").is_err());
  }
}
