//! Binary request/response framing for the admin protocol.
//!
//! Every frame is a fixed header (stream-id, request-id, a request-specific
//! body) followed by an optional variable-length data segment. All
//! multi-byte fields are network byte order, which is exactly what
//! `bytes::Buf`/`BufMut`'s un-suffixed getters/putters already do.

pub mod request;
pub mod response;

pub use request::{LocateOptions, ModeBits, PrepareOptions, Request, RequestId, StatOptions};
pub use response::{
  parse_locate_token, AttnAction, AttnBody, LocateInfo, LocateInfoType, ResponseStatus,
  ServerResponse, StatXFlags,
};

/// Every outgoing request carries a 16-bit stream-id assigned by the
/// driver; it is the multiplexing key responses are matched against.
pub type StreamId = u16;
