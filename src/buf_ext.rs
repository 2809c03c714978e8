use super::util::unexpected_eof;
use bytes::Buf;
use std::io;

/// Extension methods for reading the fixed-layout, network-byte-order
/// fields this protocol uses. `bytes::Buf`'s un-suffixed getters are
/// already big-endian, so this only adds the "safe" (non-panicking)
/// variants the teacher's `BufExt` favors.
pub trait WireExt: Buf {
  fn safe_get_u8(&mut self) -> io::Result<u8> {
    if self.remaining() >= 1 {
      Ok(self.get_u8())
    } else {
      Err(unexpected_eof(format!(
        "expected 1 byte, got {}",
        self.remaining()
      )))
    }
  }

  fn safe_get_u16(&mut self) -> io::Result<u16> {
    if self.remaining() >= 2 {
      Ok(self.get_u16())
    } else {
      Err(unexpected_eof(format!(
        "expected 2 bytes, got {}",
        self.remaining()
      )))
    }
  }

  fn safe_get_u32(&mut self) -> io::Result<u32> {
    if self.remaining() >= 4 {
      Ok(self.get_u32())
    } else {
      Err(unexpected_eof(format!(
        "expected 4 bytes, got {}",
        self.remaining()
      )))
    }
  }

  fn safe_get_fixed(&mut self, len: usize) -> io::Result<Vec<u8>> {
    if self.remaining() >= len {
      let mut bytes = vec![0; len];
      self.copy_to_slice(bytes.as_mut_slice());
      Ok(bytes)
    } else {
      Err(unexpected_eof(format!(
        "expected {} bytes, got {}",
        len,
        self.remaining()
      )))
    }
  }
}

// Blanket implementation, same shape as the teacher's `BufExt`.
impl<T> WireExt for T where T: Buf {}

#[cfg(test)]
mod tests {
  use super::*;
  use bytes::Bytes;

  #[test]
  fn safe_get_u32_is_network_order() {
    let mut b = Bytes::from_static(&[0x00, 0x00, 0x02, 0x90]);
    assert_eq!(b.safe_get_u32().unwrap(), 0x290);
  }

  #[test]
  fn safe_get_u32_reports_short_buffers() {
    let mut b = Bytes::from_static(&[0x00, 0x01]);
    assert!(b.safe_get_u32().is_err());
  }
}
