//! Primitive MYSQL wire types.
//!
//! Reads never go past the end of the supplied buffer: running out of bytes yields
//! `DriverError::IncompleteMessage` and the cursor must not be reused afterwards.
//! https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_data_types.html

use super::error::{DriverError, DriverResult};
use bytes::{Buf, BufMut, Bytes};

/// First byte of a length-encoded integer holding a 2-byte value.
pub const LENC_PREFIX_U16: u8 = 0xFC;
/// First byte of a length-encoded integer holding a 3-byte value.
pub const LENC_PREFIX_U24: u8 = 0xFD;
/// First byte of a length-encoded integer holding an 8-byte value.
pub const LENC_PREFIX_U64: u8 = 0xFE;
/// NULL marker in text rows, never a valid length-encoded integer.
pub const LENC_NULL: u8 = 0xFB;

pub trait BufExt: Buf {
  fn ensure_remaining(&self, len: usize) -> DriverResult<()> {
    if self.remaining() >= len {
      Ok(())
    } else {
      Err(DriverError::IncompleteMessage)
    }
  }

  fn safe_get_u8(&mut self) -> DriverResult<u8> {
    self.ensure_remaining(1)?;
    Ok(self.get_u8())
  }

  fn safe_get_i8(&mut self) -> DriverResult<i8> {
    self.ensure_remaining(1)?;
    Ok(self.get_i8())
  }

  fn safe_get_u16_le(&mut self) -> DriverResult<u16> {
    self.ensure_remaining(2)?;
    Ok(self.get_u16_le())
  }

  fn safe_get_i16_le(&mut self) -> DriverResult<i16> {
    self.ensure_remaining(2)?;
    Ok(self.get_i16_le())
  }

  fn safe_get_u32_le(&mut self) -> DriverResult<u32> {
    self.ensure_remaining(4)?;
    Ok(self.get_u32_le())
  }

  fn safe_get_i32_le(&mut self) -> DriverResult<i32> {
    self.ensure_remaining(4)?;
    Ok(self.get_i32_le())
  }

  fn safe_get_u64_le(&mut self) -> DriverResult<u64> {
    self.ensure_remaining(8)?;
    Ok(self.get_u64_le())
  }

  fn safe_get_i64_le(&mut self) -> DriverResult<i64> {
    self.ensure_remaining(8)?;
    Ok(self.get_i64_le())
  }

  fn safe_get_f32_le(&mut self) -> DriverResult<f32> {
    self.ensure_remaining(4)?;
    Ok(self.get_f32_le())
  }

  fn safe_get_f64_le(&mut self) -> DriverResult<f64> {
    self.ensure_remaining(8)?;
    Ok(self.get_f64_le())
  }

  // Little endian unsigned integer of `nbytes` bytes (1 to 8), used for the 3 and 6 byte widths.
  fn safe_get_uint_le(&mut self, nbytes: usize) -> DriverResult<u64> {
    self.ensure_remaining(nbytes)?;
    Ok(self.get_uint_le(nbytes))
  }

  fn safe_get_lenc_uint(&mut self) -> DriverResult<u64> {
    match self.safe_get_u8()? {
      LENC_PREFIX_U16 => self.safe_get_uint_le(2),
      LENC_PREFIX_U24 => self.safe_get_uint_le(3),
      LENC_PREFIX_U64 => self.safe_get_uint_le(8),
      x @ (LENC_NULL | 0xFF) => Err(DriverError::MalformedPacket(format!(
        "invalid length-encoded integer prefix {:#04X}",
        x
      ))),
      x => Ok(x as u64),
    }
  }

  fn safe_get_fixed_bytes(&mut self, len: usize) -> DriverResult<Bytes> {
    self.ensure_remaining(len)?;
    Ok(self.copy_to_bytes(len))
  }

  // Consumes the terminating \0, which is not part of the returned bytes.
  fn safe_get_null_terminated_bytes(&mut self) -> DriverResult<Bytes> {
    let len = self
      .chunk()
      .iter()
      .position(|x| *x == 0x00)
      .ok_or(DriverError::IncompleteMessage)?;
    let bytes = self.copy_to_bytes(len);
    self.advance(1);
    Ok(bytes)
  }

  fn safe_get_lenc_bytes(&mut self) -> DriverResult<Bytes> {
    let len = self.safe_get_lenc_uint()?;
    let len = usize::try_from(len).map_err(|_| DriverError::IncompleteMessage)?;
    self.safe_get_fixed_bytes(len)
  }

  fn safe_get_eof_bytes(&mut self) -> DriverResult<Bytes> {
    let len = self.remaining();
    Ok(self.copy_to_bytes(len))
  }

  // Returns a utf-8 encoded string of length N, where N are in bytes.
  fn safe_get_fixed_length_string(&mut self, len: usize) -> DriverResult<String> {
    self.safe_get_fixed_bytes(len).and_then(into_string)
  }

  fn safe_get_null_terminated_string(&mut self) -> DriverResult<String> {
    self.safe_get_null_terminated_bytes().and_then(into_string)
  }

  fn safe_get_lenc_string(&mut self) -> DriverResult<String> {
    self.safe_get_lenc_bytes().and_then(into_string)
  }

  fn safe_get_eof_string(&mut self) -> DriverResult<String> {
    self.safe_get_eof_bytes().and_then(into_string)
  }
}

// Blanket implementations
impl<T> BufExt for T where T: Buf {}

pub trait BufMutExt: BufMut {
  fn put_lenc_uint(&mut self, x: u64) {
    if x < 251 {
      self.put_u8(x as u8);
    } else if x < 65_536 {
      self.put_u8(LENC_PREFIX_U16);
      self.put_uint_le(x, 2);
    } else if x < 16_777_216 {
      self.put_u8(LENC_PREFIX_U24);
      self.put_uint_le(x, 3);
    } else {
      self.put_u8(LENC_PREFIX_U64);
      self.put_u64_le(x);
    }
  }

  fn put_lenc_bytes(&mut self, bytes: &[u8]) {
    self.put_lenc_uint(bytes.len() as u64);
    self.put_slice(bytes);
  }

  fn put_null_terminated(&mut self, bytes: &[u8]) {
    self.put_slice(bytes);
    self.put_u8(0);
  }
}

impl<T> BufMutExt for T where T: BufMut {}

/// Number of bytes `BufMutExt::put_lenc_uint` writes for `x`.
pub fn lenc_uint_len(x: u64) -> usize {
  match x {
    0..=250 => 1,
    251..=65_535 => 3,
    65_536..=16_777_215 => 4,
    _ => 9,
  }
}

fn into_string(bytes: Bytes) -> DriverResult<String> {
  String::from_utf8(bytes.to_vec())
    .map_err(|err| DriverError::MalformedPacket(format!("invalid utf-8 string: {}", err)))
}
