//! Packet framing.
//!
//! A logical message travels as one or more frames, each prefixed with a 3 byte little endian
//! length and a sequence number. A frame carrying exactly `MAX_FRAME_LEN` bytes announces that
//! another frame follows, so a message whose size is a multiple of `MAX_FRAME_LEN` ends with an
//! empty frame.
//! https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_packets.html

use super::error::{DriverError, DriverResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

pub const MAX_FRAME_LEN: usize = 0xFF_FFFF;
pub const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
  sequence_id: u8,
  payload: Bytes,
}

impl Frame {
  /// Splits one frame off the front of `buffer`, or returns `None` when more bytes are needed.
  pub fn parse(buffer: &mut BytesMut) -> Option<Self> {
    if buffer.len() < FRAME_HEADER_LEN {
      return None;
    }

    let mut header = &buffer[..FRAME_HEADER_LEN];
    let payload_len = header.get_uint_le(3) as usize;
    let sequence_id = header.get_u8();
    if buffer.len() < FRAME_HEADER_LEN + payload_len {
      return None;
    }

    buffer.advance(FRAME_HEADER_LEN);
    let payload = buffer.split_to(payload_len).freeze();
    Some(Self {
      sequence_id,
      payload,
    })
  }

  pub fn sequence_id(&self) -> u8 {
    self.sequence_id
  }

  pub fn payload(&self) -> &Bytes {
    &self.payload
  }

  pub fn is_last(&self) -> bool {
    self.payload.len() < MAX_FRAME_LEN
  }
}

/// Appends the frames carrying `payload` to `dst`, advancing `sequence_id` once per frame.
pub fn encode_frames(payload: &[u8], sequence_id: &mut u8, dst: &mut BytesMut) {
  let frame_count = payload.len() / MAX_FRAME_LEN + 1;
  dst.reserve(payload.len() + frame_count * FRAME_HEADER_LEN);

  let mut rest = payload;
  loop {
    let len = rest.len().min(MAX_FRAME_LEN);
    dst.put_uint_le(len as u64, 3);
    dst.put_u8(*sequence_id);
    dst.put_slice(&rest[..len]);
    *sequence_id = sequence_id.wrapping_add(1);
    rest = &rest[len..];

    if len < MAX_FRAME_LEN {
      break;
    }
  }
}

/// Reads and writes whole messages over a byte stream, keeping track of the sequence number.
#[derive(Debug)]
pub struct Channel<S> {
  stream: S,
  buffer: BytesMut,
  sequence_id: u8,
}

impl<S> Channel<S>
where
  S: AsyncRead + AsyncWrite + Unpin,
{
  pub fn new(stream: S) -> Self {
    Self {
      stream,
      buffer: BytesMut::with_capacity(4 * 1024),
      sequence_id: 0,
    }
  }

  /// Sequence number expected on the next frame, in either direction.
  pub fn sequence_id(&self) -> u8 {
    self.sequence_id
  }

  pub fn reset_sequence_id(&mut self) {
    self.sequence_id = 0;
  }

  pub fn get_ref(&self) -> &S {
    &self.stream
  }

  pub fn get_mut(&mut self) -> &mut S {
    &mut self.stream
  }

  /// Number of bytes received from the stream that were not consumed yet.
  pub fn buffered_len(&self) -> usize {
    self.buffer.len()
  }

  pub async fn write_message(&mut self, payload: &[u8]) -> DriverResult<()> {
    trace!(
      sequence_id = self.sequence_id,
      len = payload.len(),
      ">> {:02X?}",
      dump(payload)
    );

    let mut b = BytesMut::new();
    encode_frames(payload, &mut self.sequence_id, &mut b);
    self.stream.write_all(&b[..]).await?;
    self.stream.flush().await?;
    Ok(())
  }

  pub async fn read_message(&mut self) -> DriverResult<Bytes> {
    let frame = self.read_frame().await?;
    if frame.is_last() {
      trace!(
        sequence_id = frame.sequence_id,
        len = frame.payload.len(),
        "<< {:02X?}",
        dump(&frame.payload)
      );
      return Ok(frame.payload);
    }

    let mut message = BytesMut::from(&frame.payload[..]);
    loop {
      let frame = self.read_frame().await?;
      message.put_slice(&frame.payload[..]);
      if frame.is_last() {
        break;
      }
    }

    trace!(len = message.len(), "<< {:02X?}", dump(&message));
    Ok(message.freeze())
  }

  async fn read_frame(&mut self) -> DriverResult<Frame> {
    loop {
      if let Some(frame) = Frame::parse(&mut self.buffer) {
        self.check_sequence_id(frame.sequence_id)?;
        return Ok(frame);
      }

      // On success, the number of bytes is returned. `0` indicates "end of stream".
      if self.stream.read_buf(&mut self.buffer).await? == 0 {
        if self.buffer.is_empty() {
          return Err(DriverError::ConnectionClosed);
        } else {
          return Err(DriverError::IncompleteMessage);
        }
      }
    }
  }

  fn check_sequence_id(&mut self, sequence_id: u8) -> DriverResult<()> {
    if self.sequence_id != sequence_id {
      return Err(DriverError::SequenceMismatch {
        expected: self.sequence_id,
        actual: sequence_id,
      });
    }

    self.sequence_id = self.sequence_id.wrapping_add(1);
    Ok(())
  }
}

// Keeps trace output readable for large messages.
fn dump(payload: &[u8]) -> &[u8] {
  &payload[..payload.len().min(256)]
}
