//! Length-prefixed frame codec.
//!
//! Layout on the wire:
//!
//! ```text
//! [header: header_width bytes, ASCII decimal, left-justified, space-padded]
//! [payload: exactly <header> bytes]
//! ```
//!
//! e.g. a 42-byte payload behind the default 16-byte header is preceded by
//! `"42              "`.
//!
//! # Invariants
//!
//! - Width Agreement: both ends of a connection use the same header width for
//!   the lifetime of the connection. A mismatch desynchronises the stream and
//!   surfaces as [`FramingError::InvalidHeader`] on the next read.
//! - Exact Size: a frame read returns exactly the advertised number of bytes
//!   or fails; short reads are never returned as payloads.
//! - Size Limit: payloads above [`FrameCodec::max_payload`] are rejected on
//!   write and rejected on read before any payload buffer is allocated.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::FramingError;

/// Header width used by every Parley peer unless configured otherwise.
pub const DEFAULT_HEADER_WIDTH: usize = 16;

/// Largest payload accepted by default (16 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Frame encoder/decoder for a fixed header width.
///
/// Cheap to copy; each connection half usually holds its own copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    header_width: usize,
    max_payload: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self { header_width: DEFAULT_HEADER_WIDTH, max_payload: DEFAULT_MAX_PAYLOAD }
    }
}

impl FrameCodec {
    /// Codec with the given header width and the default payload limit.
    ///
    /// # Errors
    ///
    /// - `FramingError::InvalidHeaderWidth` if `header_width` is zero
    pub fn new(header_width: usize) -> Result<Self, FramingError> {
        if header_width == 0 {
            return Err(FramingError::InvalidHeaderWidth(header_width));
        }

        Ok(Self { header_width, max_payload: DEFAULT_MAX_PAYLOAD })
    }

    /// Replace the payload size limit.
    #[must_use]
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Width of the length header in bytes.
    pub fn header_width(&self) -> usize {
        self.header_width
    }

    /// Largest payload this codec reads or writes.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Render the length header for a payload of `len` bytes.
    ///
    /// # Errors
    ///
    /// - `FramingError::PayloadTooLarge` if `len` exceeds the payload limit
    /// - `FramingError::LengthOverflow` if `len` has more decimal digits than
    ///   the header width
    pub fn encode_header(&self, len: usize) -> Result<Vec<u8>, FramingError> {
        if len > self.max_payload {
            return Err(FramingError::PayloadTooLarge { size: len, max: self.max_payload });
        }

        let digits = len.to_string();
        if digits.len() > self.header_width {
            return Err(FramingError::LengthOverflow { len, width: self.header_width });
        }

        let header = format!("{digits:<width$}", width = self.header_width);
        debug_assert_eq!(header.len(), self.header_width);

        Ok(header.into_bytes())
    }

    /// Parse a length header.
    ///
    /// Surrounding ASCII whitespace is ignored, so both space padding and a
    /// right-justified peer parse the same way.
    ///
    /// # Errors
    ///
    /// - `FramingError::InvalidHeader` if the trimmed header is empty or not
    ///   an unsigned decimal integer
    /// - `FramingError::PayloadTooLarge` if the length exceeds the limit
    pub fn decode_header(&self, header: &[u8]) -> Result<usize, FramingError> {
        let invalid =
            || FramingError::InvalidHeader { header: String::from_utf8_lossy(header).into_owned() };

        let text = std::str::from_utf8(header).map_err(|_| invalid())?;
        let len: usize = text.trim_ascii().parse().map_err(|_| invalid())?;

        if len > self.max_payload {
            return Err(FramingError::PayloadTooLarge { size: len, max: self.max_payload });
        }

        Ok(len)
    }

    /// Encode header and payload into one contiguous buffer.
    pub fn encode_frame(&self, payload: &[u8]) -> Result<Vec<u8>, FramingError> {
        let mut buf = self.encode_header(payload.len())?;
        buf.extend_from_slice(payload);
        Ok(buf)
    }

    /// Write one frame and flush.
    ///
    /// Header and payload go out in a single `write_all` so concurrent
    /// writers serialised by the caller never interleave partial frames.
    pub async fn write_frame<W>(&self, writer: &mut W, payload: &[u8]) -> Result<(), FramingError>
    where
        W: AsyncWrite + Unpin,
    {
        let buf = self.encode_frame(payload)?;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one frame, waiting until the whole payload has arrived.
    ///
    /// # Errors
    ///
    /// - `FramingError::Closed` if the stream ends before any header byte
    /// - `FramingError::TruncatedHeader` / `TruncatedPayload` if the stream
    ///   ends part way through a frame
    /// - `FramingError::InvalidHeader` / `PayloadTooLarge` from the header
    /// - `FramingError::Io` for any other stream failure
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Bytes, FramingError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = vec![0u8; self.header_width];
        let filled = read_full(reader, &mut header).await?;

        if filled == 0 {
            return Err(FramingError::Closed);
        }
        if filled < self.header_width {
            return Err(FramingError::TruncatedHeader {
                expected: self.header_width,
                actual: filled,
            });
        }

        let len = self.decode_header(&header)?;

        let mut payload = BytesMut::zeroed(len);
        let filled = read_full(reader, &mut payload).await?;
        if filled < len {
            return Err(FramingError::TruncatedPayload { expected: len, actual: filled });
        }

        Ok(payload.freeze())
    }
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
///
/// Returns the number of bytes read; less than `buf.len()` means EOF.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[test]
    fn header_is_left_justified_and_space_padded() {
        let codec = FrameCodec::default();
        let header = codec.encode_header(42).unwrap();

        assert_eq!(header.len(), DEFAULT_HEADER_WIDTH);
        assert_eq!(header, b"42              ");
    }

    #[test]
    fn header_width_zero_rejected() {
        assert!(matches!(FrameCodec::new(0), Err(FramingError::InvalidHeaderWidth(0))));
    }

    #[test]
    fn length_wider_than_header_rejected() {
        let codec = FrameCodec::new(2).unwrap();

        assert!(codec.encode_header(99).is_ok());
        assert!(matches!(
            codec.encode_header(100),
            Err(FramingError::LengthOverflow { len: 100, width: 2 })
        ));
    }

    #[test]
    fn decode_header_accepts_padding_on_either_side() {
        let codec = FrameCodec::new(6).unwrap();

        assert_eq!(codec.decode_header(b"17    ").unwrap(), 17);
        assert_eq!(codec.decode_header(b"    17").unwrap(), 17);
        assert_eq!(codec.decode_header(b"0     ").unwrap(), 0);
    }

    #[test]
    fn decode_header_rejects_garbage() {
        let codec = FrameCodec::new(4).unwrap();

        for header in [&b"    "[..], b"abcd", b"-1  ", b"1 2 ", b"\xff\xfe  "] {
            assert!(
                matches!(codec.decode_header(header), Err(FramingError::InvalidHeader { .. })),
                "header {header:?} should be rejected"
            );
        }
    }

    #[test]
    fn decode_header_enforces_limit() {
        let codec = FrameCodec::default().with_max_payload(10);
        assert_eq!(codec.max_payload(), 10);
        assert_eq!(FrameCodec::default().max_payload(), DEFAULT_MAX_PAYLOAD);

        assert_eq!(codec.decode_header(b"10").unwrap(), 10);
        assert!(matches!(
            codec.decode_header(b"11"),
            Err(FramingError::PayloadTooLarge { size: 11, max: 10 })
        ));
    }

    #[tokio::test]
    async fn write_then_read_frame() {
        let codec = FrameCodec::default();
        let (mut client, mut server) = duplex(1024);

        codec.write_frame(&mut client, b"hello").await.unwrap();
        codec.write_frame(&mut client, b"").await.unwrap();
        codec.write_frame(&mut client, b"world").await.unwrap();

        assert_eq!(codec.read_frame(&mut server).await.unwrap(), &b"hello"[..]);
        assert_eq!(codec.read_frame(&mut server).await.unwrap(), &b""[..]);
        assert_eq!(codec.read_frame(&mut server).await.unwrap(), &b"world"[..]);
    }

    #[tokio::test]
    async fn read_reports_clean_close_at_frame_boundary() {
        let codec = FrameCodec::default();
        let (mut client, mut server) = duplex(1024);

        codec.write_frame(&mut client, b"last").await.unwrap();
        drop(client);

        assert_eq!(codec.read_frame(&mut server).await.unwrap(), &b"last"[..]);
        let err = codec.read_frame(&mut server).await.unwrap_err();
        assert!(err.is_clean_close());
    }

    #[tokio::test]
    async fn read_reports_truncated_header() {
        let codec = FrameCodec::default();
        let (mut client, mut server) = duplex(1024);

        client.write_all(b"12  ").await.unwrap();
        drop(client);

        let err = codec.read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, FramingError::TruncatedHeader { expected: 16, actual: 4 }));
    }

    #[tokio::test]
    async fn read_reports_truncated_payload() {
        let codec = FrameCodec::default();
        let (mut client, mut server) = duplex(1024);

        let header = codec.encode_header(10).unwrap();
        client.write_all(&header).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        let err = codec.read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, FramingError::TruncatedPayload { expected: 10, actual: 3 }));
    }

    #[tokio::test]
    async fn write_rejects_oversized_payload() {
        let codec = FrameCodec::default().with_max_payload(4);
        let (mut client, _server) = duplex(1024);

        let err = codec.write_frame(&mut client, b"too long").await.unwrap_err();
        assert!(matches!(err, FramingError::PayloadTooLarge { size: 8, max: 4 }));
    }

    #[tokio::test]
    async fn payload_larger_than_pipe_buffer_is_reassembled() {
        let codec = FrameCodec::default();
        let (mut client, mut server) = duplex(64);
        let payload = vec![0x5Au8; 10_000];

        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            codec.write_frame(&mut client, &payload).await.unwrap();
        });

        let received = codec.read_frame(&mut server).await.unwrap();
        writer.await.unwrap();

        assert_eq!(received.len(), expected.len());
        assert_eq!(&received[..], &expected[..]);
    }
}
