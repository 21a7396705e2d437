//! Length-prefixed frame codec.
//!
//! Every stream the bridge touches carries `[u32 little-endian length][payload]`.
//! [`FrameCodec`] plugs into `FramedRead`/`FramedWrite` for the long-running
//! pumps; [`read_frame`] and [`encode_frame`] are the one-shot equivalents.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec, LengthDelimitedCodecError};

use super::protocol::{LENGTH_PREFIX_LEN, MAX_FRAME_LEN};

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Declared length exceeds the maximum; the payload is never read.
    #[error("frame too large ({len} > {max} bytes)")]
    TooLarge { len: usize, max: usize },
    /// The underlying stream failed or closed mid-frame.
    #[error("frame I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// True when the stream simply ended (peer or host went away).
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

fn declared_len(prefix: [u8; LENGTH_PREFIX_LEN], max: usize) -> Result<usize, FrameError> {
    let len = u32::from_le_bytes(prefix) as usize;
    if len > max {
        return Err(FrameError::TooLarge { len, max });
    }
    Ok(len)
}

fn length_delimited(max_frame_len: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .little_endian()
        .length_field_length(LENGTH_PREFIX_LEN)
        .max_frame_length(max_frame_len)
        .new_codec()
}

fn is_oversize(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.is::<LengthDelimitedCodecError>())
}

/// Codec for native messaging frames.
///
/// Wraps a little-endian [`LengthDelimitedCodec`] and reports an oversized
/// prefix as [`FrameError::TooLarge`] with the declared length.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
    max_frame_len: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            inner: length_delimited(MAX_FRAME_LEN),
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.inner = length_delimited(max);
        self.max_frame_len = max;
        self
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src) {
            Ok(Some(payload)) => {
                tracing::trace!(len = payload.len(), "Decoded frame");
                Ok(Some(payload.freeze()))
            }
            Ok(None) => Ok(None),
            // The inner codec rejects before consuming, so the prefix is still at the front.
            Err(e) if is_oversize(&e) && src.len() >= LENGTH_PREFIX_LEN => {
                let mut prefix = [0u8; LENGTH_PREFIX_LEN];
                prefix.copy_from_slice(&src[..LENGTH_PREFIX_LEN]);
                Err(declared_len(prefix, self.max_frame_len)
                    .err()
                    .unwrap_or(FrameError::Io(e)))
            }
            Err(e) => Err(FrameError::Io(e)),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.len();
        if len > self.max_frame_len {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        self.inner.encode(item, dst)?;
        Ok(())
    }
}

/// Encode a single payload as a frame.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::new();
    FrameCodec::new().encode(Bytes::copy_from_slice(payload), &mut buf)?;
    Ok(buf.freeze())
}

/// Read exactly one frame from `reader`.
///
/// Short reads are retried until the prefix and payload are complete. An
/// oversized length fails after consuming only the 4-byte prefix.
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    reader.read_exact(&mut prefix).await?;
    let len = declared_len(prefix, MAX_FRAME_LEN)?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}
