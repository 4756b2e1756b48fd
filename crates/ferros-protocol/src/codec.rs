//! Frame codec.
//!
//! Every message on the wire is one JSON document behind a `Content-Length`
//! header:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <JSON body>
//! ```
//!
//! [`FrameCodec`] only does the framing and yields raw bodies; JSON decoding
//! happens in [`crate::wire`]. A `FramedRead` stops for good after its
//! decoder returns an error, so recoverable problems (a bad header, a body
//! that is not a valid message) are yielded as `Err` *items* instead of decoder
//! errors, and the connection keeps going.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// Default maximum frame size (16 MB).
const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Longest header accepted before the `\r\n\r\n` separator.
const MAX_HEADER_SIZE: usize = 1024;

/// One decoded frame: the body, or the recoverable reason it was dropped.
pub type Frame = Result<Bytes, CodecError>;

/// Codec for `Content-Length` framed messages.
#[derive(Debug, Clone)]
pub struct FrameCodec
{
    max_message_size: usize,
    /// Bytes of the pending header already searched for the separator.
    scanned: usize,
}

impl FrameCodec
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::with_max_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Frames larger than `max_message_size`, and headers that run past
    /// 1 KiB without a separator, end the stream with
    /// [`CodecError::MessageTooLarge`].
    #[must_use]
    pub fn with_max_size(max_message_size: usize) -> Self
    {
        Self {
            max_message_size,
            scanned: 0,
        }
    }

    fn header_limit(&self) -> usize
    {
        MAX_HEADER_SIZE.min(self.max_message_size.max(4))
    }
}

impl Default for FrameCodec
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl Decoder for FrameCodec
{
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error>
    {
        // The separator may straddle the previous read, so back up three bytes.
        let from = self.scanned.saturating_sub(3);
        let Some(header_end) = find_header_end(&src[from..]).map(|pos| from + pos) else {
            self.scanned = src.len();
            let limit = self.header_limit();
            if src.len() > limit {
                return Err(CodecError::MessageTooLarge {
                    size: src.len(),
                    max: limit,
                });
            }
            return Ok(None);
        };
        self.scanned = 0;

        let content_length = match parse_content_length(&src[..header_end]) {
            Ok(length) => length,
            Err(err) => {
                // Drop the bad header and resynchronize on the next one.
                src.advance(header_end + 4);
                return Ok(Some(Err(err)));
            }
        };

        if content_length > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: content_length,
                max: self.max_message_size,
            });
        }

        let total_length = header_end + 4 + content_length;
        if src.len() < total_length {
            src.reserve(total_length - src.len());
            return Ok(None);
        }

        src.advance(header_end + 4);
        Ok(Some(Ok(src.split_to(content_length).freeze())))
    }
}

impl Encoder<Bytes> for FrameCodec
{
    type Error = CodecError;

    fn encode(&mut self, body: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error>
    {
        dst.reserve(32 + body.len());
        dst.put_slice(b"Content-Length: ");
        dst.put_slice(body.len().to_string().as_bytes());
        dst.put_slice(b"\r\n\r\n");
        dst.put_slice(&body);
        Ok(())
    }
}

/// Position of the header/body separator (`\r\n\r\n`).
fn find_header_end(buf: &[u8]) -> Option<usize>
{
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_content_length(header: &[u8]) -> Result<usize, CodecError>
{
    let header = std::str::from_utf8(header).map_err(|_| CodecError::InvalidUtf8)?;

    for line in header.split("\r\n") {
        if let Some(value) = line.strip_prefix("Content-Length:") {
            return value.trim().parse().map_err(|_| CodecError::MalformedContentLength);
        }
    }

    Err(CodecError::MissingContentLength)
}
