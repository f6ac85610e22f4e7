//! Response framing for JSON-RPC over a raw byte stream.
//!
//! The gateway does not length-prefix its responses. The only boundary it
//! reliably produces is a trailing line feed after the closing brace, so the
//! default codec treats a buffer ending in `}\n` as a complete message. That
//! is a heuristic: it assumes the server never leaves a buffer ending in `}\n`
//! midway through a response, and that exactly one response is read per
//! request (no pipelining).
//!
//! Framing sits behind [`FrameCodec`] so the heuristic can be swapped for
//! [`ContentLengthCodec`], the LSP-style header framing:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <message-body>
//! ```
//!
//! # Timeouts
//!
//! [`read_frame`] never blocks indefinitely. It stops when the codec reports
//! a complete frame, or when either deadline passes:
//!
//! - idle: bytes have arrived, then nothing for `timeout`
//! - absolute: nothing at all within `2 × timeout` of starting the read
//!
//! On a timeout the partial buffer is returned as-is; deciding whether it
//! decodes is the caller's job.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, trace, warn};

use crate::config::{ClientConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FRAME_SIZE};

/// Longest header block accepted by [`ContentLengthCodec`].
const MAX_HEADER_SIZE: usize = 8 * 1024;

/// Stand-in for "never" when a deadline would overflow `Instant` (~30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

// =============================================================================
// Codecs
// =============================================================================

/// Strategy for delimiting messages on the stream.
pub trait FrameCodec: fmt::Debug + Send + Sync {
    /// Length of the complete frame at the start of `buf`, or `None` while
    /// more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` when the buffer can never become a valid frame.
    fn frame_len(&self, buf: &[u8]) -> io::Result<Option<usize>>;

    /// Message body of a complete frame.
    fn payload<'a>(&self, frame: &'a [u8]) -> &'a [u8];

    /// Wire bytes for an outgoing message body.
    fn encode(&self, body: &[u8]) -> Vec<u8>;
}

/// Trailing `}` + line feed framing used by the jSQL gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndMarkerCodec;

/// True when `buf` ends with `}` followed by a line feed.
pub fn has_end_marker(buf: &[u8]) -> bool {
    matches!(buf, [.., b'}', b'\n'])
}

impl FrameCodec for EndMarkerCodec {
    fn frame_len(&self, buf: &[u8]) -> io::Result<Option<usize>> {
        Ok(has_end_marker(buf).then_some(buf.len()))
    }

    fn payload<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        frame
    }

    fn encode(&self, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(body.len() + 1);
        out.extend_from_slice(body);
        out.push(b'\n');
        out
    }
}

/// HTTP-style `Content-Length` framing (same as LSP).
///
/// Header names are case-insensitive; CRLF and LF line endings are both
/// accepted.
#[derive(Debug, Clone, Copy)]
pub struct ContentLengthCodec {
    max_message_size: usize,
}

impl ContentLengthCodec {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Returns `(header_len, body_len)` once the header block is complete.
    fn parse_header(&self, buf: &[u8]) -> io::Result<Option<(usize, usize)>> {
        let mut content_length: Option<usize> = None;
        let mut pos = 0;

        loop {
            let Some(offset) = buf[pos..].iter().position(|&b| b == b'\n') else {
                if buf.len() > MAX_HEADER_SIZE {
                    return Err(invalid_data(format!(
                        "Header block exceeds {} bytes",
                        MAX_HEADER_SIZE
                    )));
                }
                return Ok(None);
            };

            let line = std::str::from_utf8(&buf[pos..pos + offset])
                .map_err(|_| invalid_data("Header line is not valid UTF-8"))?;
            pos += offset + 1;

            let trimmed = line.trim();

            // Empty line signals end of headers
            if trimmed.is_empty() {
                break;
            }

            if let Some((key, value)) = trimmed.split_once(':') {
                if key.trim().eq_ignore_ascii_case("Content-Length") {
                    let value = value.trim();
                    content_length = Some(value.parse().map_err(|_| {
                        invalid_data(format!("Invalid Content-Length value: {}", value))
                    })?);
                }
                // Ignore other headers (e.g., Content-Type)
            }
        }

        let size = content_length.ok_or_else(|| invalid_data("Missing Content-Length header"))?;

        if size > self.max_message_size {
            return Err(invalid_data(format!(
                "Message size {} exceeds maximum {} bytes",
                size, self.max_message_size
            )));
        }

        Ok(Some((pos, size)))
    }
}

impl Default for ContentLengthCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameCodec for ContentLengthCodec {
    fn frame_len(&self, buf: &[u8]) -> io::Result<Option<usize>> {
        Ok(self
            .parse_header(buf)?
            .map(|(header_len, body_len)| header_len + body_len)
            .filter(|&total| buf.len() >= total))
    }

    fn payload<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        match self.parse_header(frame) {
            Ok(Some((header_len, body_len))) => {
                let end = (header_len + body_len).min(frame.len());
                &frame[header_len..end]
            }
            _ => frame,
        }
    }

    fn encode(&self, body: &[u8]) -> Vec<u8> {
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        let mut out = Vec::with_capacity(header.len() + body.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(body);
        out
    }
}

fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

// =============================================================================
// Reading and writing
// =============================================================================

/// Budget and buffer sizes for [`read_frame`].
///
/// Built from a [`ClientConfig`]; a zero chunk size there becomes the
/// default chunk size here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPolicy {
    /// Idle timeout; the absolute timeout is twice this.
    pub(crate) timeout: Duration,
    pub(crate) chunk_size: usize,
    /// Back-off after a would-block read.
    pub(crate) poll_interval: Duration,
    pub(crate) max_frame_size: usize,
}

impl ReadPolicy {
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn absolute_timeout(&self) -> Duration {
        self.timeout.saturating_mul(2)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

/// `at + after`, or a far-future instant when that overflows.
fn deadline_after(at: Instant, after: Duration) -> Instant {
    at.checked_add(after)
        .or_else(|| at.checked_add(FAR_FUTURE))
        .unwrap_or(at)
}

impl Default for ReadPolicy {
    fn default() -> Self {
        ReadPolicy::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for ReadPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            timeout: config.timeout,
            chunk_size: if config.chunk_size == 0 {
                DEFAULT_CHUNK_SIZE
            } else {
                config.chunk_size
            },
            poll_interval: config.poll_interval,
            max_frame_size: config.max_frame_size,
        }
    }
}

/// Why [`read_frame`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The codec recognised a complete frame.
    Complete,
    /// Bytes arrived, then the stream went quiet for the idle timeout.
    IdleTimeout,
    /// No bytes arrived within the absolute timeout.
    AbsoluteTimeout,
    /// The peer closed the stream after sending a partial frame.
    Closed,
}

/// Bytes accumulated by one [`read_frame`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub status: FrameStatus,
}

impl Frame {
    pub fn is_complete(&self) -> bool {
        self.status == FrameStatus::Complete
    }

    /// Message body: the codec's payload of a complete frame, otherwise
    /// whatever was accumulated.
    pub fn payload<'a>(&'a self, codec: &dyn FrameCodec) -> &'a [u8] {
        if self.is_complete() {
            codec.payload(&self.bytes)
        } else {
            &self.bytes
        }
    }
}

/// Read one frame from `reader`.
///
/// # Errors
///
/// - `UnexpectedEof` if the peer closes the stream before sending anything
/// - `InvalidData` if the frame outgrows `max_frame_size` or the codec
///   rejects the buffer
/// - any read error other than `WouldBlock`/`Interrupted`, which are retried
///   after `poll_interval`
pub async fn read_frame<R>(
    reader: &mut R,
    codec: &dyn FrameCodec,
    policy: &ReadPolicy,
) -> io::Result<Frame>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let started = Instant::now();
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; policy.chunk_size];
    let mut last_progress: Option<Instant> = None;

    loop {
        let (deadline, expiry) = match last_progress {
            Some(at) => (deadline_after(at, policy.timeout), FrameStatus::IdleTimeout),
            None => (
                deadline_after(started, policy.absolute_timeout()),
                FrameStatus::AbsoluteTimeout,
            ),
        };

        let read = match timeout_at(deadline, reader.read(&mut chunk)).await {
            Ok(read) => read,
            Err(_) => return Ok(expired(buf, expiry, started)),
        };

        match read {
            Ok(0) => {
                if buf.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Connection closed by server",
                    ));
                }
                debug!(bytes = buf.len(), "stream closed mid-frame");
                return Ok(Frame {
                    bytes: buf,
                    status: FrameStatus::Closed,
                });
            }
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                last_progress = Some(Instant::now());
                trace!(chunk = n, total = buf.len(), "received chunk");

                if buf.len() > policy.max_frame_size {
                    return Err(invalid_data(format!(
                        "Frame exceeds maximum {} bytes",
                        policy.max_frame_size
                    )));
                }

                if let Some(len) = codec.frame_len(&buf)? {
                    if len < buf.len() {
                        warn!(trailing = buf.len() - len, "discarding bytes after frame");
                        buf.truncate(len);
                    }
                    debug!(bytes = len, elapsed = ?started.elapsed(), "frame complete");
                    return Ok(Frame {
                        bytes: buf,
                        status: FrameStatus::Complete,
                    });
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(expired(buf, expiry, started));
                }
                sleep_until(deadline_after(now, policy.poll_interval).min(deadline)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn expired(bytes: Vec<u8>, status: FrameStatus, started: Instant) -> Frame {
    warn!(
        ?status,
        bytes = bytes.len(),
        elapsed = ?started.elapsed(),
        "read timed out before a complete frame"
    );
    Frame { bytes, status }
}

/// Encode `body` with `codec` and write it out.
///
/// # Errors
///
/// Returns an error if the write or flush fails.
pub async fn write_frame<W>(writer: &mut W, codec: &dyn FrameCodec, body: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(&codec.encode(body)).await?;
    writer.flush().await
}
