//! NETCONF over SSH message framing (RFC 6242).
//!
//! base:1.0 (end-of-message delimiter):
//!
//! ```text
//! <rpc .../>]]>]]>
//! ```
//!
//! base:1.1 (chunked):
//!
//! ```text
//! \n#4\n<rpc\n#17\n message-id="1"/>\n##\n
//! ```
//!
//! The decoder accepts input in arbitrary slices. State carries over between
//! [`FrameDecoder::feed`] calls, so any prefix of a valid frame is legal input.

use netconf_core::BaseVersion;

use crate::error::{ProtocolError, ProtocolResult};
use crate::{DEFAULT_MAX_MESSAGE_SIZE, END_OF_CHUNKS, MAX_CHUNK_SIZE, MSG_DELIM};

/// Longest possible chunk header: `\n#` + 10 digits + `\n`.
const MAX_CHUNK_HEADER_LEN: usize = 2 + 10 + 1;

/// Wraps a document in the frame for `version`.
///
/// # Example
///
/// ```rust
/// use netconf_protocol::{BaseVersion, encode_frame};
///
/// let framed = encode_frame("<ok/>", BaseVersion::V1_1).unwrap();
/// assert_eq!(framed, b"\n#5\n<ok/>\n##\n");
/// ```
pub fn encode_frame(document: &str, version: BaseVersion) -> ProtocolResult<Vec<u8>> {
    if document.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }

    let payload = document.as_bytes();
    let frame = match version {
        BaseVersion::V1_0 => {
            let mut buffer = Vec::with_capacity(payload.len() + MSG_DELIM.len());
            buffer.extend_from_slice(payload);
            buffer.extend_from_slice(MSG_DELIM);
            buffer
        }
        BaseVersion::V1_1 => {
            let header = format!("\n#{}\n", payload.len());
            let mut buffer =
                Vec::with_capacity(header.len() + payload.len() + END_OF_CHUNKS.len());
            buffer.extend_from_slice(header.as_bytes());
            buffer.extend_from_slice(payload);
            buffer.extend_from_slice(END_OF_CHUNKS);
            buffer
        }
    };
    Ok(frame)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    /// Expecting `\n#<size>\n` or `\n##\n`.
    Header,
    /// Inside a chunk payload.
    Payload { remaining: usize },
}

/// Incremental decoder from bytes to complete documents.
///
/// Documents come back byte for byte, with one exception: in base:1.0
/// leading whitespace is dropped, since it cannot be told apart from
/// padding after the previous delimiter. Whitespace-only frames are skipped.
#[derive(Debug)]
pub struct FrameDecoder {
    version: BaseVersion,
    /// Bytes received but not yet consumed.
    buffer: Vec<u8>,
    /// Offset in `buffer` already searched for `]]>]]>`.
    scanned: usize,
    /// base:1.1 payload collected so far for the current message.
    message: Vec<u8>,
    state: ChunkState,
    max_size: usize,
}

impl FrameDecoder {
    /// Creates a decoder for the given base version.
    pub fn new(version: BaseVersion) -> Self {
        Self::with_max_size(version, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Creates a decoder that rejects messages larger than `max_size`.
    pub fn with_max_size(version: BaseVersion, max_size: usize) -> Self {
        Self {
            version,
            buffer: Vec::new(),
            scanned: 0,
            message: Vec::new(),
            state: ChunkState::Header,
            max_size,
        }
    }

    /// Returns the framing currently in effect.
    pub fn version(&self) -> BaseVersion {
        self.version
    }

    /// Switches framing for every byte not yet consumed.
    ///
    /// Only meaningful between messages; bytes already buffered behind the
    /// last complete message are decoded with the new framing.
    pub fn set_version(&mut self, version: BaseVersion) {
        if self.version != version {
            self.version = version;
            self.scanned = 0;
            self.message.clear();
            self.state = ChunkState::Header;
        }
    }

    /// Appends received bytes.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns true when no partial message is pending.
    pub fn is_idle(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
            && self.message.is_empty()
            && self.state == ChunkState::Header
    }

    /// Returns undelivered bytes, lossily decoded, for diagnostics.
    pub fn buffered(&self) -> String {
        let mut pending = self.message.clone();
        pending.extend_from_slice(&self.buffer);
        String::from_utf8_lossy(&pending).into_owned()
    }

    /// Feeds `data` and drains every message it completes.
    pub fn decode(&mut self, data: &[u8]) -> ProtocolResult<Vec<String>> {
        self.feed(data);
        let mut messages = Vec::new();
        while let Some(message) = self.next_message()? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// Extracts the next complete message, if one is buffered.
    pub fn next_message(&mut self) -> ProtocolResult<Option<String>> {
        match self.version {
            BaseVersion::V1_0 => self.next_delimited(),
            BaseVersion::V1_1 => self.next_chunked(),
        }
    }

    fn next_delimited(&mut self) -> ProtocolResult<Option<String>> {
        loop {
            let start = self.scanned;
            let found = self.buffer[start..]
                .windows(MSG_DELIM.len())
                .position(|window| window == MSG_DELIM);

            let Some(offset) = found else {
                if self.buffer.len() > self.max_size {
                    return Err(ProtocolError::MessageTooLarge {
                        size: self.buffer.len(),
                        max: self.max_size,
                    });
                }
                // The delimiter may straddle the next read.
                self.scanned = self.buffer.len().saturating_sub(MSG_DELIM.len() - 1);
                return Ok(None);
            };

            let end = start + offset;
            let raw: Vec<u8> = self.buffer.drain(..end + MSG_DELIM.len()).take(end).collect();
            self.scanned = 0;

            let document = String::from_utf8(raw)?;
            let body = document.trim_start();
            if body.is_empty() {
                // Stray delimiter, nothing to deliver.
                continue;
            }
            return Ok(Some(if body.len() == document.len() {
                document
            } else {
                body.to_string()
            }));
        }
    }

    fn next_chunked(&mut self) -> ProtocolResult<Option<String>> {
        loop {
            match self.state {
                ChunkState::Header => {
                    if self.message.is_empty() {
                        self.skip_interframe_whitespace();
                    }
                    match self.parse_chunk_header()? {
                        None => return Ok(None),
                        Some(None) => {
                            if self.message.is_empty() {
                                return Err(ProtocolError::InvalidChunkHeader(
                                    "end-of-chunks marker without any chunk".into(),
                                ));
                            }
                            let raw = std::mem::take(&mut self.message);
                            return Ok(Some(String::from_utf8(raw)?));
                        }
                        Some(Some(size)) => {
                            let total = self.message.len() + size;
                            if total > self.max_size {
                                return Err(ProtocolError::MessageTooLarge {
                                    size: total,
                                    max: self.max_size,
                                });
                            }
                            self.state = ChunkState::Payload { remaining: size };
                        }
                    }
                }
                ChunkState::Payload { remaining } => {
                    if self.buffer.is_empty() {
                        return Ok(None);
                    }
                    let take = remaining.min(self.buffer.len());
                    self.message.extend(self.buffer.drain(..take));
                    let remaining = remaining - take;
                    self.state = if remaining == 0 {
                        ChunkState::Header
                    } else {
                        ChunkState::Payload { remaining }
                    };
                    if remaining > 0 {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Tolerates whitespace between messages, keeping a `\n` that may start
    /// the next header.
    fn skip_interframe_whitespace(&mut self) {
        let mut skip = 0;
        while let Some(&byte) = self.buffer.get(skip) {
            if !byte.is_ascii_whitespace() {
                break;
            }
            if byte == b'\n' && self.buffer.get(skip + 1).is_none_or(|&next| next == b'#') {
                break;
            }
            skip += 1;
        }
        if skip > 0 {
            self.buffer.drain(..skip);
        }
    }

    /// Parses a chunk header at the start of the buffer.
    ///
    /// Returns `None` when more bytes are needed, `Some(None)` for the
    /// end-of-chunks marker and `Some(Some(size))` for a chunk.
    fn parse_chunk_header(&mut self) -> ProtocolResult<Option<Option<usize>>> {
        let buf = &self.buffer;

        if let Some(&first) = buf.first()
            && first != b'\n'
        {
            return Err(invalid_header(buf));
        }
        if let Some(&second) = buf.get(1)
            && second != b'#'
        {
            return Err(invalid_header(buf));
        }

        if buf.get(2) == Some(&b'#') {
            return match buf.get(3) {
                None => Ok(None),
                Some(b'\n') => {
                    self.buffer.drain(..END_OF_CHUNKS.len());
                    Ok(Some(None))
                }
                Some(_) => Err(invalid_header(buf)),
            };
        }

        let digits_end = buf.iter().skip(2).position(|&b| b == b'\n');
        let Some(digits_len) = digits_end else {
            let digits = buf.get(2..).unwrap_or_default();
            if !digits.iter().all(u8::is_ascii_digit) || buf.len() >= MAX_CHUNK_HEADER_LEN {
                return Err(invalid_header(buf));
            }
            return Ok(None);
        };

        let digits = &buf[2..2 + digits_len];
        if digits.is_empty() || digits[0] == b'0' || !digits.iter().all(u8::is_ascii_digit) {
            return Err(invalid_header(buf));
        }
        if digits.len() > 10 {
            return Err(invalid_header(buf));
        }

        // Only ASCII digits remain, at most 10 of them.
        let size: u64 = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| invalid_header(buf))?;
        if size > MAX_CHUNK_SIZE {
            return Err(ProtocolError::ChunkTooLarge {
                size,
                max: MAX_CHUNK_SIZE,
            });
        }
        let size = usize::try_from(size).map_err(|_| ProtocolError::ChunkTooLarge {
            size,
            max: usize::MAX as u64,
        })?;

        self.buffer.drain(..2 + digits_len + 1);
        Ok(Some(Some(size)))
    }
}

fn invalid_header(buf: &[u8]) -> ProtocolError {
    let shown = &buf[..buf.len().min(MAX_CHUNK_HEADER_LEN)];
    ProtocolError::InvalidChunkHeader(format!("{:?}", String::from_utf8_lossy(shown)))
}
