use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use msgports_sender::ResolvedMessage;

use crate::codec::{decode_message, WireConfig};
use crate::error::{Result, WireError};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads resolved messages from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete messages.
pub struct WireReader<R> {
    inner: R,
    buf: BytesMut,
    config: WireConfig,
}

impl<R: Read> WireReader<R> {
    /// Create a new reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, WireConfig::default())
    }

    /// Create a new reader with explicit configuration.
    pub fn with_config(inner: R, config: WireConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(WireError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<ResolvedMessage> {
        loop {
            if let Some(message) = decode_message(&mut self.buf, self.config.max_payload_size)? {
                return Ok(message);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            };

            if read == 0 {
                return Err(WireError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read messages until a clean end of stream.
    ///
    /// A stream that ends in the middle of a frame is an error.
    pub fn read_all(&mut self) -> Result<Vec<ResolvedMessage>> {
        let mut messages = Vec::new();
        loop {
            match self.read_message() {
                Ok(message) => messages.push(message),
                Err(WireError::ConnectionClosed) if self.buf.is_empty() => return Ok(messages),
                Err(err) => return Err(err),
            }
        }
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}
