use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use msgports_sender::{RemoteDelivery, ResolvedMessage};
use tracing::{trace, warn};

use crate::codec::{encode_message, WireConfig};
use crate::error::{Result, WireError};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes resolved messages as frames to any `Write` stream.
///
/// As a [`RemoteDelivery`] it is fire-and-forget: a failed write is logged and
/// counted, and the sender carries on.
pub struct WireWriter<W> {
    inner: W,
    buf: BytesMut,
    config: WireConfig,
    written: u64,
    failures: u64,
}

impl<W: Write> WireWriter<W> {
    /// Create a new writer with default configuration.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, WireConfig::default())
    }

    /// Create a new writer with explicit configuration.
    pub fn with_config(inner: W, config: WireConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            written: 0,
            failures: 0,
        }
    }

    /// Encode and write one message, then flush.
    pub fn write_message(&mut self, message: &ResolvedMessage) -> Result<()> {
        self.buf.clear();
        encode_message(message, self.config.max_payload_size, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(WireError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }

        self.written += 1;
        Ok(())
    }

    /// Messages written successfully.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Deliveries that failed to write.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> RemoteDelivery for WireWriter<W> {
    fn deliver(&mut self, message: ResolvedMessage) {
        match self.write_message(&message) {
            Ok(()) => trace!(destination = %message.destination, "wrote message frame"),
            Err(err) => {
                self.failures += 1;
                warn!(
                    destination = %message.destination,
                    failures = self.failures,
                    error = %err,
                    "failed writing message frame"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;
    use msgports_port::PortId;

    use super::*;
    use crate::codec::{decode_message, DEFAULT_MAX_PAYLOAD};

    fn message(payload: &str) -> ResolvedMessage {
        ResolvedMessage {
            destination: "main".to_string(),
            payload: payload.to_string(),
            target_origin: "*".to_string(),
            ports: vec![PortId::new(7)],
        }
    }

    #[test]
    fn delivered_messages_are_framed_in_order() {
        let mut writer = WireWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.deliver(message("one"));
        writer.deliver(message("two"));

        assert_eq!(writer.written(), 2);
        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        let first = decode_message(&mut wire, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        let second = decode_message(&mut wire, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(first.payload, "one");
        assert_eq!(second.payload, "two");
        assert_eq!(second.ports, vec![PortId::new(7)]);
    }

    #[test]
    fn write_failures_are_counted_not_raised() {
        let mut writer = WireWriter::new(ZeroWriter);
        writer.deliver(message("lost"));
        writer.deliver(message("lost again"));

        assert_eq!(writer.failures(), 2);
        assert_eq!(writer.written(), 0);
    }

    #[test]
    fn write_message_reports_closed_stream() {
        let mut writer = WireWriter::new(ZeroWriter);
        let err = writer.write_message(&message("x")).unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed));
    }

    #[test]
    fn oversized_message_is_a_failure() {
        let config = WireConfig {
            max_payload_size: 4,
        };
        let mut writer = WireWriter::with_config(Cursor::new(Vec::<u8>::new()), config);
        writer.deliver(message("oversized"));

        assert_eq!(writer.failures(), 1);
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn retries_interrupted_writes() {
        let mut writer = WireWriter::new(InterruptOnce {
            interrupted: false,
            data: Vec::new(),
        });
        writer.write_message(&message("retry")).unwrap();
        assert!(!writer.into_inner().data.is_empty());
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct InterruptOnce {
        interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptOnce {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
