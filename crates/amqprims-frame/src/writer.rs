use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, Frame, FrameConfig, FRAME_OVERHEAD, PROTOCOL_HEADER};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write the protocol header that opens a client connection.
    pub fn write_protocol_header(&mut self) -> Result<()> {
        self.write_all(&PROTOCOL_HEADER)?;
        self.flush()
    }

    /// Encode and write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let encoded = encode_frame(frame, &mut buf);
        let result = encoded.and_then(|()| {
            let payload_len = buf.len() - FRAME_OVERHEAD;
            if payload_len > self.config.max_payload_size {
                return Err(FrameError::PayloadTooLarge {
                    size: payload_len,
                    max: self.config.max_payload_size,
                });
            }
            self.write_all(&buf)
        });
        self.buf = buf;
        result?;
        self.flush()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update limits for subsequent frame encoding, e.g. after tuning.
    pub fn set_frame_max(&mut self, frame_max: u32) {
        self.config = FrameConfig::for_frame_max(frame_max);
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use bytes::{Bytes, BytesMut};

    use super::*;
    use crate::codec::{decode_frame, FrameBody};
    use crate::method::{BasicPublish, Method};

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> BytesMut {
        BytesMut::from(writer.into_inner().into_inner().as_slice())
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer
            .write_frame(&Frame::content(1, Bytes::from_static(b"hello")))
            .unwrap();

        let mut wire = written(writer);
        let frame = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        assert_eq!(frame.channel, 1);
        assert_eq!(frame.body, FrameBody::Body(Bytes::from_static(b"hello")));
    }

    #[test]
    fn write_publish_sequence() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let publish = Method::BasicPublish(BasicPublish {
            exchange: "ex".to_string(),
            routing_key: "rk".to_string(),
            ..BasicPublish::default()
        });
        writer.write_frame(&Frame::method(3, publish.clone())).unwrap();
        writer
            .write_frame(&Frame::content(3, Bytes::from_static(b"body")))
            .unwrap();

        let mut wire = written(writer);
        let f1 = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        let f2 = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        assert_eq!(f1.body, FrameBody::Method(publish));
        assert_eq!(f2.channel, 3);
        assert!(wire.is_empty());
    }

    #[test]
    fn protocol_header_comes_first() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_protocol_header().unwrap();
        assert_eq!(&written(writer)[..], b"AMQP\x00\x00\x09\x01");
    }

    #[test]
    fn payload_too_large_rejected() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut writer = FrameWriter::with_config(cursor, FrameConfig::for_frame_max(12));

        let err = writer
            .write_frame(&Frame::content(1, Bytes::from_static(b"oversized")))
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 9, max: 4 }));
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.write_frame(&Frame::heartbeat()).unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        bytes: Vec<u8>,
        flushed: Arc<AtomicBool>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
