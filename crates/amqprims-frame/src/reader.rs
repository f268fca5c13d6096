use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_frame, Frame, FrameConfig, PROTOCOL_HEADER};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally. Callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    header_checked: bool,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            header_checked: false,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// A leading protocol header (as written by a client at connection
    /// start) is skipped. Returns `Err(FrameError::ConnectionClosed)` when
    /// EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if !self.header_checked {
                self.skip_protocol_header();
            }
            if self.header_checked {
                if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                    return Ok(frame);
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.header_checked && !self.buf.is_empty() {
                    // Short stream: let the frame decoder judge what is there.
                    self.header_checked = true;
                    if let Some(frame) =
                        decode_frame(&mut self.buf, self.config.max_payload_size)?
                    {
                        return Ok(frame);
                    }
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    fn skip_protocol_header(&mut self) {
        let n = self.buf.len().min(PROTOCOL_HEADER.len());
        if self.buf[..n] != PROTOCOL_HEADER[..n] {
            self.header_checked = true;
        } else if n == PROTOCOL_HEADER.len() {
            let _ = self.buf.split_to(n);
            self.header_checked = true;
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update limits for subsequent frame decoding, e.g. after tuning.
    pub fn set_frame_max(&mut self, frame_max: u32) {
        self.config = FrameConfig::for_frame_max(frame_max);
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Bytes read but not yet decoded. Non-zero after
    /// `ConnectionClosed` means the stream ended mid-frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, Bytes, BytesMut};

    use super::*;
    use crate::codec::{encode_frame, FrameBody, FRAME_BODY};
    use crate::method::Method;

    fn wire(frames: &[Frame]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for frame in frames {
            encode_frame(frame, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_single_frame() {
        let bytes = wire(&[Frame::content(1, Bytes::from_static(b"hello"))]);

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.channel, 1);
        assert_eq!(frame.body, FrameBody::Body(Bytes::from_static(b"hello")));
    }

    #[test]
    fn read_multiple_frames() {
        let bytes = wire(&[
            Frame::method(1, Method::ChannelOpen),
            Frame::method(2, Method::ChannelOpenOk),
            Frame::heartbeat(),
        ]);

        let mut reader = FrameReader::new(Cursor::new(bytes));

        let f1 = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        let f3 = reader.read_frame().unwrap();

        assert_eq!((f1.channel, f1.body), (1, FrameBody::Method(Method::ChannelOpen)));
        assert_eq!((f2.channel, f2.body), (2, FrameBody::Method(Method::ChannelOpenOk)));
        assert_eq!((f3.channel, f3.body), (0, FrameBody::Heartbeat));
    }

    #[test]
    fn protocol_header_is_skipped() {
        let mut bytes = PROTOCOL_HEADER.to_vec();
        bytes.extend(wire(&[Frame::method(1, Method::ChannelOpen)]));

        let mut reader = FrameReader::new(ByteByByteReader { bytes, pos: 0 });
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.body, FrameBody::Method(Method::ChannelOpen));
    }

    #[test]
    fn read_frame_with_large_payload() {
        let payload = vec![0xAB; 64 * 1024];
        let bytes = wire(&[Frame::content(9, payload.clone())]);

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.channel, 9);
        assert_eq!(frame.body, FrameBody::Body(Bytes::from(payload)));
    }

    #[test]
    fn partial_read_handling() {
        let bytes = wire(&[Frame::content(4, Bytes::from_static(b"slow"))]);

        let mut reader = FrameReader::new(ByteByByteReader { bytes, pos: 0 });

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.channel, 4);
        assert_eq!(frame.body, FrameBody::Body(Bytes::from_static(b"slow")));
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn truncated_stream_leaves_bytes_buffered() {
        let mut bytes = wire(&[Frame::content(1, Bytes::from_static(b"whole"))]);
        bytes.truncate(bytes.len() - 2);

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert_eq!(reader.buffered(), 11);
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = BytesMut::new();
        partial.put_u8(FRAME_BODY);
        partial.put_u16(2);
        partial.put_u32(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn invalid_type_in_stream() {
        let bytes = vec![0x09, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0xCE];
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::InvalidFrameType(9)));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let mut bytes = BytesMut::new();
        bytes.put_u8(FRAME_BODY);
        bytes.put_u16(1);
        bytes.put_u32(1024);

        let mut reader =
            FrameReader::with_config(Cursor::new(bytes.to_vec()), FrameConfig::for_frame_max(24));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 1024, max: 16 }));
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[cfg(unix)]
    #[test]
    fn multi_channel_roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.write_frame(&Frame::method(1, Method::ChannelOpen)).unwrap();
        writer.write_frame(&Frame::method(2, Method::ChannelOpen)).unwrap();
        writer.write_frame(&Frame::method(1, Method::ChannelCloseOk)).unwrap();

        let f1 = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        let f3 = reader.read_frame().unwrap();

        assert_eq!(f1.channel, 1);
        assert_eq!(f2.channel, 2);
        assert_eq!((f3.channel, f3.body), (1, FrameBody::Method(Method::ChannelCloseOk)));
    }
}
