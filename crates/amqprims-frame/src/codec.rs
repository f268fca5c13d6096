use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::method::Method;
use crate::properties::ContentHeader;

/// Frame header: type (1) + channel (2) + size (4) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Header plus the trailing frame-end octet.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + 1;

pub const FRAME_METHOD: u8 = 1;
pub const FRAME_HEADER: u8 = 2;
pub const FRAME_BODY: u8 = 3;
pub const FRAME_HEARTBEAT: u8 = 8;

/// Every frame ends with this octet.
pub const FRAME_END: u8 = 0xCE;

/// Frame size offered by RabbitMQ during tuning: 128 KiB.
pub const DEFAULT_FRAME_MAX: u32 = 128 * 1024;

/// Bytes a client sends before the first frame of a connection.
pub const PROTOCOL_HEADER: [u8; 8] = *b"AMQP\x00\x00\x09\x01";

/// The kind of a frame, as carried in its type octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Method,
    Header,
    Body,
    Heartbeat,
}

impl FrameKind {
    pub fn octet(self) -> u8 {
        match self {
            FrameKind::Method => FRAME_METHOD,
            FrameKind::Header => FRAME_HEADER,
            FrameKind::Body => FRAME_BODY,
            FrameKind::Heartbeat => FRAME_HEARTBEAT,
        }
    }

    pub fn from_octet(octet: u8) -> Result<Self> {
        match octet {
            FRAME_METHOD => Ok(FrameKind::Method),
            FRAME_HEADER => Ok(FrameKind::Header),
            FRAME_BODY => Ok(FrameKind::Body),
            FRAME_HEARTBEAT => Ok(FrameKind::Heartbeat),
            other => Err(FrameError::InvalidFrameType(other)),
        }
    }
}

/// The decoded payload of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    Method(Method),
    Header(ContentHeader),
    Body(Bytes),
    Heartbeat,
}

impl FrameBody {
    pub fn kind(&self) -> FrameKind {
        match self {
            FrameBody::Method(_) => FrameKind::Method,
            FrameBody::Header(_) => FrameKind::Header,
            FrameBody::Body(_) => FrameKind::Body,
            FrameBody::Heartbeat => FrameKind::Heartbeat,
        }
    }
}

/// A frame addressed to one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// The channel this frame belongs to.
    pub channel: u16,
    pub body: FrameBody,
}

impl Frame {
    /// Create a new frame.
    pub fn new(channel: u16, body: FrameBody) -> Self {
        Self { channel, body }
    }

    pub fn method(channel: u16, method: Method) -> Self {
        Self::new(channel, FrameBody::Method(method))
    }

    pub fn header(channel: u16, header: ContentHeader) -> Self {
        Self::new(channel, FrameBody::Header(header))
    }

    pub fn content(channel: u16, chunk: impl Into<Bytes>) -> Self {
        Self::new(channel, FrameBody::Body(chunk.into()))
    }

    pub fn heartbeat() -> Self {
        Self::new(crate::channel::CONNECTION, FrameBody::Heartbeat)
    }

    pub fn kind(&self) -> FrameKind {
        self.body.kind()
    }

    /// The method carried by this frame, if it is a method frame.
    pub fn as_method(&self) -> Option<&Method> {
        match &self.body {
            FrameBody::Method(method) => Some(method),
            _ => None,
        }
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬────────────┬────────────┬─────────────────┬──────┐
/// │ Type     │ Channel    │ Size       │ Payload          │ End  │
/// │ (1B)     │ (2B BE)    │ (4B BE)    │ (Size bytes)     │ 0xCE │
/// └──────────┴────────────┴────────────┴─────────────────┴──────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let mut payload = BytesMut::new();
    match &frame.body {
        FrameBody::Method(method) => method.encode(&mut payload)?,
        FrameBody::Header(header) => header.encode(&mut payload)?,
        FrameBody::Body(chunk) => payload.put_slice(chunk),
        FrameBody::Heartbeat => {}
    }

    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(FRAME_OVERHEAD + payload.len());
    dst.put_u8(frame.kind().octet());
    dst.put_u16(frame.channel);
    dst.put_u32(payload.len() as u32);
    dst.put_slice(&payload);
    dst.put_u8(FRAME_END);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let kind = FrameKind::from_octet(src[0])?;
    let channel = u16::from_be_bytes([src[1], src[2]]);
    let payload_len = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = FRAME_OVERHEAD + payload_len;
    if src.len() < total {
        return Ok(None);
    }

    let end = src[total - 1];
    if end != FRAME_END {
        return Err(FrameError::MissingFrameEnd(end));
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    src.advance(1);

    let body = match kind {
        FrameKind::Method => FrameBody::Method(Method::decode(payload)?),
        FrameKind::Header => FrameBody::Header(ContentHeader::decode(payload)?),
        FrameKind::Body => FrameBody::Body(payload),
        FrameKind::Heartbeat => FrameBody::Heartbeat,
    };
    Ok(Some(Frame { channel, body }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Negotiated maximum frame size including overhead; 0 means unlimited.
    pub frame_max: u32,
    /// Maximum payload size in bytes accepted when decoding.
    pub max_payload_size: usize,
}

impl FrameConfig {
    /// Derive payload limits from a negotiated `frame_max`.
    pub fn for_frame_max(frame_max: u32) -> Self {
        let max_payload_size = if frame_max == 0 {
            u32::MAX as usize
        } else {
            (frame_max as usize).saturating_sub(FRAME_OVERHEAD)
        };
        Self {
            frame_max,
            max_payload_size,
        }
    }

    /// Largest body chunk a single body frame may carry.
    pub fn body_chunk_size(&self) -> usize {
        body_chunk_size(self.frame_max)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self::for_frame_max(DEFAULT_FRAME_MAX)
    }
}

/// Largest body chunk for `frame_max`. `0` means no limit.
pub fn body_chunk_size(frame_max: u32) -> usize {
    if frame_max == 0 {
        usize::MAX
    } else {
        (frame_max as usize).saturating_sub(FRAME_OVERHEAD).max(1)
    }
}

/// `tokio_util` codec over [`encode_frame`] / [`decode_frame`].
#[cfg(feature = "async")]
#[derive(Debug, Clone, Default)]
pub struct AmqpCodec {
    config: FrameConfig,
}

#[cfg(feature = "async")]
impl AmqpCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self { config }
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Decoder for AmqpCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        decode_frame(src, self.config.max_payload_size)
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Encoder<Frame> for AmqpCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&frame, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::{BasicAck, QueueDeclareOk};
    use crate::properties::BasicProperties;

    fn encoded(frame: &Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn method_frame_layout() {
        let buf = encoded(&Frame::method(1, Method::ChannelOpen));
        assert_eq!(
            buf.as_ref(),
            &[1, 0, 1, 0, 0, 0, 5, 0, 20, 0, 10, 0, 0xCE]
        );
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[FRAME_METHOD, 0x00, 0x01][..]);
        let result = decode_frame(&mut buf, DEFAULT_FRAME_MAX as usize).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = encoded(&Frame::content(1, Bytes::from_static(b"hello")));
        buf.truncate(HEADER_SIZE + 2);

        let result = decode_frame(&mut buf, DEFAULT_FRAME_MAX as usize).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_invalid_type() {
        let mut buf = BytesMut::from(&[0x07, 0, 0, 0, 0, 0, 0, FRAME_END][..]);
        let result = decode_frame(&mut buf, DEFAULT_FRAME_MAX as usize);
        assert!(matches!(result, Err(FrameError::InvalidFrameType(7))));
    }

    #[test]
    fn test_decode_missing_frame_end() {
        let mut buf = encoded(&Frame::heartbeat());
        let last = buf.len() - 1;
        buf[last] = 0x00;
        let result = decode_frame(&mut buf, DEFAULT_FRAME_MAX as usize);
        assert!(matches!(result, Err(FrameError::MissingFrameEnd(0x00))));
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u8(FRAME_BODY);
        buf.put_u16(1);
        buf.put_u32(1024 * 1024);

        let result = decode_frame(&mut buf, 4096);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_multiple_frames_on_different_channels() {
        let mut buf = encoded(&Frame::method(
            1,
            Method::BasicAck(BasicAck {
                delivery_tag: 9,
                multiple: false,
            }),
        ));
        buf.extend_from_slice(&encoded(&Frame::method(
            2,
            Method::QueueDeclareOk(QueueDeclareOk {
                queue: "q".to_string(),
                message_count: 3,
                consumer_count: 1,
            }),
        )));

        let f1 = decode_frame(&mut buf, DEFAULT_FRAME_MAX as usize)
            .unwrap()
            .unwrap();
        assert_eq!(f1.channel, 1);
        assert_eq!(f1.as_method().map(Method::name), Some("basic.ack"));

        let f2 = decode_frame(&mut buf, DEFAULT_FRAME_MAX as usize)
            .unwrap()
            .unwrap();
        assert_eq!(f2.channel, 2);
        assert!(matches!(
            f2.body,
            FrameBody::Method(Method::QueueDeclareOk(ref ok)) if ok.message_count == 3
        ));

        assert!(buf.is_empty());
    }

    #[test]
    fn header_and_body_frames_decode() {
        let header = ContentHeader::basic(3, BasicProperties::default());
        let mut buf = encoded(&Frame::header(4, header.clone()));
        buf.extend_from_slice(&encoded(&Frame::content(4, Bytes::from_static(b"abc"))));

        let first = decode_frame(&mut buf, 64).unwrap().unwrap();
        assert_eq!(first.body, FrameBody::Header(header));
        let second = decode_frame(&mut buf, 64).unwrap().unwrap();
        assert_eq!(second.body, FrameBody::Body(Bytes::from_static(b"abc")));
    }

    #[test]
    fn chunk_size_follows_frame_max() {
        assert_eq!(body_chunk_size(4096), 4088);
        assert_eq!(body_chunk_size(0), usize::MAX);
        assert_eq!(FrameConfig::for_frame_max(0).max_payload_size, u32::MAX as usize);
        assert_eq!(FrameConfig::default().body_chunk_size(), 131_064);
    }
}

#[cfg(all(test, feature = "async"))]
mod async_tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[tokio::test]
    async fn framed_stream_round_trips_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, AmqpCodec::default());
        let mut stream = FramedRead::new(server, AmqpCodec::default());

        let writer = tokio::spawn(async move {
            sink.send(Frame::method(1, Method::ChannelOpen)).await.unwrap();
            sink.send(Frame::content(1, Bytes::from(vec![7u8; 200])))
                .await
                .unwrap();
            sink.send(Frame::heartbeat()).await.unwrap();
        });

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.as_method().map(Method::name), Some("channel.open"));
        let second = stream.next().await.unwrap().unwrap();
        assert!(matches!(second.body, FrameBody::Body(ref b) if b.len() == 200));
        let third = stream.next().await.unwrap().unwrap();
        assert_eq!(third.body, FrameBody::Heartbeat);

        writer.await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn framed_stream_enforces_frame_max() {
        let (client, server) = tokio::io::duplex(256);
        let mut sink = FramedWrite::new(client, AmqpCodec::default());
        let mut stream = FramedRead::new(server, AmqpCodec::new(FrameConfig::for_frame_max(16)));

        sink.send(Frame::content(2, Bytes::from_static(b"far too long for sixteen")))
            .await
            .unwrap();
        let result = stream.next().await.unwrap();
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }
}
