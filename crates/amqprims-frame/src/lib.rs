//! AMQP 0-9-1 framing for the channel layer.
//!
//! Every frame on the wire is laid out as:
//! - A 1-byte frame type (method, content header, content body, heartbeat)
//! - A 2-byte big-endian channel number for multiplexing
//! - A 4-byte big-endian payload size
//! - The payload, followed by the 0xCE frame-end octet
//!
//! Method and content-header payloads are decoded into typed values, so
//! callers never touch raw argument bytes.

pub mod channel;
pub mod codec;
pub mod error;
pub mod field;
pub mod method;
pub mod properties;
pub mod reader;
pub mod writer;

mod wire;

pub use channel::{CONNECTION, DEFAULT_CHANNEL_MAX, FIRST_CHANNEL};
#[cfg(feature = "async")]
pub use codec::AmqpCodec;
pub use codec::{
    body_chunk_size, decode_frame, encode_frame, Frame, FrameBody, FrameConfig, FrameKind,
    DEFAULT_FRAME_MAX, FRAME_END, FRAME_OVERHEAD, HEADER_SIZE, PROTOCOL_HEADER,
};
pub use error::{FrameError, Result};
pub use field::{FieldTable, FieldValue};
pub use method::Method;
pub use properties::{BasicProperties, ContentHeader};
pub use reader::FrameReader;
pub use writer::FrameWriter;
