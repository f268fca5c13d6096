/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header carries a type octet this codec does not know.
    #[error("invalid frame type {0}")]
    InvalidFrameType(u8),

    /// The octet after the payload was not the 0xCE frame-end marker.
    #[error("missing frame end (found 0x{0:02X}, expected 0xCE)")]
    MissingFrameEnd(u8),

    /// The payload exceeds the negotiated maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A short string longer than 255 bytes was about to be encoded.
    #[error("short string too long ({0} bytes, max 255)")]
    ShortStringTooLong(usize),

    /// The method frame names a class/method pair this codec does not know.
    #[error("unknown method {class_id}.{method_id}")]
    UnknownMethod { class_id: u16, method_id: u16 },

    /// A payload could not be decoded.
    #[error("malformed {0}")]
    Malformed(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
