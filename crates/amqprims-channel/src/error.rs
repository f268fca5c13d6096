use amqprims_frame::FrameError;

use crate::message::IncomingMessage;

/// Why a channel stopped accepting work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The application closed the channel.
    Client,
    /// The server sent channel.close.
    Peer { reply_code: u16, reply_text: String },
    /// A protocol violation was detected on this channel.
    Fault(String),
    /// The connection carrying the channel went away.
    ConnectionLost,
}

impl From<CloseReason> for ChannelError {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::Client => ChannelError::Closed,
            CloseReason::Peer {
                reply_code,
                reply_text,
            } => ChannelError::ClosedByPeer {
                reply_code,
                reply_text,
            },
            CloseReason::Fault(detail) => ChannelError::Failed(detail),
            CloseReason::ConnectionLost => ChannelError::ConnectionClosed,
        }
    }
}

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// An exchange or queue name failed local validation.
    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: &'static str,
    },

    /// The channel was closed by the application.
    #[error("channel closed")]
    Closed,

    /// The server closed the channel.
    #[error("channel closed by peer ({reply_code}): {reply_text}")]
    ClosedByPeer { reply_code: u16, reply_text: String },

    /// The channel was shut down after a protocol violation.
    #[error("channel failed: {0}")]
    Failed(String),

    /// The connection's frame sink is gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// A response arrived that nobody was waiting for.
    #[error("unexpected response {0}")]
    UnexpectedResponse(String),

    /// A frame kind that is not valid in the channel's current state.
    #[error("unexpected {kind} frame on channel {channel}")]
    UnexpectedFrame { channel: u16, kind: &'static str },

    /// A method the client never expects to receive.
    #[error("unexpected method {method} on channel {channel}")]
    UnexpectedMethod { channel: u16, method: &'static str },

    /// A content body chunk arrived before its content header.
    #[error("content body before content header")]
    MissingHeader,

    /// A second content header arrived for one message.
    #[error("content header already received")]
    HeaderAlreadySet,

    /// Body chunks exceeded the size declared in the content header.
    #[error("content body overflow ({received} bytes, declared {declared})")]
    BodyOverflow { declared: u64, received: u64 },

    /// A message was built before all of its body arrived.
    #[error("message incomplete ({received} of {declared} bytes)")]
    Incomplete { declared: u64, received: u64 },

    /// A delivery started while another was still being reassembled.
    #[error("delivery started on channel {0} while another is being reassembled")]
    ReconstructionInFlight(u16),

    /// A frame was routed to a channel with no registered handler.
    #[error("no handler for channel {0}")]
    UnknownChannel(u16),

    /// A delivery named a consumer tag this channel does not know.
    #[error("unknown consumer {0:?}")]
    UnknownConsumer(String),

    /// Every channel id up to `channel_max` has been handed out.
    #[error("channel limit reached ({0})")]
    ChannelLimit(u16),

    /// Returned messages carry no delivery tag.
    #[error("message has no delivery tag")]
    NotAcknowledgeable,

    /// The server returned a message and no return handler was set.
    #[error("undeliverable message returned from exchange {:?} ({})", .0.exchange(), .0.routing_key())]
    UndeliverableMessage(Box<IncomingMessage>),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A message body was not valid UTF-8.
    #[error("message body is not UTF-8")]
    NotUtf8,
}

pub type Result<T> = std::result::Result<T, ChannelError>;
