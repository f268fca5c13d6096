//! AMQP 0-9-1 client channel primitives.
//!
//! amqprims covers the part of an AMQP client between the socket and the
//! application: frame encoding, per-channel dispatch, request/response
//! rendezvous and reassembly of content-bearing messages.
//!
//! # Crate Structure
//!
//! - [`frame`]: frames, methods, content headers and their wire codec
//! - [`channel`]: channels, exchanges, queues and consumers (behind the
//!   `channel` feature, on by default)

/// Re-export frame types.
pub mod frame {
    pub use amqprims_frame::*;
}

/// Re-export channel types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod channel {
    pub use amqprims_channel::*;
}
