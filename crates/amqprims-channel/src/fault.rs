//! Out-of-band fault reporting.
//!
//! Faults are errors no caller is waiting on: a peer closing a channel, a
//! protocol violation detected while pumping frames, or a returned message
//! with no handler. They are delivered on an unbounded channel so the frame
//! path never blocks on the application.

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::ChannelError;

/// A fault raised on one channel.
#[derive(Debug)]
pub struct Fault {
    pub channel_id: u16,
    pub error: ChannelError,
}

/// Sending half of the connection's fault stream.
#[derive(Debug, Clone)]
pub struct FaultReporter {
    tx: mpsc::UnboundedSender<Fault>,
}

impl FaultReporter {
    /// Create a reporter and the receiver faults arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Fault>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, channel_id: u16, error: ChannelError) {
        warn!(channel_id, error = %error, "channel fault");
        if self.tx.send(Fault { channel_id, error }).is_err() {
            warn!(channel_id, "fault receiver dropped; fault discarded");
        }
    }
}
