use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::ChannelError;
use crate::fault::FaultReporter;
use crate::message::IncomingMessage;

/// Callback invoked with each message the server returns as unroutable.
pub type ReturnCallback = Arc<dyn Fn(IncomingMessage) + Send + Sync>;

/// Routes returned messages to the application's callback, or reports them
/// as faults when none is set.
pub struct Catcher {
    channel_id: u16,
    callback: Mutex<Option<ReturnCallback>>,
    faults: FaultReporter,
}

impl Catcher {
    pub fn new(channel_id: u16, faults: FaultReporter) -> Self {
        Self {
            channel_id,
            callback: Mutex::new(None),
            faults,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ReturnCallback>> {
        self.callback.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the return callback.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(IncomingMessage) + Send + Sync + 'static,
    {
        *self.slot() = Some(Arc::new(callback));
    }

    /// Go back to reporting returned messages as faults.
    pub fn clear_callback(&self) {
        *self.slot() = None;
    }

    /// The callback runs on its own task, never inline on the frame path.
    pub fn handle_returned_message(&self, message: IncomingMessage) {
        let callback = self.slot().clone();
        match callback {
            Some(callback) => {
                debug!(
                    channel_id = self.channel_id,
                    exchange = message.exchange(),
                    "returned message passed to callback"
                );
                tokio::spawn(async move { callback(message) });
            }
            None => self.faults.report(
                self.channel_id,
                ChannelError::UndeliverableMessage(Box::new(message)),
            ),
        }
    }
}
