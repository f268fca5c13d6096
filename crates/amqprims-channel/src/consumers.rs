use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{ChannelError, Result};
use crate::message::IncomingMessage;

/// Active consumers on one channel, keyed by consumer tag.
///
/// Each consumer is an unbounded queue; the channel hands deliveries off
/// here and the application drains them through [`crate::Consumer`].
#[derive(Default)]
pub struct ConsumerRegistry {
    consumers: Mutex<HashMap<String, mpsc::UnboundedSender<IncomingMessage>>>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(
        &self,
    ) -> MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<IncomingMessage>>> {
        self.consumers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start routing deliveries for `consumer_tag`.
    pub fn add(&self, consumer_tag: &str) -> mpsc::UnboundedReceiver<IncomingMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.lock().insert(consumer_tag.to_string(), tx).is_some() {
            warn!(consumer_tag, "consumer tag reused; previous consumer detached");
        }
        rx
    }

    /// Hand a delivery to its consumer.
    ///
    /// A dropped [`crate::Consumer`] stays registered until cancel-ok, since
    /// the server keeps delivering to its tag; those deliveries are discarded.
    pub fn deliver(&self, consumer_tag: &str, message: IncomingMessage) -> Result<()> {
        let consumers = self.lock();
        let Some(tx) = consumers.get(consumer_tag) else {
            return Err(ChannelError::UnknownConsumer(consumer_tag.to_string()));
        };
        if let Err(mpsc::error::SendError(message)) = tx.send(message) {
            debug!(
                consumer_tag,
                delivery_tag = ?message.delivery_tag(),
                "consumer dropped; delivery discarded"
            );
        }
        Ok(())
    }

    /// Stop routing for `consumer_tag`. Returns false if it was unknown.
    pub fn cancel(&self, consumer_tag: &str) -> bool {
        self.lock().remove(consumer_tag).is_some()
    }

    /// Drop every consumer; their receivers see end-of-stream.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn contains(&self, consumer_tag: &str) -> bool {
        self.lock().contains_key(consumer_tag)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
