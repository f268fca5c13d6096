//! Channel allocation and wiring.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info, warn};

use crate::catcher::Catcher;
use crate::channel::{Channel, ChannelInner};
use crate::config::ConnectionConfig;
use crate::consumers::ConsumerRegistry;
use crate::dispatcher::{Dispatcher, Readiness};
use crate::error::{ChannelError, CloseReason, Result};
use crate::fault::FaultReporter;
use crate::handler::ChannelFrameHandler;
use crate::receiver::MessageReceiver;
use crate::sender::{ChannelMethodSender, FrameSink};
use crate::synchroniser::{Synchroniser, WaitKey};

struct OpenChannel {
    id: u16,
    synchroniser: Weak<Synchroniser>,
    consumers: Weak<ConsumerRegistry>,
}

/// Hands out channels on one connection.
///
/// Ids are allocated from 1 upward and never reused, even when the open
/// handshake fails.
pub struct ChannelFactory {
    next_id: AtomicU32,
    config: ConnectionConfig,
    sink: Arc<dyn FrameSink>,
    dispatcher: Arc<Dispatcher>,
    faults: FaultReporter,
    channels: Mutex<Vec<OpenChannel>>,
}

impl ChannelFactory {
    pub fn new(
        config: ConnectionConfig,
        sink: Arc<dyn FrameSink>,
        dispatcher: Arc<Dispatcher>,
        faults: FaultReporter,
    ) -> Self {
        Self {
            next_id: AtomicU32::new(u32::from(amqprims_frame::FIRST_CHANNEL)),
            config,
            sink,
            dispatcher,
            faults,
            channels: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OpenChannel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate_id(&self) -> Result<u16> {
        let max = u32::from(self.config.max_channel_id());
        self.next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| {
                (id <= max).then_some(id + 1)
            })
            .ok()
            .and_then(|id| u16::try_from(id).ok())
            .ok_or(ChannelError::ChannelLimit(self.config.max_channel_id()))
    }

    /// Open a new channel and wait for the server to confirm it.
    pub async fn open(&self) -> Result<Channel> {
        let id = self.allocate_id()?;
        let synchroniser = Arc::new(Synchroniser::new());
        let readiness = Readiness::new(id);
        let consumers = Arc::new(ConsumerRegistry::new());
        let catcher = Arc::new(Catcher::new(id, self.faults.clone()));
        let sender = ChannelMethodSender::new(id, Arc::clone(&self.sink), self.config.frame_max);

        let receiver = MessageReceiver::new(
            id,
            Arc::clone(&synchroniser),
            readiness.clone(),
            Arc::clone(&consumers),
            Arc::clone(&catcher),
            sender.clone(),
            self.faults.clone(),
        );
        let handler = ChannelFrameHandler::new(
            id,
            Arc::clone(&synchroniser),
            readiness.clone(),
            receiver,
            Arc::clone(&consumers),
            sender.clone(),
            self.faults.clone(),
        );
        self.dispatcher.add_handler(id, handler, readiness.clone());

        if let Err(err) = handshake(&synchroniser, &sender, &readiness).await {
            warn!(channel_id = id, error = %err, "channel open failed");
            self.dispatcher.remove_handler(id);
            synchroniser.close(CloseReason::Fault(err.to_string()));
            return Err(err);
        }

        {
            let mut channels = self.lock();
            channels.retain(|open| open.synchroniser.strong_count() > 0);
            channels.push(OpenChannel {
                id,
                synchroniser: Arc::downgrade(&synchroniser),
                consumers: Arc::downgrade(&consumers),
            });
        }
        info!(channel_id = id, "channel open");

        Ok(Channel::new(Arc::new(ChannelInner {
            id,
            synchroniser,
            sender,
            catcher,
            dispatcher: Arc::clone(&self.dispatcher),
        })))
    }

    /// Fail every live channel after the transport has gone away.
    pub fn connection_lost(&self) {
        let channels = std::mem::take(&mut *self.lock());
        for open in channels {
            if let Some(synchroniser) = open.synchroniser.upgrade() {
                synchroniser.close(CloseReason::ConnectionLost);
            }
            if let Some(consumers) = open.consumers.upgrade() {
                consumers.clear();
            }
            debug!(channel_id = open.id, "channel dropped with connection");
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

async fn handshake(
    synchroniser: &Synchroniser,
    sender: &ChannelMethodSender,
    readiness: &Readiness,
) -> Result<()> {
    let wait = synchroniser.register(WaitKey::ChannelOpenOk)?;
    sender.send_open()?;
    readiness.ready();
    wait.await?;
    Ok(())
}
