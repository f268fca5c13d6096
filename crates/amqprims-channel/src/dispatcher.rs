//! Routes incoming frames to per-channel queues and pumps each queue into
//! its handler one frame at a time, gated on the handler's readiness.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use amqprims_frame::Frame;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{ChannelError, Result};
use crate::fault::FaultReporter;

/// Consumes the frames of one channel.
pub trait FrameHandler: Send + 'static {
    /// Process one frame. An error is fatal to the channel.
    fn handle(&mut self, frame: Frame) -> Result<()>;

    /// Called once after `handle` failed, before the pump stops.
    fn fail(&mut self, _error: &ChannelError) {}

    /// True once the channel will process no further frames.
    fn is_finished(&self) -> bool {
        false
    }
}

struct ReadinessInner {
    notify: Notify,
    armed: AtomicBool,
}

/// Permission for the dispatcher to present the next frame.
///
/// Each `ready()` admits exactly one frame.
#[derive(Clone)]
pub struct Readiness {
    channel_id: u16,
    inner: Arc<ReadinessInner>,
}

impl Readiness {
    pub fn new(channel_id: u16) -> Self {
        Self {
            channel_id,
            inner: Arc::new(ReadinessInner {
                notify: Notify::new(),
                armed: AtomicBool::new(false),
            }),
        }
    }

    /// Signal that the next frame may be delivered.
    pub fn ready(&self) {
        if self.inner.armed.swap(true, Ordering::SeqCst) {
            warn!(
                channel_id = self.channel_id,
                "readiness signalled twice without an intervening frame"
            );
            return;
        }
        trace!(channel_id = self.channel_id, "ready");
        self.inner.notify.notify_one();
    }

    pub fn is_ready(&self) -> bool {
        self.inner.armed.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        self.inner.notify.notified().await;
    }

    fn consume(&self) {
        self.inner.armed.store(false, Ordering::SeqCst);
    }
}

struct ChannelQueue {
    tx: mpsc::UnboundedSender<Frame>,
    pump: JoinHandle<()>,
}

/// Connection-wide frame router.
pub struct Dispatcher {
    queues: Mutex<HashMap<u16, ChannelQueue>>,
    faults: FaultReporter,
}

impl Dispatcher {
    pub fn new(faults: FaultReporter) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            faults,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u16, ChannelQueue>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for `channel_id` and start its pump task.
    ///
    /// The pump waits for `readiness` before presenting each frame.
    pub fn add_handler<H: FrameHandler>(&self, channel_id: u16, handler: H, readiness: Readiness) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump(channel_id, handler, readiness, rx, self.faults.clone()));
        if let Some(previous) = self.lock().insert(channel_id, ChannelQueue { tx, pump }) {
            warn!(channel_id, "replacing existing channel handler");
            previous.pump.abort();
        }
        debug!(channel_id, "handler added");
    }

    /// Stop routing to `channel_id`. Frames still queued are dropped.
    pub fn remove_handler(&self, channel_id: u16) {
        if let Some(queue) = self.lock().remove(&channel_id) {
            queue.pump.abort();
            debug!(channel_id, "handler removed");
        }
    }

    /// Queue `frame` for its channel.
    pub fn dispatch(&self, frame: Frame) -> Result<()> {
        let channel_id = frame.channel;
        let mut queues = self.lock();
        let Some(queue) = queues.get(&channel_id) else {
            return Err(ChannelError::UnknownChannel(channel_id));
        };
        trace!(channel_id, kind = ?frame.kind(), "dispatch");
        if queue.tx.send(frame).is_err() {
            queues.remove(&channel_id);
            return Err(ChannelError::UnknownChannel(channel_id));
        }
        Ok(())
    }

    pub fn has_handler(&self, channel_id: u16) -> bool {
        self.lock().contains_key(&channel_id)
    }

    /// Abort every pump task.
    pub fn shutdown(&self) {
        for (_, queue) in self.lock().drain() {
            queue.pump.abort();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn pump<H: FrameHandler>(
    channel_id: u16,
    mut handler: H,
    readiness: Readiness,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    faults: FaultReporter,
) {
    loop {
        readiness.wait().await;
        let Some(frame) = rx.recv().await else {
            debug!(channel_id, "frame queue closed");
            return;
        };
        readiness.consume();

        if let Err(error) = handler.handle(frame) {
            handler.fail(&error);
            faults.report(channel_id, error);
            return;
        }
        if handler.is_finished() {
            debug!(channel_id, "channel finished; pump stopped");
            return;
        }
    }
}
