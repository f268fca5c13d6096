//! Per-channel rendezvous between request issuers and the frame path.
//!
//! A caller registers a [`WaitKey`] before sending its request, then awaits
//! the returned [`PendingWait`]. The channel's frame handler resolves the
//! oldest wait for a key when the matching response arrives.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use amqprims_frame::method::QueueDeclareOk;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::{ChannelError, CloseReason, Result};
use crate::message::IncomingMessage;

/// The event a pending wait is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WaitKey {
    ChannelOpenOk,
    ChannelCloseOk,
    ExchangeDeclareOk,
    ExchangeDeleteOk,
    QueueDeclareOk,
    QueueBindOk,
    QueueUnbindOk,
    QueuePurgeOk,
    QueueDeleteOk,
    BasicQosOk,
    BasicConsumeOk,
    /// Cancellations are correlated by consumer tag.
    BasicCancelOk(String),
    /// Resolved by get-ok (after reassembly) or get-empty.
    BasicGet,
    ContentHeader,
    ContentBody,
}

/// Value handed to the caller when its wait is resolved.
#[derive(Debug)]
pub enum Response {
    Ack,
    QueueDeclared(QueueDeclareOk),
    MessageCount(u32),
    ConsumeStarted {
        consumer_tag: String,
        messages: mpsc::UnboundedReceiver<IncomingMessage>,
    },
    Get(Option<IncomingMessage>),
    Content(IncomingMessage),
}

type Waiter = oneshot::Sender<Result<Response>>;

#[derive(Default)]
struct State {
    waits: HashMap<WaitKey, VecDeque<Waiter>>,
    closed: Option<CloseReason>,
}

/// FIFO-per-key table of pending waits.
#[derive(Default)]
pub struct Synchroniser {
    state: Mutex<State>,
}

impl Synchroniser {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register interest in `key`. Fails once the table has been closed.
    pub fn register(&self, key: WaitKey) -> Result<PendingWait> {
        let mut state = self.lock();
        if let Some(reason) = &state.closed {
            return Err(reason.clone().into());
        }
        let (tx, rx) = oneshot::channel();
        trace!(?key, "wait registered");
        state.waits.entry(key).or_default().push_back(tx);
        Ok(PendingWait { rx })
    }

    /// Complete the oldest wait registered for `key`.
    ///
    /// A wait whose caller stopped listening still consumes the response.
    pub fn resolve(&self, key: WaitKey, response: Response) -> Result<()> {
        let waiter = {
            let mut state = self.lock();
            let Some(queue) = state.waits.get_mut(&key) else {
                return Err(ChannelError::UnexpectedResponse(format!("{key:?}")));
            };
            let waiter = queue.pop_front();
            if queue.is_empty() {
                state.waits.remove(&key);
            }
            waiter
        };
        let Some(waiter) = waiter else {
            return Err(ChannelError::UnexpectedResponse(format!("{key:?}")));
        };
        if waiter.send(Ok(response)).is_err() {
            debug!(?key, "response arrived after its caller gave up");
        }
        Ok(())
    }

    /// Fail every pending wait with `reason` and refuse new registrations.
    pub fn close(&self, reason: CloseReason) {
        let waits = {
            let mut state = self.lock();
            if state.closed.is_none() {
                state.closed = Some(reason.clone());
            }
            std::mem::take(&mut state.waits)
        };
        for (_, queue) in waits {
            for waiter in queue {
                let _ = waiter.send(Err(reason.clone().into()));
            }
        }
    }

    /// Fails with the close reason once the table has been closed.
    pub fn ensure_open(&self) -> Result<()> {
        match &self.lock().closed {
            Some(reason) => Err(reason.clone().into()),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    /// Number of outstanding waits for `key`.
    pub fn pending(&self, key: &WaitKey) -> usize {
        self.lock().waits.get(key).map_or(0, VecDeque::len)
    }
}

/// Future returned by [`Synchroniser::register`].
#[must_use = "a pending wait does nothing unless awaited"]
pub struct PendingWait {
    rx: oneshot::Receiver<Result<Response>>,
}

impl Future for PendingWait {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ChannelError::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}
