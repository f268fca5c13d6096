use std::sync::Arc;

use amqprims_frame::method::{BasicQos, ExchangeDeclare, QueueDeclare};
use amqprims_frame::{FieldTable, Method};
use tracing::{debug, info};

use crate::catcher::Catcher;
use crate::dispatcher::Dispatcher;
use crate::error::{ChannelError, Result};
use crate::exchange::Exchange;
use crate::message::IncomingMessage;
use crate::queue::Queue;
use crate::sender::ChannelMethodSender;
use crate::synchroniser::{Response, Synchroniser, WaitKey};
use crate::validate::{validate_exchange_name, validate_queue_name};

/// Reply code sent when the application closes a channel.
const CLOSE_REPLY_CODE: u16 = 0;
const CLOSE_REPLY_TEXT: &str = "Channel closed by application";

/// State shared by a channel and the exchanges, queues and consumers
/// created from it.
pub(crate) struct ChannelInner {
    pub(crate) id: u16,
    pub(crate) synchroniser: Arc<Synchroniser>,
    pub(crate) sender: ChannelMethodSender,
    pub(crate) catcher: Arc<Catcher>,
    pub(crate) dispatcher: Arc<Dispatcher>,
}

impl ChannelInner {
    /// Register the completion wait, send the request, await the response.
    pub(crate) async fn call(&self, key: WaitKey, method: Method) -> Result<Response> {
        let wait = self.synchroniser.register(key)?;
        self.sender.send_method(method)?;
        wait.await
    }

    pub(crate) async fn call_ack(&self, key: WaitKey, method: Method) -> Result<()> {
        match self.call(key, method).await? {
            Response::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        self.synchroniser.ensure_open()
    }
}

pub(crate) fn unexpected(response: Response) -> ChannelError {
    ChannelError::UnexpectedResponse(format!("{response:?}"))
}

/// Options for [`Channel::declare_exchange`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOptions {
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    /// Only check that the exchange exists.
    pub passive: bool,
    /// Do not wait for declare-ok.
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            durable: true,
            auto_delete: false,
            internal: false,
            passive: false,
            no_wait: false,
            arguments: FieldTable::new(),
        }
    }
}

/// Options for [`Channel::declare_queue`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueueOptions {
    pub durable: bool,
    pub exclusive: bool,
    /// Passed to the server as declared.
    pub auto_delete: bool,
    pub passive: bool,
    pub arguments: FieldTable,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            durable: true,
            exclusive: false,
            auto_delete: false,
            passive: false,
            arguments: FieldTable::new(),
        }
    }
}

/// An open AMQP channel.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Channel {
    pub(crate) fn new(inner: Arc<ChannelInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> u16 {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.synchroniser.is_closed()
    }

    /// Declare an exchange. `kind` is the exchange type (`direct`,
    /// `fanout`, `topic`, `headers`).
    pub async fn declare_exchange(
        &self,
        name: &str,
        kind: &str,
        options: ExchangeOptions,
    ) -> Result<Exchange> {
        validate_exchange_name(name)?;
        self.inner.ensure_open()?;

        let method = Method::ExchangeDeclare(ExchangeDeclare {
            exchange: name.to_string(),
            kind: kind.to_string(),
            passive: options.passive,
            durable: options.durable,
            auto_delete: options.auto_delete,
            internal: options.internal,
            no_wait: options.no_wait,
            arguments: options.arguments,
        });
        if options.no_wait {
            self.inner.sender.send_method(method)?;
        } else {
            self.inner
                .call_ack(WaitKey::ExchangeDeclareOk, method)
                .await?;
        }
        debug!(channel_id = self.inner.id, exchange = name, kind, "exchange declared");

        Ok(Exchange::new(
            Arc::clone(&self.inner),
            name.to_string(),
            kind.to_string(),
            options.durable,
            options.auto_delete,
            options.internal,
        ))
    }

    /// The nameless direct exchange every queue is bound to by its name.
    /// No frame is sent.
    pub fn default_exchange(&self) -> Exchange {
        Exchange::new(
            Arc::clone(&self.inner),
            String::new(),
            "direct".to_string(),
            true,
            false,
            false,
        )
    }

    /// Declare a queue. An empty name asks the server to generate one.
    pub async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<Queue> {
        validate_queue_name(name)?;
        self.inner.ensure_open()?;

        let method = Method::QueueDeclare(QueueDeclare {
            queue: name.to_string(),
            passive: options.passive,
            durable: options.durable,
            exclusive: options.exclusive,
            auto_delete: options.auto_delete,
            no_wait: false,
            arguments: options.arguments,
        });
        let ok = match self.inner.call(WaitKey::QueueDeclareOk, method).await? {
            Response::QueueDeclared(ok) => ok,
            other => return Err(unexpected(other)),
        };
        debug!(
            channel_id = self.inner.id,
            queue = %ok.queue,
            messages = ok.message_count,
            consumers = ok.consumer_count,
            "queue declared"
        );

        Ok(Queue::new(
            Arc::clone(&self.inner),
            ok,
            options.durable,
            options.exclusive,
            options.auto_delete,
        ))
    }

    /// Limit unacknowledged deliveries the server pushes ahead.
    pub async fn set_qos(
        &self,
        prefetch_size: u32,
        prefetch_count: u16,
        global: bool,
    ) -> Result<()> {
        self.inner
            .call_ack(
                WaitKey::BasicQosOk,
                Method::BasicQos(BasicQos {
                    prefetch_size,
                    prefetch_count,
                    global,
                }),
            )
            .await
    }

    /// Handle messages the server returns as unroutable (`mandatory`
    /// publishes). The callback runs on its own task.
    pub fn set_return_handler<F>(&self, callback: F)
    where
        F: Fn(IncomingMessage) + Send + Sync + 'static,
    {
        self.inner.catcher.set_callback(callback);
    }

    /// Report returned messages as faults again.
    pub fn clear_return_handler(&self) {
        self.inner.catcher.clear_callback();
    }

    /// Close the channel with the server and stop processing its frames.
    pub async fn close(&self) -> Result<()> {
        let wait = self.inner.synchroniser.register(WaitKey::ChannelCloseOk)?;
        self.inner
            .sender
            .send_close(CLOSE_REPLY_CODE, CLOSE_REPLY_TEXT)?;
        wait.await?;
        self.inner.dispatcher.remove_handler(self.inner.id);
        info!(channel_id = self.inner.id, "channel closed");
        Ok(())
    }
}
