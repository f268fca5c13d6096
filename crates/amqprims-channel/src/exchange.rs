use std::sync::Arc;

use amqprims_frame::method::ExchangeDelete;
use amqprims_frame::Method;

use crate::channel::ChannelInner;
use crate::error::Result;
use crate::message::Message;
use crate::synchroniser::WaitKey;

/// A declared exchange, bound to the channel it was declared on.
#[derive(Clone)]
pub struct Exchange {
    channel: Arc<ChannelInner>,
    name: String,
    kind: String,
    durable: bool,
    auto_delete: bool,
    internal: bool,
}

impl Exchange {
    pub(crate) fn new(
        channel: Arc<ChannelInner>,
        name: String,
        kind: String,
        durable: bool,
        auto_delete: bool,
        internal: bool,
    ) -> Self {
        Self {
            channel,
            name,
            kind,
            durable,
            auto_delete,
            internal,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn durable(&self) -> bool {
        self.durable
    }

    pub fn auto_delete(&self) -> bool {
        self.auto_delete
    }

    pub fn internal(&self) -> bool {
        self.internal
    }

    /// Publish `message`. With `mandatory`, unroutable messages come back
    /// through the channel's return handler.
    pub fn publish(&self, message: &Message, routing_key: &str, mandatory: bool) -> Result<()> {
        self.channel.ensure_open()?;
        self.channel
            .sender
            .send_publish(message, &self.name, routing_key, mandatory)
    }

    /// Delete the exchange. With `if_unused`, the server refuses while
    /// queues are still bound to it.
    pub async fn delete(&self, if_unused: bool) -> Result<()> {
        self.channel
            .call_ack(
                WaitKey::ExchangeDeleteOk,
                Method::ExchangeDelete(ExchangeDelete {
                    exchange: self.name.clone(),
                    if_unused,
                    no_wait: false,
                }),
            )
            .await
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("channel_id", &self.channel.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}
