use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use amqprims_frame::method::{
    BasicCancel, BasicConsume, BasicGet, QueueBind, QueueDeclareOk, QueueDelete, QueuePurge,
    QueueUnbind,
};
use amqprims_frame::{FieldTable, Method};
use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::channel::{unexpected, ChannelInner};
use crate::error::Result;
use crate::exchange::Exchange;
use crate::message::IncomingMessage;
use crate::synchroniser::{Response, WaitKey};

/// A declared queue.
#[derive(Clone)]
pub struct Queue {
    channel: Arc<ChannelInner>,
    name: String,
    durable: bool,
    exclusive: bool,
    auto_delete: bool,
    message_count: u32,
    consumer_count: u32,
}

/// Options for [`Queue::consume`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumeOptions {
    /// Empty lets the server assign a tag.
    pub consumer_tag: String,
    pub no_local: bool,
    /// Deliveries count as acknowledged as soon as they are sent.
    pub no_ack: bool,
    pub exclusive: bool,
    pub arguments: FieldTable,
}

impl Queue {
    pub(crate) fn new(
        channel: Arc<ChannelInner>,
        declared: QueueDeclareOk,
        durable: bool,
        exclusive: bool,
        auto_delete: bool,
    ) -> Self {
        Self {
            channel,
            name: declared.queue,
            durable,
            exclusive,
            auto_delete,
            message_count: declared.message_count,
            consumer_count: declared.consumer_count,
        }
    }

    /// The queue name, as assigned by the server for anonymous queues.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn durable(&self) -> bool {
        self.durable
    }

    pub fn exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn auto_delete(&self) -> bool {
        self.auto_delete
    }

    /// Messages in the queue when it was declared.
    pub fn message_count(&self) -> u32 {
        self.message_count
    }

    /// Consumers on the queue when it was declared.
    pub fn consumer_count(&self) -> u32 {
        self.consumer_count
    }

    /// Route messages published to `exchange` with `routing_key` here.
    pub async fn bind(&self, exchange: &Exchange, routing_key: &str) -> Result<QueueBinding> {
        self.bind_with_arguments(exchange, routing_key, FieldTable::new())
            .await
    }

    pub async fn bind_with_arguments(
        &self,
        exchange: &Exchange,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<QueueBinding> {
        self.channel
            .call_ack(
                WaitKey::QueueBindOk,
                Method::QueueBind(QueueBind {
                    queue: self.name.clone(),
                    exchange: exchange.name().to_string(),
                    routing_key: routing_key.to_string(),
                    no_wait: false,
                    arguments: arguments.clone(),
                }),
            )
            .await?;
        debug!(
            channel_id = self.channel.id,
            queue = %self.name,
            exchange = exchange.name(),
            routing_key,
            "queue bound"
        );
        Ok(QueueBinding {
            channel: Arc::clone(&self.channel),
            queue: self.name.clone(),
            exchange: exchange.name().to_string(),
            routing_key: routing_key.to_string(),
            arguments,
        })
    }

    /// Fetch one message, or `None` if the queue is empty.
    pub async fn get(&self, no_ack: bool) -> Result<Option<IncomingMessage>> {
        let method = Method::BasicGet(BasicGet {
            queue: self.name.clone(),
            no_ack,
        });
        match self.channel.call(WaitKey::BasicGet, method).await? {
            Response::Get(message) => Ok(message),
            other => Err(unexpected(other)),
        }
    }

    /// Start a consumer. Deliveries arrive on the returned [`Consumer`].
    pub async fn consume(&self, options: ConsumeOptions) -> Result<Consumer> {
        let method = Method::BasicConsume(BasicConsume {
            queue: self.name.clone(),
            consumer_tag: options.consumer_tag,
            no_local: options.no_local,
            no_ack: options.no_ack,
            exclusive: options.exclusive,
            no_wait: false,
            arguments: options.arguments,
        });
        match self.channel.call(WaitKey::BasicConsumeOk, method).await? {
            Response::ConsumeStarted {
                consumer_tag,
                messages,
            } => {
                debug!(channel_id = self.channel.id, queue = %self.name, consumer_tag = %consumer_tag, "consuming");
                Ok(Consumer {
                    channel: Arc::clone(&self.channel),
                    queue: self.name.clone(),
                    tag: consumer_tag,
                    messages,
                })
            }
            other => Err(unexpected(other)),
        }
    }

    /// Remove every message not awaiting acknowledgement. Returns the
    /// number purged.
    pub async fn purge(&self) -> Result<u32> {
        let method = Method::QueuePurge(QueuePurge {
            queue: self.name.clone(),
            no_wait: false,
        });
        match self.channel.call(WaitKey::QueuePurgeOk, method).await? {
            Response::MessageCount(count) => Ok(count),
            other => Err(unexpected(other)),
        }
    }

    /// Delete the queue. Returns the number of messages deleted with it.
    pub async fn delete(&self, if_unused: bool, if_empty: bool) -> Result<u32> {
        let method = Method::QueueDelete(QueueDelete {
            queue: self.name.clone(),
            if_unused,
            if_empty,
            no_wait: false,
        });
        match self.channel.call(WaitKey::QueueDeleteOk, method).await? {
            Response::MessageCount(count) => Ok(count),
            other => Err(unexpected(other)),
        }
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("channel_id", &self.channel.id)
            .field("name", &self.name)
            .field("message_count", &self.message_count)
            .finish()
    }
}

/// A binding created by [`Queue::bind`].
pub struct QueueBinding {
    channel: Arc<ChannelInner>,
    queue: String,
    exchange: String,
    routing_key: String,
    arguments: FieldTable,
}

impl QueueBinding {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Remove the binding.
    pub async fn unbind(self) -> Result<()> {
        self.channel
            .call_ack(
                WaitKey::QueueUnbindOk,
                Method::QueueUnbind(QueueUnbind {
                    queue: self.queue,
                    exchange: self.exchange,
                    routing_key: self.routing_key,
                    arguments: self.arguments,
                }),
            )
            .await
    }
}

/// Deliveries for one consumer tag.
///
/// Also a [`Stream`] of messages. The stream ends when the consumer is
/// cancelled or its channel closes.
pub struct Consumer {
    channel: Arc<ChannelInner>,
    queue: String,
    tag: String,
    messages: mpsc::UnboundedReceiver<IncomingMessage>,
}

impl Consumer {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// The next delivery, or `None` once the consumer has ended.
    pub async fn recv(&mut self) -> Option<IncomingMessage> {
        self.messages.recv().await
    }

    /// Stop the server sending deliveries to this consumer. Messages
    /// already received can still be drained with [`Consumer::recv`].
    pub async fn cancel(&mut self) -> Result<()> {
        self.channel
            .call_ack(
                WaitKey::BasicCancelOk(self.tag.clone()),
                Method::BasicCancel(BasicCancel {
                    consumer_tag: self.tag.clone(),
                    no_wait: false,
                }),
            )
            .await
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("channel_id", &self.channel.id)
            .field("queue", &self.queue)
            .field("tag", &self.tag)
            .finish()
    }
}

impl Stream for Consumer {
    type Item = IncomingMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.messages.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use amqprims_frame::method::{BasicDeliver, BasicGetOk};
    use amqprims_frame::{BasicProperties, ContentHeader, Frame};
    use bytes::Bytes;
    use futures_util::StreamExt;

    use super::*;
    use crate::channel::{Channel, ExchangeOptions, QueueOptions};
    use crate::connection::testing::{settle, Loopback};
    use crate::error::ChannelError;

    async fn declared(lb: &Loopback, channel: &Channel, name: &str) -> Queue {
        lb.serve(channel.declare_queue(name, QueueOptions::default()), |req| {
            let queue = match req.as_method() {
                Some(Method::QueueDeclare(declare)) => declare.queue.clone(),
                other => panic!("expected queue.declare, got {other:?}"),
            };
            vec![Frame::method(
                req.channel,
                Method::QueueDeclareOk(QueueDeclareOk {
                    queue,
                    message_count: 0,
                    consumer_count: 0,
                }),
            )]
        })
        .await
        .unwrap()
    }

    async fn consuming(lb: &Loopback, queue: &Queue, tag: &'static str) -> Consumer {
        lb.serve(queue.consume(ConsumeOptions::default()), move |req| {
            vec![Frame::method(
                req.channel,
                Method::BasicConsumeOk {
                    consumer_tag: tag.to_string(),
                },
            )]
        })
        .await
        .unwrap()
    }

    fn delivery(channel: u16, tag: &str, delivery_tag: u64, body: &'static [u8]) -> Vec<Frame> {
        vec![
            Frame::method(
                channel,
                Method::BasicDeliver(BasicDeliver {
                    consumer_tag: tag.to_string(),
                    delivery_tag,
                    redelivered: false,
                    exchange: "ex".to_string(),
                    routing_key: "rk".to_string(),
                }),
            ),
            Frame::header(
                channel,
                ContentHeader::basic(body.len() as u64, BasicProperties::default()),
            ),
            Frame::content(channel, Bytes::from_static(body)),
        ]
    }

    async fn next(consumer: &mut Consumer) -> Option<IncomingMessage> {
        tokio::time::timeout(Duration::from_secs(1), consumer.recv())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn bind_and_unbind() {
        let lb = Loopback::new();
        let channel = lb.open().await;
        let queue = declared(&lb, &channel, "jobs").await;
        let exchange = lb
            .serve(
                channel.declare_exchange("work", "direct", ExchangeOptions::default()),
                |req| vec![Frame::method(req.channel, Method::ExchangeDeclareOk)],
            )
            .await
            .unwrap();

        let binding = lb
            .serve(queue.bind(&exchange, "high"), |req| {
                vec![Frame::method(req.channel, Method::QueueBindOk)]
            })
            .await
            .unwrap();
        assert!(matches!(
            lb.last_method(),
            Method::QueueBind(QueueBind { ref queue, ref exchange, ref routing_key, .. })
                if queue == "jobs" && exchange == "work" && routing_key == "high"
        ));
        assert_eq!(binding.routing_key(), "high");

        lb.serve(binding.unbind(), |req| {
            vec![Frame::method(req.channel, Method::QueueUnbindOk)]
        })
        .await
        .unwrap();
        assert!(matches!(lb.last_method(), Method::QueueUnbind(_)));
    }

    #[tokio::test]
    async fn get_returns_reassembled_message() {
        let lb = Loopback::new();
        let channel = lb.open().await;
        let queue = declared(&lb, &channel, "jobs").await;

        let message = lb
            .serve(queue.get(false), |req| {
                vec![
                    Frame::method(
                        req.channel,
                        Method::BasicGetOk(BasicGetOk {
                            delivery_tag: 9,
                            redelivered: true,
                            exchange: String::new(),
                            routing_key: "jobs".to_string(),
                            message_count: 4,
                        }),
                    ),
                    Frame::header(
                        req.channel,
                        ContentHeader::basic(
                            10,
                            BasicProperties {
                                content_type: Some("application/json".to_string()),
                                ..BasicProperties::default()
                            },
                        ),
                    ),
                    Frame::content(req.channel, Bytes::from_static(b"{\"id\":")),
                    Frame::content(req.channel, Bytes::from_static(b"42}\n")),
                ]
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(message.delivery_tag(), Some(9));
        assert_eq!(message.info().message_count, Some(4));
        assert!(message.info().redelivered);
        let value: serde_json::Value = message.json().unwrap();
        assert_eq!(value["id"], 42);

        message.reject(true).unwrap();
        assert!(matches!(
            lb.last_method(),
            Method::BasicReject(amqprims_frame::method::BasicReject {
                delivery_tag: 9,
                requeue: true,
            })
        ));
    }

    #[tokio::test]
    async fn get_on_empty_queue() {
        let lb = Loopback::new();
        let channel = lb.open().await;
        let queue = declared(&lb, &channel, "jobs").await;
        let message = lb
            .serve(queue.get(true), |req| {
                vec![Frame::method(req.channel, Method::BasicGetEmpty)]
            })
            .await
            .unwrap();
        assert!(message.is_none());
    }

    #[tokio::test]
    async fn consume_then_cancel_ends_stream() {
        let lb = Loopback::new();
        let channel = lb.open().await;
        let queue = declared(&lb, &channel, "jobs").await;
        let mut consumer = consuming(&lb, &queue, "ctag-1").await;
        assert_eq!(consumer.tag(), "ctag-1");

        lb.feed(delivery(channel.id(), "ctag-1", 1, b"one"));
        lb.feed(delivery(channel.id(), "ctag-1", 2, b"two"));
        let first = next(&mut consumer).await.unwrap();
        let second = consumer.next().await.unwrap();
        assert_eq!(first.body().as_ref(), b"one");
        assert_eq!(second.delivery_tag(), Some(2));
        assert_eq!(second.consumer_tag(), Some("ctag-1"));

        lb.serve(consumer.cancel(), |req| {
            vec![Frame::method(
                req.channel,
                Method::BasicCancelOk {
                    consumer_tag: "ctag-1".to_string(),
                },
            )]
        })
        .await
        .unwrap();
        assert!(next(&mut consumer).await.is_none());
    }

    #[tokio::test]
    async fn cancel_waits_for_matching_tag() {
        let lb = Loopback::new();
        let channel = lb.open().await;
        let queue = declared(&lb, &channel, "jobs").await;
        let mut consumer = consuming(&lb, &queue, "ctag-a").await;
        let mut other = consuming(&lb, &queue, "ctag-b").await;

        lb.serve(consumer.cancel(), |req| {
            assert!(matches!(
                req.as_method(),
                Some(Method::BasicCancel(BasicCancel { consumer_tag, .. })) if consumer_tag == "ctag-a"
            ));
            vec![Frame::method(
                req.channel,
                Method::BasicCancelOk {
                    consumer_tag: "ctag-a".to_string(),
                },
            )]
        })
        .await
        .unwrap();

        lb.feed(delivery(channel.id(), "ctag-b", 5, b"still here"));
        assert_eq!(next(&mut other).await.unwrap().delivery_tag(), Some(5));
    }

    #[tokio::test]
    async fn dropping_a_consumer_keeps_the_channel_open() {
        let mut lb = Loopback::new();
        let channel = lb.open().await;
        let queue = declared(&lb, &channel, "jobs").await;
        drop(consuming(&lb, &queue, "c").await);

        lb.feed(delivery(channel.id(), "c", 1, b"one"));
        lb.feed(delivery(channel.id(), "c", 2, b"two"));
        lb.serve(channel.set_qos(0, 10, false), |req| {
            vec![Frame::method(req.channel, Method::BasicQosOk)]
        })
        .await
        .unwrap();

        assert!(!channel.is_closed());
        assert!(lb.faults.try_recv().is_err());
    }

    #[tokio::test]
    async fn purge_and_delete_report_counts() {
        let lb = Loopback::new();
        let channel = lb.open().await;
        let queue = declared(&lb, &channel, "jobs").await;

        let purged = lb
            .serve(queue.purge(), |req| {
                vec![Frame::method(
                    req.channel,
                    Method::QueuePurgeOk { message_count: 12 },
                )]
            })
            .await
            .unwrap();
        assert_eq!(purged, 12);

        let deleted = lb
            .serve(queue.delete(false, true), |req| {
                vec![Frame::method(
                    req.channel,
                    Method::QueueDeleteOk { message_count: 0 },
                )]
            })
            .await
            .unwrap();
        assert_eq!(deleted, 0);
        assert!(matches!(
            lb.last_method(),
            Method::QueueDelete(QueueDelete {
                if_unused: false,
                if_empty: true,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn channels_reassemble_independently() {
        let lb = Loopback::new();
        let left = lb.open().await;
        let right = lb.open().await;
        let left_queue = declared(&lb, &left, "left").await;
        let right_queue = declared(&lb, &right, "right").await;
        let mut left_consumer = consuming(&lb, &left_queue, "l").await;
        let mut right_consumer = consuming(&lb, &right_queue, "r").await;

        let l = delivery(left.id(), "l", 1, b"left body");
        let r = delivery(right.id(), "r", 1, b"right body");
        let mut interleaved = Vec::new();
        for (a, b) in l.into_iter().zip(r) {
            interleaved.push(a);
            interleaved.push(b);
        }
        lb.feed(interleaved);

        assert_eq!(
            next(&mut left_consumer).await.unwrap().body().as_ref(),
            b"left body"
        );
        assert_eq!(
            next(&mut right_consumer).await.unwrap().body().as_ref(),
            b"right body"
        );
    }

    #[tokio::test]
    async fn peer_close_ends_consumers() {
        let lb = Loopback::new();
        let channel = lb.open().await;
        let queue = declared(&lb, &channel, "jobs").await;
        let mut consumer = consuming(&lb, &queue, "ctag").await;

        lb.feed(vec![Frame::method(
            channel.id(),
            Method::ChannelClose(amqprims_frame::method::ChannelClose {
                reply_code: 320,
                reply_text: "CONNECTION_FORCED".to_string(),
                ..Default::default()
            }),
        )]);
        settle().await;

        assert!(next(&mut consumer).await.is_none());
        assert!(matches!(
            queue.get(false).await,
            Err(ChannelError::ClosedByPeer { reply_code: 320, .. })
        ));
    }
}
