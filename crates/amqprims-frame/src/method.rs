//! Method frame payloads for the channel, exchange, queue and basic classes.
//!
//! Every method is a variant of the closed [`Method`] enum, so decoding and
//! dispatching on a method is an exhaustive `match`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::field::{put_table, read_table, FieldTable};
use crate::wire::{bit, pack_bits, put_long_str, put_short_str, WireReader};

pub const CLASS_CHANNEL: u16 = 20;
pub const CLASS_EXCHANGE: u16 = 40;
pub const CLASS_QUEUE: u16 = 50;
pub const CLASS_BASIC: u16 = 60;

/// channel.close, sent by either side.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelClose {
    pub reply_code: u16,
    pub reply_text: String,
    pub class_id: u16,
    pub method_id: u16,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExchangeDeclare {
    pub exchange: String,
    pub kind: String,
    pub passive: bool,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExchangeDelete {
    pub exchange: String,
    pub if_unused: bool,
    pub no_wait: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueueDeclare {
    pub queue: String,
    pub passive: bool,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueDeclareOk {
    pub queue: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueueBind {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueueUnbind {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueuePurge {
    pub queue: String,
    pub no_wait: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueDelete {
    pub queue: String,
    pub if_unused: bool,
    pub if_empty: bool,
    pub no_wait: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicQos {
    pub prefetch_size: u32,
    pub prefetch_count: u16,
    pub global: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BasicConsume {
    pub queue: String,
    pub consumer_tag: String,
    pub no_local: bool,
    pub no_ack: bool,
    pub exclusive: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicCancel {
    pub consumer_tag: String,
    pub no_wait: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicPublish {
    pub exchange: String,
    pub routing_key: String,
    pub mandatory: bool,
    pub immediate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicReturn {
    pub reply_code: u16,
    pub reply_text: String,
    pub exchange: String,
    pub routing_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicDeliver {
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicGet {
    pub queue: String,
    pub no_ack: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicGetOk {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub message_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicAck {
    pub delivery_tag: u64,
    pub multiple: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicReject {
    pub delivery_tag: u64,
    pub requeue: bool,
}

/// A decoded method frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    ChannelOpen,
    ChannelOpenOk,
    ChannelClose(ChannelClose),
    ChannelCloseOk,
    ExchangeDeclare(ExchangeDeclare),
    ExchangeDeclareOk,
    ExchangeDelete(ExchangeDelete),
    ExchangeDeleteOk,
    QueueDeclare(QueueDeclare),
    QueueDeclareOk(QueueDeclareOk),
    QueueBind(QueueBind),
    QueueBindOk,
    QueueUnbind(QueueUnbind),
    QueueUnbindOk,
    QueuePurge(QueuePurge),
    QueuePurgeOk { message_count: u32 },
    QueueDelete(QueueDelete),
    QueueDeleteOk { message_count: u32 },
    BasicQos(BasicQos),
    BasicQosOk,
    BasicConsume(BasicConsume),
    BasicConsumeOk { consumer_tag: String },
    BasicCancel(BasicCancel),
    BasicCancelOk { consumer_tag: String },
    BasicPublish(BasicPublish),
    BasicReturn(BasicReturn),
    BasicDeliver(BasicDeliver),
    BasicGet(BasicGet),
    BasicGetOk(BasicGetOk),
    BasicGetEmpty,
    BasicAck(BasicAck),
    BasicReject(BasicReject),
}

impl Method {
    /// The (class id, method id) pair identifying this method on the wire.
    pub fn ids(&self) -> (u16, u16) {
        match self {
            Method::ChannelOpen => (CLASS_CHANNEL, 10),
            Method::ChannelOpenOk => (CLASS_CHANNEL, 11),
            Method::ChannelClose(_) => (CLASS_CHANNEL, 40),
            Method::ChannelCloseOk => (CLASS_CHANNEL, 41),
            Method::ExchangeDeclare(_) => (CLASS_EXCHANGE, 10),
            Method::ExchangeDeclareOk => (CLASS_EXCHANGE, 11),
            Method::ExchangeDelete(_) => (CLASS_EXCHANGE, 20),
            Method::ExchangeDeleteOk => (CLASS_EXCHANGE, 21),
            Method::QueueDeclare(_) => (CLASS_QUEUE, 10),
            Method::QueueDeclareOk(_) => (CLASS_QUEUE, 11),
            Method::QueueBind(_) => (CLASS_QUEUE, 20),
            Method::QueueBindOk => (CLASS_QUEUE, 21),
            Method::QueuePurge(_) => (CLASS_QUEUE, 30),
            Method::QueuePurgeOk { .. } => (CLASS_QUEUE, 31),
            Method::QueueDelete(_) => (CLASS_QUEUE, 40),
            Method::QueueDeleteOk { .. } => (CLASS_QUEUE, 41),
            Method::QueueUnbind(_) => (CLASS_QUEUE, 50),
            Method::QueueUnbindOk => (CLASS_QUEUE, 51),
            Method::BasicQos(_) => (CLASS_BASIC, 10),
            Method::BasicQosOk => (CLASS_BASIC, 11),
            Method::BasicConsume(_) => (CLASS_BASIC, 20),
            Method::BasicConsumeOk { .. } => (CLASS_BASIC, 21),
            Method::BasicCancel(_) => (CLASS_BASIC, 30),
            Method::BasicCancelOk { .. } => (CLASS_BASIC, 31),
            Method::BasicPublish(_) => (CLASS_BASIC, 40),
            Method::BasicReturn(_) => (CLASS_BASIC, 50),
            Method::BasicDeliver(_) => (CLASS_BASIC, 60),
            Method::BasicGet(_) => (CLASS_BASIC, 70),
            Method::BasicGetOk(_) => (CLASS_BASIC, 71),
            Method::BasicGetEmpty => (CLASS_BASIC, 72),
            Method::BasicAck(_) => (CLASS_BASIC, 80),
            Method::BasicReject(_) => (CLASS_BASIC, 90),
        }
    }

    /// Dotted protocol name, e.g. `basic.deliver`.
    pub fn name(&self) -> &'static str {
        match self {
            Method::ChannelOpen => "channel.open",
            Method::ChannelOpenOk => "channel.open-ok",
            Method::ChannelClose(_) => "channel.close",
            Method::ChannelCloseOk => "channel.close-ok",
            Method::ExchangeDeclare(_) => "exchange.declare",
            Method::ExchangeDeclareOk => "exchange.declare-ok",
            Method::ExchangeDelete(_) => "exchange.delete",
            Method::ExchangeDeleteOk => "exchange.delete-ok",
            Method::QueueDeclare(_) => "queue.declare",
            Method::QueueDeclareOk(_) => "queue.declare-ok",
            Method::QueueBind(_) => "queue.bind",
            Method::QueueBindOk => "queue.bind-ok",
            Method::QueueUnbind(_) => "queue.unbind",
            Method::QueueUnbindOk => "queue.unbind-ok",
            Method::QueuePurge(_) => "queue.purge",
            Method::QueuePurgeOk { .. } => "queue.purge-ok",
            Method::QueueDelete(_) => "queue.delete",
            Method::QueueDeleteOk { .. } => "queue.delete-ok",
            Method::BasicQos(_) => "basic.qos",
            Method::BasicQosOk => "basic.qos-ok",
            Method::BasicConsume(_) => "basic.consume",
            Method::BasicConsumeOk { .. } => "basic.consume-ok",
            Method::BasicCancel(_) => "basic.cancel",
            Method::BasicCancelOk { .. } => "basic.cancel-ok",
            Method::BasicPublish(_) => "basic.publish",
            Method::BasicReturn(_) => "basic.return",
            Method::BasicDeliver(_) => "basic.deliver",
            Method::BasicGet(_) => "basic.get",
            Method::BasicGetOk(_) => "basic.get-ok",
            Method::BasicGetEmpty => "basic.get-empty",
            Method::BasicAck(_) => "basic.ack",
            Method::BasicReject(_) => "basic.reject",
        }
    }

    /// True for methods that are followed by a content header and body.
    pub fn carries_content(&self) -> bool {
        matches!(
            self,
            Method::BasicPublish(_)
                | Method::BasicReturn(_)
                | Method::BasicDeliver(_)
                | Method::BasicGetOk(_)
        )
    }

    /// Encode class id, method id and arguments.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let (class_id, method_id) = self.ids();
        dst.put_u16(class_id);
        dst.put_u16(method_id);

        match self {
            Method::ChannelOpen => put_short_str(dst, "")?,
            Method::ChannelOpenOk => put_long_str(dst, b"")?,
            Method::ChannelClose(m) => {
                dst.put_u16(m.reply_code);
                put_short_str(dst, &m.reply_text)?;
                dst.put_u16(m.class_id);
                dst.put_u16(m.method_id);
            }
            Method::ChannelCloseOk
            | Method::ExchangeDeclareOk
            | Method::ExchangeDeleteOk
            | Method::QueueBindOk
            | Method::QueueUnbindOk
            | Method::BasicQosOk => {}
            Method::ExchangeDeclare(m) => {
                dst.put_u16(0);
                put_short_str(dst, &m.exchange)?;
                put_short_str(dst, &m.kind)?;
                dst.put_u8(pack_bits(&[
                    m.passive,
                    m.durable,
                    m.auto_delete,
                    m.internal,
                    m.no_wait,
                ]));
                put_table(dst, &m.arguments)?;
            }
            Method::ExchangeDelete(m) => {
                dst.put_u16(0);
                put_short_str(dst, &m.exchange)?;
                dst.put_u8(pack_bits(&[m.if_unused, m.no_wait]));
            }
            Method::QueueDeclare(m) => {
                dst.put_u16(0);
                put_short_str(dst, &m.queue)?;
                dst.put_u8(pack_bits(&[
                    m.passive,
                    m.durable,
                    m.exclusive,
                    m.auto_delete,
                    m.no_wait,
                ]));
                put_table(dst, &m.arguments)?;
            }
            Method::QueueDeclareOk(m) => {
                put_short_str(dst, &m.queue)?;
                dst.put_u32(m.message_count);
                dst.put_u32(m.consumer_count);
            }
            Method::QueueBind(m) => {
                dst.put_u16(0);
                put_short_str(dst, &m.queue)?;
                put_short_str(dst, &m.exchange)?;
                put_short_str(dst, &m.routing_key)?;
                dst.put_u8(pack_bits(&[m.no_wait]));
                put_table(dst, &m.arguments)?;
            }
            Method::QueueUnbind(m) => {
                dst.put_u16(0);
                put_short_str(dst, &m.queue)?;
                put_short_str(dst, &m.exchange)?;
                put_short_str(dst, &m.routing_key)?;
                put_table(dst, &m.arguments)?;
            }
            Method::QueuePurge(m) => {
                dst.put_u16(0);
                put_short_str(dst, &m.queue)?;
                dst.put_u8(pack_bits(&[m.no_wait]));
            }
            Method::QueuePurgeOk { message_count } | Method::QueueDeleteOk { message_count } => {
                dst.put_u32(*message_count);
            }
            Method::QueueDelete(m) => {
                dst.put_u16(0);
                put_short_str(dst, &m.queue)?;
                dst.put_u8(pack_bits(&[m.if_unused, m.if_empty, m.no_wait]));
            }
            Method::BasicQos(m) => {
                dst.put_u32(m.prefetch_size);
                dst.put_u16(m.prefetch_count);
                dst.put_u8(pack_bits(&[m.global]));
            }
            Method::BasicConsume(m) => {
                dst.put_u16(0);
                put_short_str(dst, &m.queue)?;
                put_short_str(dst, &m.consumer_tag)?;
                dst.put_u8(pack_bits(&[m.no_local, m.no_ack, m.exclusive, m.no_wait]));
                put_table(dst, &m.arguments)?;
            }
            Method::BasicConsumeOk { consumer_tag } | Method::BasicCancelOk { consumer_tag } => {
                put_short_str(dst, consumer_tag)?;
            }
            Method::BasicCancel(m) => {
                put_short_str(dst, &m.consumer_tag)?;
                dst.put_u8(pack_bits(&[m.no_wait]));
            }
            Method::BasicPublish(m) => {
                dst.put_u16(0);
                put_short_str(dst, &m.exchange)?;
                put_short_str(dst, &m.routing_key)?;
                dst.put_u8(pack_bits(&[m.mandatory, m.immediate]));
            }
            Method::BasicReturn(m) => {
                dst.put_u16(m.reply_code);
                put_short_str(dst, &m.reply_text)?;
                put_short_str(dst, &m.exchange)?;
                put_short_str(dst, &m.routing_key)?;
            }
            Method::BasicDeliver(m) => {
                put_short_str(dst, &m.consumer_tag)?;
                dst.put_u64(m.delivery_tag);
                dst.put_u8(pack_bits(&[m.redelivered]));
                put_short_str(dst, &m.exchange)?;
                put_short_str(dst, &m.routing_key)?;
            }
            Method::BasicGet(m) => {
                dst.put_u16(0);
                put_short_str(dst, &m.queue)?;
                dst.put_u8(pack_bits(&[m.no_ack]));
            }
            Method::BasicGetOk(m) => {
                dst.put_u64(m.delivery_tag);
                dst.put_u8(pack_bits(&[m.redelivered]));
                put_short_str(dst, &m.exchange)?;
                put_short_str(dst, &m.routing_key)?;
                dst.put_u32(m.message_count);
            }
            Method::BasicGetEmpty => put_short_str(dst, "")?,
            Method::BasicAck(m) => {
                dst.put_u64(m.delivery_tag);
                dst.put_u8(pack_bits(&[m.multiple]));
            }
            Method::BasicReject(m) => {
                dst.put_u64(m.delivery_tag);
                dst.put_u8(pack_bits(&[m.requeue]));
            }
        }
        Ok(())
    }

    /// Decode a method frame payload.
    pub fn decode(payload: Bytes) -> Result<Self> {
        let mut r = WireReader::new(payload, "method");
        let class_id = r.short()?;
        let method_id = r.short()?;

        let method = match (class_id, method_id) {
            (CLASS_CHANNEL, 10) => {
                r.short_str()?;
                Method::ChannelOpen
            }
            (CLASS_CHANNEL, 11) => {
                r.long_str()?;
                Method::ChannelOpenOk
            }
            (CLASS_CHANNEL, 40) => Method::ChannelClose(ChannelClose {
                reply_code: r.short()?,
                reply_text: r.short_str()?,
                class_id: r.short()?,
                method_id: r.short()?,
            }),
            (CLASS_CHANNEL, 41) => Method::ChannelCloseOk,
            (CLASS_EXCHANGE, 10) => {
                r.short()?;
                let exchange = r.short_str()?;
                let kind = r.short_str()?;
                let flags = r.octet()?;
                Method::ExchangeDeclare(ExchangeDeclare {
                    exchange,
                    kind,
                    passive: bit(flags, 0),
                    durable: bit(flags, 1),
                    auto_delete: bit(flags, 2),
                    internal: bit(flags, 3),
                    no_wait: bit(flags, 4),
                    arguments: read_table(&mut r)?,
                })
            }
            (CLASS_EXCHANGE, 11) => Method::ExchangeDeclareOk,
            (CLASS_EXCHANGE, 20) => {
                r.short()?;
                let exchange = r.short_str()?;
                let flags = r.octet()?;
                Method::ExchangeDelete(ExchangeDelete {
                    exchange,
                    if_unused: bit(flags, 0),
                    no_wait: bit(flags, 1),
                })
            }
            (CLASS_EXCHANGE, 21) => Method::ExchangeDeleteOk,
            (CLASS_QUEUE, 10) => {
                r.short()?;
                let queue = r.short_str()?;
                let flags = r.octet()?;
                Method::QueueDeclare(QueueDeclare {
                    queue,
                    passive: bit(flags, 0),
                    durable: bit(flags, 1),
                    exclusive: bit(flags, 2),
                    auto_delete: bit(flags, 3),
                    no_wait: bit(flags, 4),
                    arguments: read_table(&mut r)?,
                })
            }
            (CLASS_QUEUE, 11) => Method::QueueDeclareOk(QueueDeclareOk {
                queue: r.short_str()?,
                message_count: r.long()?,
                consumer_count: r.long()?,
            }),
            (CLASS_QUEUE, 20) => {
                r.short()?;
                let queue = r.short_str()?;
                let exchange = r.short_str()?;
                let routing_key = r.short_str()?;
                let flags = r.octet()?;
                Method::QueueBind(QueueBind {
                    queue,
                    exchange,
                    routing_key,
                    no_wait: bit(flags, 0),
                    arguments: read_table(&mut r)?,
                })
            }
            (CLASS_QUEUE, 21) => Method::QueueBindOk,
            (CLASS_QUEUE, 30) => {
                r.short()?;
                let queue = r.short_str()?;
                let flags = r.octet()?;
                Method::QueuePurge(QueuePurge {
                    queue,
                    no_wait: bit(flags, 0),
                })
            }
            (CLASS_QUEUE, 31) => Method::QueuePurgeOk {
                message_count: r.long()?,
            },
            (CLASS_QUEUE, 40) => {
                r.short()?;
                let queue = r.short_str()?;
                let flags = r.octet()?;
                Method::QueueDelete(QueueDelete {
                    queue,
                    if_unused: bit(flags, 0),
                    if_empty: bit(flags, 1),
                    no_wait: bit(flags, 2),
                })
            }
            (CLASS_QUEUE, 41) => Method::QueueDeleteOk {
                message_count: r.long()?,
            },
            (CLASS_QUEUE, 50) => {
                r.short()?;
                Method::QueueUnbind(QueueUnbind {
                    queue: r.short_str()?,
                    exchange: r.short_str()?,
                    routing_key: r.short_str()?,
                    arguments: read_table(&mut r)?,
                })
            }
            (CLASS_QUEUE, 51) => Method::QueueUnbindOk,
            (CLASS_BASIC, 10) => {
                let prefetch_size = r.long()?;
                let prefetch_count = r.short()?;
                let flags = r.octet()?;
                Method::BasicQos(BasicQos {
                    prefetch_size,
                    prefetch_count,
                    global: bit(flags, 0),
                })
            }
            (CLASS_BASIC, 11) => Method::BasicQosOk,
            (CLASS_BASIC, 20) => {
                r.short()?;
                let queue = r.short_str()?;
                let consumer_tag = r.short_str()?;
                let flags = r.octet()?;
                Method::BasicConsume(BasicConsume {
                    queue,
                    consumer_tag,
                    no_local: bit(flags, 0),
                    no_ack: bit(flags, 1),
                    exclusive: bit(flags, 2),
                    no_wait: bit(flags, 3),
                    arguments: read_table(&mut r)?,
                })
            }
            (CLASS_BASIC, 21) => Method::BasicConsumeOk {
                consumer_tag: r.short_str()?,
            },
            (CLASS_BASIC, 30) => {
                let consumer_tag = r.short_str()?;
                let flags = r.octet()?;
                Method::BasicCancel(BasicCancel {
                    consumer_tag,
                    no_wait: bit(flags, 0),
                })
            }
            (CLASS_BASIC, 31) => Method::BasicCancelOk {
                consumer_tag: r.short_str()?,
            },
            (CLASS_BASIC, 40) => {
                r.short()?;
                let exchange = r.short_str()?;
                let routing_key = r.short_str()?;
                let flags = r.octet()?;
                Method::BasicPublish(BasicPublish {
                    exchange,
                    routing_key,
                    mandatory: bit(flags, 0),
                    immediate: bit(flags, 1),
                })
            }
            (CLASS_BASIC, 50) => Method::BasicReturn(BasicReturn {
                reply_code: r.short()?,
                reply_text: r.short_str()?,
                exchange: r.short_str()?,
                routing_key: r.short_str()?,
            }),
            (CLASS_BASIC, 60) => {
                let consumer_tag = r.short_str()?;
                let delivery_tag = r.longlong()?;
                let flags = r.octet()?;
                Method::BasicDeliver(BasicDeliver {
                    consumer_tag,
                    delivery_tag,
                    redelivered: bit(flags, 0),
                    exchange: r.short_str()?,
                    routing_key: r.short_str()?,
                })
            }
            (CLASS_BASIC, 70) => {
                r.short()?;
                let queue = r.short_str()?;
                let flags = r.octet()?;
                Method::BasicGet(BasicGet {
                    queue,
                    no_ack: bit(flags, 0),
                })
            }
            (CLASS_BASIC, 71) => {
                let delivery_tag = r.longlong()?;
                let flags = r.octet()?;
                Method::BasicGetOk(BasicGetOk {
                    delivery_tag,
                    redelivered: bit(flags, 0),
                    exchange: r.short_str()?,
                    routing_key: r.short_str()?,
                    message_count: r.long()?,
                })
            }
            (CLASS_BASIC, 72) => {
                r.short_str()?;
                Method::BasicGetEmpty
            }
            (CLASS_BASIC, 80) => {
                let delivery_tag = r.longlong()?;
                let flags = r.octet()?;
                Method::BasicAck(BasicAck {
                    delivery_tag,
                    multiple: bit(flags, 0),
                })
            }
            (CLASS_BASIC, 90) => {
                let delivery_tag = r.longlong()?;
                let flags = r.octet()?;
                Method::BasicReject(BasicReject {
                    delivery_tag,
                    requeue: bit(flags, 0),
                })
            }
            (class_id, method_id) => {
                return Err(FrameError::UnknownMethod {
                    class_id,
                    method_id,
                });
            }
        };

        if r.remaining() != 0 {
            return Err(FrameError::Malformed(format!(
                "{}: {} trailing bytes",
                method.name(),
                r.remaining()
            )));
        }
        Ok(method)
    }
}
