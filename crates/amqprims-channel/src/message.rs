//! Outgoing messages, reassembled incoming messages, and the builder that
//! turns a content header plus body chunks into an [`IncomingMessage`].

use std::fmt;

use amqprims_frame::method::{BasicAck, BasicReject};
use amqprims_frame::{BasicProperties, ContentHeader, FieldTable, FieldValue, Method};
use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ChannelError, Result};
use crate::sender::ChannelMethodSender;

/// A message to publish.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub body: Bytes,
    pub properties: BasicProperties,
}

impl Message {
    /// A message with an opaque binary body.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            properties: BasicProperties::default(),
        }
    }

    /// A UTF-8 text body, tagged with `content_encoding = "utf-8"`.
    pub fn text(body: impl Into<String>) -> Self {
        let mut message = Self::new(Bytes::from(body.into()));
        message.properties.content_encoding = Some("utf-8".to_string());
        message
    }

    /// A JSON body with `content_type = "application/json"`.
    ///
    /// Override the content type afterwards with [`Message::with_content_type`].
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        let mut message = Self::new(body);
        message.properties.content_type = Some("application/json".to_string());
        message.properties.content_encoding = Some("utf-8".to_string());
        Ok(message)
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.properties.content_type = Some(content_type.into());
        self
    }

    /// Ask the broker to store the message on disk (delivery mode 2).
    pub fn persistent(mut self) -> Self {
        self.properties.delivery_mode = Some(2);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.properties.priority = Some(priority);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.properties
            .headers
            .get_or_insert_with(FieldTable::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.properties.correlation_id = Some(id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.properties.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.properties.message_id = Some(id.into());
        self
    }

    pub fn with_expiration(mut self, expiration: impl Into<String>) -> Self {
        self.properties.expiration = Some(expiration.into());
        self
    }

    pub fn with_timestamp(mut self, seconds: u64) -> Self {
        self.properties.timestamp = Some(seconds);
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.properties.app_id = Some(app_id.into());
        self
    }
}

/// Details of a message the server could not route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnInfo {
    pub reply_code: u16,
    pub reply_text: String,
}

/// Delivery metadata captured from the frame that started a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeliveryInfo {
    /// Absent for returned messages.
    pub delivery_tag: Option<u64>,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    /// Set for pushed deliveries.
    pub consumer_tag: Option<String>,
    /// Messages left in the queue, reported by get-ok.
    pub message_count: Option<u32>,
    /// Set for returned messages.
    pub returned: Option<ReturnInfo>,
}

/// A fully reassembled message received from the server.
#[derive(Clone)]
pub struct IncomingMessage {
    channel_id: u16,
    info: DeliveryInfo,
    properties: BasicProperties,
    body: Bytes,
    acker: Option<ChannelMethodSender>,
}

impl IncomingMessage {
    pub fn channel_id(&self) -> u16 {
        self.channel_id
    }

    pub fn info(&self) -> &DeliveryInfo {
        &self.info
    }

    pub fn delivery_tag(&self) -> Option<u64> {
        self.info.delivery_tag
    }

    pub fn exchange(&self) -> &str {
        &self.info.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.info.routing_key
    }

    pub fn consumer_tag(&self) -> Option<&str> {
        self.info.consumer_tag.as_deref()
    }

    pub fn properties(&self) -> &BasicProperties {
        &self.properties
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body as UTF-8 text.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.body).map_err(|_| ChannelError::NotUtf8)
    }

    /// Deserialize a JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Acknowledge this delivery.
    pub fn ack(&self) -> Result<()> {
        let (sender, delivery_tag) = self.ack_target()?;
        sender.send_method(Method::BasicAck(BasicAck {
            delivery_tag,
            multiple: false,
        }))
    }

    /// Reject this delivery, optionally asking the server to requeue it.
    pub fn reject(&self, requeue: bool) -> Result<()> {
        let (sender, delivery_tag) = self.ack_target()?;
        sender.send_method(Method::BasicReject(BasicReject {
            delivery_tag,
            requeue,
        }))
    }

    fn ack_target(&self) -> Result<(&ChannelMethodSender, u64)> {
        match (&self.acker, self.info.delivery_tag) {
            (Some(sender), Some(tag)) => Ok((sender, tag)),
            _ => Err(ChannelError::NotAcknowledgeable),
        }
    }
}

impl fmt::Debug for IncomingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingMessage")
            .field("channel_id", &self.channel_id)
            .field("info", &self.info)
            .field("properties", &self.properties)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Accumulates one message's header and body chunks.
pub struct MessageBuilder {
    channel_id: u16,
    info: DeliveryInfo,
    header: Option<ContentHeader>,
    body: BytesMut,
    acker: Option<ChannelMethodSender>,
}

impl MessageBuilder {
    pub fn new(channel_id: u16, info: DeliveryInfo) -> Self {
        Self {
            channel_id,
            info,
            header: None,
            body: BytesMut::new(),
            acker: None,
        }
    }

    /// Attach the sender used by [`IncomingMessage::ack`] and `reject`.
    pub fn with_acker(mut self, sender: ChannelMethodSender) -> Self {
        self.acker = Some(sender);
        self
    }

    pub fn info(&self) -> &DeliveryInfo {
        &self.info
    }

    pub fn set_header(&mut self, header: ContentHeader) -> Result<()> {
        if self.header.is_some() {
            return Err(ChannelError::HeaderAlreadySet);
        }
        self.header = Some(header);
        Ok(())
    }

    pub fn add_body_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let Some(header) = &self.header else {
            return Err(ChannelError::MissingHeader);
        };
        let received = self.body.len() as u64 + chunk.len() as u64;
        if self.done() || received > header.body_size {
            return Err(ChannelError::BodyOverflow {
                declared: header.body_size,
                received,
            });
        }
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    /// True once the received body length equals the declared size.
    pub fn done(&self) -> bool {
        self.header
            .as_ref()
            .is_some_and(|header| self.body.len() as u64 == header.body_size)
    }

    pub fn build(self) -> Result<IncomingMessage> {
        let received = self.body.len() as u64;
        let header = match self.header {
            Some(header) if received == header.body_size => header,
            Some(header) => {
                return Err(ChannelError::Incomplete {
                    declared: header.body_size,
                    received,
                });
            }
            None => return Err(ChannelError::MissingHeader),
        };
        Ok(IncomingMessage {
            channel_id: self.channel_id,
            info: self.info,
            properties: header.properties,
            body: self.body.freeze(),
            acker: self.acker,
        })
    }
}
