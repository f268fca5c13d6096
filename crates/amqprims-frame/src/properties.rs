//! Content header frames and basic-class message properties.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::field::{put_table, read_table, FieldTable};
use crate::method::CLASS_BASIC;
use crate::wire::{put_short_str, WireReader};

const FLAG_CONTENT_TYPE: u16 = 1 << 15;
const FLAG_CONTENT_ENCODING: u16 = 1 << 14;
const FLAG_HEADERS: u16 = 1 << 13;
const FLAG_DELIVERY_MODE: u16 = 1 << 12;
const FLAG_PRIORITY: u16 = 1 << 11;
const FLAG_CORRELATION_ID: u16 = 1 << 10;
const FLAG_REPLY_TO: u16 = 1 << 9;
const FLAG_EXPIRATION: u16 = 1 << 8;
const FLAG_MESSAGE_ID: u16 = 1 << 7;
const FLAG_TIMESTAMP: u16 = 1 << 6;
const FLAG_TYPE: u16 = 1 << 5;
const FLAG_USER_ID: u16 = 1 << 4;
const FLAG_APP_ID: u16 = 1 << 3;
const FLAG_CLUSTER_ID: u16 = 1 << 2;
const FLAG_CONTINUATION: u16 = 1;

/// Basic-class message properties. Absent properties are `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BasicProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: Option<FieldTable>,
    /// 1 = non-persistent, 2 = persistent.
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    /// Seconds since the Unix epoch.
    pub timestamp: Option<u64>,
    pub kind: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
    pub cluster_id: Option<String>,
}

impl BasicProperties {
    fn flags(&self) -> u16 {
        let mut flags = 0;
        let mut set = |present: bool, flag: u16| {
            if present {
                flags |= flag;
            }
        };
        set(self.content_type.is_some(), FLAG_CONTENT_TYPE);
        set(self.content_encoding.is_some(), FLAG_CONTENT_ENCODING);
        set(self.headers.is_some(), FLAG_HEADERS);
        set(self.delivery_mode.is_some(), FLAG_DELIVERY_MODE);
        set(self.priority.is_some(), FLAG_PRIORITY);
        set(self.correlation_id.is_some(), FLAG_CORRELATION_ID);
        set(self.reply_to.is_some(), FLAG_REPLY_TO);
        set(self.expiration.is_some(), FLAG_EXPIRATION);
        set(self.message_id.is_some(), FLAG_MESSAGE_ID);
        set(self.timestamp.is_some(), FLAG_TIMESTAMP);
        set(self.kind.is_some(), FLAG_TYPE);
        set(self.user_id.is_some(), FLAG_USER_ID);
        set(self.app_id.is_some(), FLAG_APP_ID);
        set(self.cluster_id.is_some(), FLAG_CLUSTER_ID);
        flags
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u16(self.flags());
        put_opt_str(dst, &self.content_type)?;
        put_opt_str(dst, &self.content_encoding)?;
        if let Some(headers) = &self.headers {
            put_table(dst, headers)?;
        }
        if let Some(mode) = self.delivery_mode {
            dst.put_u8(mode);
        }
        if let Some(priority) = self.priority {
            dst.put_u8(priority);
        }
        put_opt_str(dst, &self.correlation_id)?;
        put_opt_str(dst, &self.reply_to)?;
        put_opt_str(dst, &self.expiration)?;
        put_opt_str(dst, &self.message_id)?;
        if let Some(timestamp) = self.timestamp {
            dst.put_u64(timestamp);
        }
        put_opt_str(dst, &self.kind)?;
        put_opt_str(dst, &self.user_id)?;
        put_opt_str(dst, &self.app_id)?;
        put_opt_str(dst, &self.cluster_id)
    }

    fn decode(r: &mut WireReader) -> Result<Self> {
        let flags = r.short()?;
        if flags & FLAG_CONTINUATION != 0 {
            return Err(FrameError::Malformed(
                "content header: property flag continuation is not supported".to_string(),
            ));
        }

        let has = |flag: u16| flags & flag != 0;
        Ok(Self {
            content_type: opt_str(r, has(FLAG_CONTENT_TYPE))?,
            content_encoding: opt_str(r, has(FLAG_CONTENT_ENCODING))?,
            headers: if has(FLAG_HEADERS) {
                Some(read_table(r)?)
            } else {
                None
            },
            delivery_mode: if has(FLAG_DELIVERY_MODE) {
                Some(r.octet()?)
            } else {
                None
            },
            priority: if has(FLAG_PRIORITY) {
                Some(r.octet()?)
            } else {
                None
            },
            correlation_id: opt_str(r, has(FLAG_CORRELATION_ID))?,
            reply_to: opt_str(r, has(FLAG_REPLY_TO))?,
            expiration: opt_str(r, has(FLAG_EXPIRATION))?,
            message_id: opt_str(r, has(FLAG_MESSAGE_ID))?,
            timestamp: if has(FLAG_TIMESTAMP) {
                Some(r.longlong()?)
            } else {
                None
            },
            kind: opt_str(r, has(FLAG_TYPE))?,
            user_id: opt_str(r, has(FLAG_USER_ID))?,
            app_id: opt_str(r, has(FLAG_APP_ID))?,
            cluster_id: opt_str(r, has(FLAG_CLUSTER_ID))?,
        })
    }
}

fn put_opt_str(dst: &mut BytesMut, value: &Option<String>) -> Result<()> {
    match value {
        Some(value) => put_short_str(dst, value),
        None => Ok(()),
    }
}

fn opt_str(r: &mut WireReader, present: bool) -> Result<Option<String>> {
    if present {
        Ok(Some(r.short_str()?))
    } else {
        Ok(None)
    }
}

/// Content header: announces the total body size and carries the properties.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentHeader {
    pub class_id: u16,
    pub body_size: u64,
    pub properties: BasicProperties,
}

impl ContentHeader {
    /// A basic-class header for a body of `body_size` bytes.
    pub fn basic(body_size: u64, properties: BasicProperties) -> Self {
        Self {
            class_id: CLASS_BASIC,
            body_size,
            properties,
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u16(self.class_id);
        dst.put_u16(0); // weight
        dst.put_u64(self.body_size);
        self.properties.encode(dst)
    }

    pub fn decode(payload: Bytes) -> Result<Self> {
        let mut r = WireReader::new(payload, "content header");
        let class_id = r.short()?;
        let _weight = r.short()?;
        let body_size = r.longlong()?;
        let properties = BasicProperties::decode(&mut r)?;
        if r.remaining() != 0 {
            return Err(FrameError::Malformed(format!(
                "content header: {} trailing bytes",
                r.remaining()
            )));
        }
        Ok(Self {
            class_id,
            body_size,
            properties,
        })
    }
}
