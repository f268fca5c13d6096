//! Outbound frame construction for one channel.

use std::sync::Arc;

use amqprims_frame::method::{BasicPublish, ChannelClose};
use amqprims_frame::{body_chunk_size, ContentHeader, Frame, Method};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{ChannelError, Result};
use crate::message::Message;

/// Where outbound frames go: usually the connection's writer task.
///
/// Frames passed to one `send_frames` call must reach the wire contiguously.
pub trait FrameSink: Send + Sync + 'static {
    fn send_frames(&self, frames: Vec<Frame>) -> Result<()>;

    fn send_frame(&self, frame: Frame) -> Result<()> {
        self.send_frames(vec![frame])
    }
}

/// Each batch travels as one item, so concurrent senders never interleave.
impl FrameSink for mpsc::UnboundedSender<Vec<Frame>> {
    fn send_frames(&self, frames: Vec<Frame>) -> Result<()> {
        self.send(frames).map_err(|_| ChannelError::ConnectionClosed)
    }
}

/// Builds and sends the frames for each channel operation.
#[derive(Clone)]
pub struct ChannelMethodSender {
    channel_id: u16,
    sink: Arc<dyn FrameSink>,
    frame_max: u32,
}

impl ChannelMethodSender {
    pub fn new(channel_id: u16, sink: Arc<dyn FrameSink>, frame_max: u32) -> Self {
        Self {
            channel_id,
            sink,
            frame_max,
        }
    }

    pub fn channel_id(&self) -> u16 {
        self.channel_id
    }

    /// Send a single method frame.
    pub fn send_method(&self, method: Method) -> Result<()> {
        debug!(channel_id = self.channel_id, method = method.name(), "send");
        self.sink.send_frame(Frame::method(self.channel_id, method))
    }

    pub fn send_open(&self) -> Result<()> {
        self.send_method(Method::ChannelOpen)
    }

    pub fn send_close(&self, reply_code: u16, reply_text: &str) -> Result<()> {
        self.send_method(Method::ChannelClose(ChannelClose {
            reply_code,
            reply_text: reply_text.to_string(),
            class_id: 0,
            method_id: 0,
        }))
    }

    pub fn send_close_ok(&self) -> Result<()> {
        self.send_method(Method::ChannelCloseOk)
    }

    /// Send basic.publish, its content header and the body frames as one unit.
    pub fn send_publish(
        &self,
        message: &Message,
        exchange: &str,
        routing_key: &str,
        mandatory: bool,
    ) -> Result<()> {
        let frames = publish_frames(
            self.channel_id,
            self.frame_max,
            message,
            exchange,
            routing_key,
            mandatory,
        );
        debug!(
            channel_id = self.channel_id,
            exchange,
            routing_key,
            body_len = message.body.len(),
            frames = frames.len(),
            "publish"
        );
        self.sink.send_frames(frames)
    }
}

/// Method frame, content header, then body frames of at most
/// `frame_max - 8` bytes. An empty body produces no body frames.
pub fn publish_frames(
    channel_id: u16,
    frame_max: u32,
    message: &Message,
    exchange: &str,
    routing_key: &str,
    mandatory: bool,
) -> Vec<Frame> {
    let mut frames = vec![
        Frame::method(
            channel_id,
            Method::BasicPublish(BasicPublish {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                mandatory,
                immediate: false,
            }),
        ),
        Frame::header(
            channel_id,
            ContentHeader::basic(message.body.len() as u64, message.properties.clone()),
        ),
    ];

    let chunk_size = body_chunk_size(frame_max);
    let mut offset = 0;
    while offset < message.body.len() {
        let end = message.body.len().min(offset.saturating_add(chunk_size));
        frames.push(Frame::content(channel_id, message.body.slice(offset..end)));
        offset = end;
    }
    frames
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Captures every frame sent, in order.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        frames: Mutex<Vec<Frame>>,
    }

    impl RecordingSink {
        pub(crate) fn frames(&self) -> Vec<Frame> {
            self.frames.lock().unwrap().clone()
        }
    }

    impl FrameSink for RecordingSink {
        fn send_frames(&self, frames: Vec<Frame>) -> Result<()> {
            self.frames.lock().unwrap().extend(frames);
            Ok(())
        }
    }
}
