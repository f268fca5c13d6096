//! Per-channel frame state machine.

use std::sync::Arc;

use amqprims_frame::{Frame, FrameBody, Method};
use tracing::{debug, warn};

use crate::consumers::ConsumerRegistry;
use crate::dispatcher::{FrameHandler, Readiness};
use crate::error::{ChannelError, CloseReason, Result};
use crate::fault::FaultReporter;
use crate::receiver::MessageReceiver;
use crate::sender::ChannelMethodSender;
use crate::synchroniser::{Response, Synchroniser, WaitKey};

/// Turns one channel's frames into rendezvous completions and reassembly
/// sequences.
pub(crate) struct ChannelFrameHandler {
    channel_id: u16,
    synchroniser: Arc<Synchroniser>,
    readiness: Readiness,
    receiver: MessageReceiver,
    consumers: Arc<ConsumerRegistry>,
    sender: ChannelMethodSender,
    faults: FaultReporter,
    finished: bool,
}

impl ChannelFrameHandler {
    pub(crate) fn new(
        channel_id: u16,
        synchroniser: Arc<Synchroniser>,
        readiness: Readiness,
        receiver: MessageReceiver,
        consumers: Arc<ConsumerRegistry>,
        sender: ChannelMethodSender,
        faults: FaultReporter,
    ) -> Self {
        Self {
            channel_id,
            synchroniser,
            readiness,
            receiver,
            consumers,
            sender,
            faults,
            finished: false,
        }
    }

    fn complete(&self, key: WaitKey, response: Response) -> Result<()> {
        self.synchroniser.resolve(key, response)?;
        self.readiness.ready();
        Ok(())
    }

    fn handle_method(&mut self, method: Method) -> Result<()> {
        debug!(channel_id = self.channel_id, method = method.name(), "recv");
        match method {
            Method::ChannelOpenOk => self.complete(WaitKey::ChannelOpenOk, Response::Ack),
            Method::ExchangeDeclareOk => self.complete(WaitKey::ExchangeDeclareOk, Response::Ack),
            Method::ExchangeDeleteOk => self.complete(WaitKey::ExchangeDeleteOk, Response::Ack),
            Method::QueueDeclareOk(ok) => {
                self.complete(WaitKey::QueueDeclareOk, Response::QueueDeclared(ok))
            }
            Method::QueueBindOk => self.complete(WaitKey::QueueBindOk, Response::Ack),
            Method::QueueUnbindOk => self.complete(WaitKey::QueueUnbindOk, Response::Ack),
            Method::QueuePurgeOk { message_count } => {
                self.complete(WaitKey::QueuePurgeOk, Response::MessageCount(message_count))
            }
            Method::QueueDeleteOk { message_count } => {
                self.complete(WaitKey::QueueDeleteOk, Response::MessageCount(message_count))
            }
            Method::BasicQosOk => self.complete(WaitKey::BasicQosOk, Response::Ack),
            Method::BasicConsumeOk { consumer_tag } => {
                let messages = self.consumers.add(&consumer_tag);
                self.complete(
                    WaitKey::BasicConsumeOk,
                    Response::ConsumeStarted {
                        consumer_tag,
                        messages,
                    },
                )
            }
            Method::BasicCancelOk { consumer_tag } => {
                self.synchroniser
                    .resolve(WaitKey::BasicCancelOk(consumer_tag.clone()), Response::Ack)?;
                self.consumers.cancel(&consumer_tag);
                self.readiness.ready();
                Ok(())
            }
            Method::BasicGetEmpty => self.complete(WaitKey::BasicGet, Response::Get(None)),
            Method::ChannelClose(close) => {
                warn!(
                    channel_id = self.channel_id,
                    reply_code = close.reply_code,
                    reply_text = %close.reply_text,
                    "channel closed by peer"
                );
                self.finished = true;
                self.sender.send_close_ok()?;
                self.synchroniser.close(CloseReason::Peer {
                    reply_code: close.reply_code,
                    reply_text: close.reply_text.clone(),
                });
                self.consumers.clear();
                self.faults.report(
                    self.channel_id,
                    ChannelError::ClosedByPeer {
                        reply_code: close.reply_code,
                        reply_text: close.reply_text,
                    },
                );
                Ok(())
            }
            Method::ChannelCloseOk => {
                self.finished = true;
                self.synchroniser
                    .resolve(WaitKey::ChannelCloseOk, Response::Ack)?;
                self.synchroniser.close(CloseReason::Client);
                self.consumers.clear();
                Ok(())
            }
            Method::BasicGetOk(get_ok) => self.receiver.receive_get_ok(get_ok),
            Method::BasicDeliver(deliver) => self.receiver.receive_deliver(deliver),
            Method::BasicReturn(returned) => self.receiver.receive_return(returned),
            other => Err(ChannelError::UnexpectedMethod {
                channel: self.channel_id,
                method: other.name(),
            }),
        }
    }
}

impl FrameHandler for ChannelFrameHandler {
    fn handle(&mut self, frame: Frame) -> Result<()> {
        match frame.body {
            FrameBody::Method(method) => {
                if self.receiver.is_busy() {
                    // Content frames of one message are never interleaved
                    // with other methods on the same channel.
                    if method.carries_content() {
                        return Err(ChannelError::ReconstructionInFlight(self.channel_id));
                    }
                    return Err(ChannelError::UnexpectedFrame {
                        channel: self.channel_id,
                        kind: "method",
                    });
                }
                self.handle_method(method)
            }
            FrameBody::Header(header) => self.receiver.receive_header(header),
            FrameBody::Body(chunk) => self.receiver.receive_body(chunk),
            FrameBody::Heartbeat => Err(ChannelError::UnexpectedFrame {
                channel: self.channel_id,
                kind: "heartbeat",
            }),
        }
    }

    fn fail(&mut self, error: &ChannelError) {
        self.finished = true;
        self.synchroniser
            .close(CloseReason::Fault(error.to_string()));
        self.consumers.clear();
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
