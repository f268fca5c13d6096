//! Reassembly of content-carrying deliveries.
//!
//! A trigger method (get-ok, deliver, return) installs a builder and spawns
//! a sequence task that waits for the header and the completed body, then
//! hands the message off. The frame path only feeds the builder.

use std::sync::Arc;

use amqprims_frame::method::{BasicDeliver, BasicGetOk, BasicReturn};
use amqprims_frame::ContentHeader;
use bytes::Bytes;
use tracing::debug;

use crate::catcher::Catcher;
use crate::consumers::ConsumerRegistry;
use crate::dispatcher::Readiness;
use crate::error::{ChannelError, CloseReason, Result};
use crate::fault::FaultReporter;
use crate::message::{DeliveryInfo, IncomingMessage, MessageBuilder, ReturnInfo};
use crate::sender::ChannelMethodSender;
use crate::synchroniser::{PendingWait, Response, Synchroniser, WaitKey};

#[derive(Debug)]
enum Handoff {
    Get,
    Deliver { consumer_tag: String },
    Return,
}

/// What a sequence task needs after the frame path has moved on.
#[derive(Clone)]
struct SequenceContext {
    channel_id: u16,
    synchroniser: Arc<Synchroniser>,
    readiness: Readiness,
    consumers: Arc<ConsumerRegistry>,
    catcher: Arc<Catcher>,
    faults: FaultReporter,
}

impl SequenceContext {
    fn fail(&self, error: ChannelError) {
        self.synchroniser
            .close(CloseReason::Fault(error.to_string()));
        self.consumers.clear();
        self.faults.report(self.channel_id, error);
    }
}

pub(crate) struct MessageReceiver {
    builder: Option<MessageBuilder>,
    sender: ChannelMethodSender,
    ctx: SequenceContext,
}

impl MessageReceiver {
    pub(crate) fn new(
        channel_id: u16,
        synchroniser: Arc<Synchroniser>,
        readiness: Readiness,
        consumers: Arc<ConsumerRegistry>,
        catcher: Arc<Catcher>,
        sender: ChannelMethodSender,
        faults: FaultReporter,
    ) -> Self {
        Self {
            builder: None,
            sender,
            ctx: SequenceContext {
                channel_id,
                synchroniser,
                readiness,
                consumers,
                catcher,
                faults,
            },
        }
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.builder.is_some()
    }

    pub(crate) fn receive_get_ok(&mut self, get_ok: BasicGetOk) -> Result<()> {
        let info = DeliveryInfo {
            delivery_tag: Some(get_ok.delivery_tag),
            redelivered: get_ok.redelivered,
            exchange: get_ok.exchange,
            routing_key: get_ok.routing_key,
            message_count: Some(get_ok.message_count),
            ..DeliveryInfo::default()
        };
        self.begin(info, Handoff::Get, true)
    }

    pub(crate) fn receive_deliver(&mut self, deliver: BasicDeliver) -> Result<()> {
        let consumer_tag = deliver.consumer_tag;
        let info = DeliveryInfo {
            delivery_tag: Some(deliver.delivery_tag),
            redelivered: deliver.redelivered,
            exchange: deliver.exchange,
            routing_key: deliver.routing_key,
            consumer_tag: Some(consumer_tag.clone()),
            ..DeliveryInfo::default()
        };
        self.begin(info, Handoff::Deliver { consumer_tag }, true)
    }

    pub(crate) fn receive_return(&mut self, returned: BasicReturn) -> Result<()> {
        let info = DeliveryInfo {
            exchange: returned.exchange,
            routing_key: returned.routing_key,
            returned: Some(ReturnInfo {
                reply_code: returned.reply_code,
                reply_text: returned.reply_text,
            }),
            ..DeliveryInfo::default()
        };
        self.begin(info, Handoff::Return, false)
    }

    fn begin(&mut self, info: DeliveryInfo, handoff: Handoff, ackable: bool) -> Result<()> {
        if self.builder.is_some() {
            return Err(ChannelError::ReconstructionInFlight(self.ctx.channel_id));
        }
        let mut builder = MessageBuilder::new(self.ctx.channel_id, info);
        if ackable {
            builder = builder.with_acker(self.sender.clone());
        }

        let header = self.ctx.synchroniser.register(WaitKey::ContentHeader)?;
        let body = self.ctx.synchroniser.register(WaitKey::ContentBody)?;
        self.builder = Some(builder);
        debug!(channel_id = self.ctx.channel_id, ?handoff, "reassembly started");

        tokio::spawn(run_sequence(self.ctx.clone(), handoff, header, body));
        self.ctx.readiness.ready();
        Ok(())
    }

    pub(crate) fn receive_header(&mut self, header: ContentHeader) -> Result<()> {
        let channel = self.ctx.channel_id;
        let Some(builder) = self.builder.as_mut() else {
            return Err(ChannelError::UnexpectedFrame {
                channel,
                kind: "content header",
            });
        };
        builder.set_header(header)?;
        let done = builder.done();

        self.ctx
            .synchroniser
            .resolve(WaitKey::ContentHeader, Response::Ack)?;
        if done {
            self.finish()
        } else {
            self.ctx.readiness.ready();
            Ok(())
        }
    }

    pub(crate) fn receive_body(&mut self, chunk: Bytes) -> Result<()> {
        let channel = self.ctx.channel_id;
        let Some(builder) = self.builder.as_mut() else {
            return Err(ChannelError::UnexpectedFrame {
                channel,
                kind: "content body",
            });
        };
        builder.add_body_chunk(&chunk)?;

        if builder.done() {
            self.finish()
        } else {
            self.ctx.readiness.ready();
            Ok(())
        }
    }

    fn finish(&mut self) -> Result<()> {
        let Some(builder) = self.builder.take() else {
            return Err(ChannelError::MissingHeader);
        };
        let message = builder.build()?;
        self.ctx
            .synchroniser
            .resolve(WaitKey::ContentBody, Response::Content(message))
    }
}

async fn run_sequence(ctx: SequenceContext, handoff: Handoff, header: PendingWait, body: PendingWait) {
    let outcome = async {
        header.await?;
        body.await
    }
    .await;

    let message: IncomingMessage = match outcome {
        Ok(Response::Content(message)) => message,
        Ok(other) => {
            ctx.fail(ChannelError::UnexpectedResponse(format!("{other:?}")));
            return;
        }
        Err(error) => {
            debug!(channel_id = ctx.channel_id, error = %error, "reassembly abandoned");
            return;
        }
    };

    match handoff {
        Handoff::Get => {
            match ctx
                .synchroniser
                .resolve(WaitKey::BasicGet, Response::Get(Some(message)))
            {
                Ok(()) => ctx.readiness.ready(),
                Err(error) => ctx.fail(error),
            }
        }
        Handoff::Deliver { consumer_tag } => match ctx.consumers.deliver(&consumer_tag, message) {
            Ok(()) => ctx.readiness.ready(),
            Err(error) => ctx.fail(error),
        },
        Handoff::Return => {
            ctx.readiness.ready();
            ctx.catcher.handle_returned_message(message);
        }
    }
}
