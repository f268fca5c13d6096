use std::collections::HashMap;
use std::fs::File;

use amqprims_channel::{ChannelError, DeliveryInfo, IncomingMessage, MessageBuilder, ReturnInfo};
use amqprims_frame::{Frame, FrameBody, Method};
use tracing::{debug, info};

use crate::cmd::decode::{next_frame, open_capture};
use crate::cmd::ReplayArgs;
use crate::exit::{channel_error, io_error, CliResult, SUCCESS};
use crate::output::{print_messages, MessageRow, OutputFormat};

pub fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    let file = File::open(&args.file)
        .map_err(|err| io_error(&format!("cannot open {}", args.file.display()), err))?;
    let mut frames = open_capture(file, args.frame_max);

    let mut replay = Replay::default();
    let mut rows = Vec::new();
    while let Some(frame) = next_frame(&mut frames)? {
        let channel = frame.channel;
        if let Some((source, message)) = replay
            .feed(frame)
            .map_err(|err| channel_error(&format!("channel {channel}"), err))?
        {
            rows.push(MessageRow::new(source, &message));
        }
    }
    replay
        .finish()
        .map_err(|err| channel_error("capture ends mid-message", err))?;
    info!(
        messages = rows.len(),
        skipped = replay.skipped,
        "replay complete"
    );

    print_messages(&rows, format);
    Ok(SUCCESS)
}

struct InFlight {
    source: &'static str,
    builder: MessageBuilder,
}

/// Offline message reassembly, one builder per channel.
#[derive(Default)]
struct Replay {
    in_flight: HashMap<u16, InFlight>,
    skipped: usize,
}

impl Replay {
    /// Feed one frame. Returns a message when the frame completes one.
    fn feed(&mut self, frame: Frame) -> Result<Option<(&'static str, IncomingMessage)>, ChannelError> {
        let channel = frame.channel;
        match frame.body {
            FrameBody::Method(method) => {
                if self.in_flight.contains_key(&channel) {
                    if method.carries_content() {
                        return Err(ChannelError::ReconstructionInFlight(channel));
                    }
                    return Err(ChannelError::UnexpectedFrame {
                        channel,
                        kind: "method",
                    });
                }
                let Some((source, info)) = delivery_info(method) else {
                    self.skipped += 1;
                    return Ok(None);
                };
                self.in_flight.insert(
                    channel,
                    InFlight {
                        source,
                        builder: MessageBuilder::new(channel, info),
                    },
                );
                Ok(None)
            }
            FrameBody::Header(header) => {
                let entry = self.entry(channel, "content header")?;
                entry.builder.set_header(header)?;
                self.complete(channel)
            }
            FrameBody::Body(chunk) => {
                let entry = self.entry(channel, "content body")?;
                entry.builder.add_body_chunk(&chunk)?;
                self.complete(channel)
            }
            FrameBody::Heartbeat => {
                self.skipped += 1;
                Ok(None)
            }
        }
    }

    fn entry(&mut self, channel: u16, kind: &'static str) -> Result<&mut InFlight, ChannelError> {
        self.in_flight
            .get_mut(&channel)
            .ok_or(ChannelError::UnexpectedFrame { channel, kind })
    }

    fn complete(&mut self, channel: u16) -> Result<Option<(&'static str, IncomingMessage)>, ChannelError> {
        if !self
            .in_flight
            .get(&channel)
            .is_some_and(|entry| entry.builder.done())
        {
            return Ok(None);
        }
        let Some(entry) = self.in_flight.remove(&channel) else {
            return Ok(None);
        };
        let message = entry.builder.build()?;
        debug!(channel, source = entry.source, size = message.body().len(), "message rebuilt");
        Ok(Some((entry.source, message)))
    }

    /// Fails if any channel stopped partway through a message.
    fn finish(&mut self) -> Result<(), ChannelError> {
        let mut channels: Vec<u16> = self.in_flight.keys().copied().collect();
        channels.sort_unstable();
        match channels.first() {
            Some(channel) => match self.in_flight.remove(channel) {
                Some(entry) => entry.builder.build().map(|_| ()),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }
}

fn delivery_info(method: Method) -> Option<(&'static str, DeliveryInfo)> {
    match method {
        Method::BasicDeliver(deliver) => Some((
            "deliver",
            DeliveryInfo {
                delivery_tag: Some(deliver.delivery_tag),
                redelivered: deliver.redelivered,
                exchange: deliver.exchange,
                routing_key: deliver.routing_key,
                consumer_tag: Some(deliver.consumer_tag),
                ..DeliveryInfo::default()
            },
        )),
        Method::BasicGetOk(get_ok) => Some((
            "get",
            DeliveryInfo {
                delivery_tag: Some(get_ok.delivery_tag),
                redelivered: get_ok.redelivered,
                exchange: get_ok.exchange,
                routing_key: get_ok.routing_key,
                message_count: Some(get_ok.message_count),
                ..DeliveryInfo::default()
            },
        )),
        Method::BasicReturn(returned) => Some((
            "return",
            DeliveryInfo {
                exchange: returned.exchange,
                routing_key: returned.routing_key,
                returned: Some(ReturnInfo {
                    reply_code: returned.reply_code,
                    reply_text: returned.reply_text,
                }),
                ..DeliveryInfo::default()
            },
        )),
        _ => None,
    }
}
