use std::io::IsTerminal;

use amqprims_channel::IncomingMessage;
use amqprims_frame::channel::channel_name;
use amqprims_frame::{Frame, FrameBody};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

/// Longest body preview printed in table and pretty output.
const PREVIEW_LIMIT: usize = 64;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One decoded frame.
#[derive(Debug, Serialize)]
pub struct FrameRow {
    pub index: usize,
    pub channel: u16,
    pub channel_name: &'static str,
    pub kind: &'static str,
    pub method: Option<&'static str>,
    pub payload_size: usize,
    pub detail: String,
}

impl FrameRow {
    pub fn new(index: usize, frame: &Frame, payload_size: usize) -> Self {
        let (method, detail) = match &frame.body {
            FrameBody::Method(method) => (Some(method.name()), String::new()),
            FrameBody::Header(header) => (
                None,
                format!(
                    "body_size={} content_type={}",
                    header.body_size,
                    header.properties.content_type.as_deref().unwrap_or("-")
                ),
            ),
            FrameBody::Body(chunk) => (None, preview(chunk)),
            FrameBody::Heartbeat => (None, String::new()),
        };
        Self {
            index,
            channel: frame.channel,
            channel_name: channel_name(frame.channel),
            kind: kind_name(frame),
            method,
            payload_size,
            detail,
        }
    }
}

/// One reassembled message.
#[derive(Debug, Serialize)]
pub struct MessageRow {
    pub channel: u16,
    pub source: &'static str,
    pub exchange: String,
    pub routing_key: String,
    pub delivery_tag: Option<u64>,
    pub consumer_tag: Option<String>,
    pub reply_code: Option<u16>,
    pub content_type: Option<String>,
    pub body_size: usize,
    pub body: String,
}

impl MessageRow {
    pub fn new(source: &'static str, message: &IncomingMessage) -> Self {
        let info = message.info();
        Self {
            channel: message.channel_id(),
            source,
            exchange: info.exchange.clone(),
            routing_key: info.routing_key.clone(),
            delivery_tag: info.delivery_tag,
            consumer_tag: info.consumer_tag.clone(),
            reply_code: info.returned.as_ref().map(|r| r.reply_code),
            content_type: message.properties().content_type.clone(),
            body_size: message.body().len(),
            body: body_text(message.body()),
        }
    }
}

pub fn print_frames(rows: &[FrameRow], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for row in rows {
                print_json(row);
            }
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["#", "CHANNEL", "KIND", "METHOD", "SIZE", "DETAIL"]);
            for row in rows {
                table.add_row(vec![
                    row.index.to_string(),
                    row.channel.to_string(),
                    row.kind.to_string(),
                    row.method.unwrap_or("-").to_string(),
                    row.payload_size.to_string(),
                    row.detail.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                println!(
                    "#{} channel={} ({}) kind={} method={} size={} {}",
                    row.index,
                    row.channel,
                    row.channel_name,
                    row.kind,
                    row.method.unwrap_or("-"),
                    row.payload_size,
                    row.detail
                );
            }
        }
    }
}

pub fn print_messages(rows: &[MessageRow], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for row in rows {
                print_json(row);
            }
        }
        OutputFormat::Table => {
            let mut table = new_table(vec![
                "CHANNEL",
                "SOURCE",
                "EXCHANGE",
                "ROUTING KEY",
                "TAG",
                "SIZE",
                "BODY",
            ]);
            for row in rows {
                table.add_row(vec![
                    row.channel.to_string(),
                    row.source.to_string(),
                    row.exchange.clone(),
                    row.routing_key.clone(),
                    row.delivery_tag
                        .map_or_else(|| "-".to_string(), |tag| tag.to_string()),
                    row.body_size.to_string(),
                    truncate(&row.body),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                println!(
                    "channel={} source={} exchange={:?} routing_key={:?} size={} body={}",
                    row.channel,
                    row.source,
                    row.exchange,
                    row.routing_key,
                    row.body_size,
                    truncate(&row.body)
                );
            }
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json<T: Serialize>(row: &T) {
    println!(
        "{}",
        serde_json::to_string(row).unwrap_or_else(|_| "{}".to_string())
    );
}

fn kind_name(frame: &Frame) -> &'static str {
    match frame.body {
        FrameBody::Method(_) => "method",
        FrameBody::Header(_) => "header",
        FrameBody::Body(_) => "body",
        FrameBody::Heartbeat => "heartbeat",
    }
}

fn body_text(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", body.len()),
    }
}

fn preview(body: &[u8]) -> String {
    truncate(&body_text(body))
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
