//! Write a small server-to-client capture for `amqprims decode` / `replay`.
//!
//! ```text
//! cargo run -p amqprims --example write-capture -- /tmp/capture.bin
//! cargo run -p amqprims --features cli -- replay /tmp/capture.bin
//! ```

use std::fs::File;
use std::io::BufWriter;

use amqprims::frame::method::{BasicDeliver, BasicGetOk};
use amqprims::frame::{BasicProperties, ContentHeader, Frame, FrameWriter, Method};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "capture.bin".to_string());
    let mut writer = FrameWriter::new(BufWriter::new(File::create(&path)?));

    let json = BasicProperties {
        content_type: Some("application/json".to_string()),
        ..BasicProperties::default()
    };
    let body = br#"{"order":1001,"status":"shipped"}"#;

    let frames = vec![
        Frame::method(1, Method::ChannelOpenOk),
        Frame::method(
            1,
            Method::BasicConsumeOk {
                consumer_tag: "ctag-1".to_string(),
            },
        ),
        Frame::method(
            1,
            Method::BasicDeliver(BasicDeliver {
                consumer_tag: "ctag-1".to_string(),
                delivery_tag: 1,
                redelivered: false,
                exchange: "orders".to_string(),
                routing_key: "order.shipped".to_string(),
            }),
        ),
        Frame::header(1, ContentHeader::basic(body.len() as u64, json)),
        Frame::content(1, &body[..16]),
        Frame::heartbeat(),
        Frame::content(1, &body[16..]),
        Frame::method(
            2,
            Method::BasicGetOk(BasicGetOk {
                delivery_tag: 1,
                redelivered: false,
                exchange: String::new(),
                routing_key: "audit".to_string(),
                message_count: 0,
            }),
        ),
        Frame::header(2, ContentHeader::basic(5, BasicProperties::default())),
        Frame::content(2, &b"audit"[..]),
    ];
    for frame in &frames {
        writer.write_frame(frame)?;
    }
    writer.flush()?;

    println!("wrote {} frames to {path}", frames.len());
    Ok(())
}
