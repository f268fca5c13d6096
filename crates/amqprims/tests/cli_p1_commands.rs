#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::Command;

use amqprims::frame::method::{BasicDeliver, BasicReturn};
use amqprims::frame::{BasicProperties, ContentHeader, Frame, FrameWriter, Method};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "amqpcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn write_capture(path: &PathBuf, frames: &[Frame]) {
    let file = std::fs::File::create(path).expect("capture should be creatable");
    let mut writer = FrameWriter::new(file);
    writer
        .write_protocol_header()
        .expect("protocol header should write");
    for frame in frames {
        writer.write_frame(frame).expect("frame should write");
    }
    writer.flush().expect("capture should flush");
}

fn sample_frames() -> Vec<Frame> {
    vec![
        Frame::method(1, Method::ChannelOpenOk),
        Frame::method(
            1,
            Method::BasicDeliver(BasicDeliver {
                consumer_tag: "ctag-1".to_string(),
                delivery_tag: 42,
                redelivered: false,
                exchange: "orders".to_string(),
                routing_key: "order.created".to_string(),
            }),
        ),
        Frame::method(
            2,
            Method::BasicReturn(BasicReturn {
                reply_code: 312,
                reply_text: "NO_ROUTE".to_string(),
                exchange: "orders".to_string(),
                routing_key: "nowhere".to_string(),
            }),
        ),
        Frame::header(1, ContentHeader::basic(11, BasicProperties::default())),
        Frame::header(2, ContentHeader::basic(4, BasicProperties::default())),
        Frame::content(1, &b"hello "[..]),
        Frame::heartbeat(),
        Frame::content(2, &b"lost"[..]),
        Frame::content(1, &b"world"[..]),
    ]
}

fn run(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_amqprims"))
        .args(["--log-level", "error", "--format", "json"])
        .args(args)
        .output()
        .expect("amqprims should run")
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect()
}

#[test]
fn decode_lists_every_frame() {
    let dir = unique_temp_dir("decode");
    let capture = dir.join("capture.bin");
    write_capture(&capture, &sample_frames());

    let output = run(&["decode", capture.to_str().unwrap()]);
    assert!(output.status.success());

    let rows = json_lines(&output.stdout);
    assert_eq!(rows.len(), 9);
    assert_eq!(rows[0]["method"], "channel.open-ok");
    assert_eq!(rows[1]["method"], "basic.deliver");
    assert_eq!(rows[3]["kind"], "header");
    assert_eq!(rows[6]["kind"], "heartbeat");
    assert_eq!(rows[6]["channel_name"], "CONNECTION");
    assert_eq!(rows[8]["payload_size"], 5);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn decode_filters_by_channel() {
    let dir = unique_temp_dir("decode-filter");
    let capture = dir.join("capture.bin");
    write_capture(&capture, &sample_frames());

    let output = run(&["decode", capture.to_str().unwrap(), "--channel", "2"]);
    assert!(output.status.success());

    let rows = json_lines(&output.stdout);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|row| row["channel"] == 2));
    assert_eq!(rows[0]["index"], 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn replay_rebuilds_interleaved_messages() {
    let dir = unique_temp_dir("replay");
    let capture = dir.join("capture.bin");
    write_capture(&capture, &sample_frames());

    let output = run(&["replay", capture.to_str().unwrap()]);
    assert!(output.status.success());

    let rows = json_lines(&output.stdout);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["source"], "return");
    assert_eq!(rows[0]["reply_code"], 312);
    assert_eq!(rows[0]["body"], "lost");
    assert_eq!(rows[1]["source"], "deliver");
    assert_eq!(rows[1]["delivery_tag"], 42);
    assert_eq!(rows[1]["consumer_tag"], "ctag-1");
    assert_eq!(rows[1]["body"], "hello world");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_reports_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_amqprims"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("amqprims {}", env!("CARGO_PKG_VERSION"))
    );
}
