use std::fs::File;
use std::io::BufReader;

use amqprims_frame::{encode_frame, Frame, FrameConfig, FrameError, FrameReader, FRAME_OVERHEAD};
use bytes::BytesMut;
use tracing::debug;

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_frames, FrameRow, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let file = File::open(&args.file)
        .map_err(|err| io_error(&format!("cannot open {}", args.file.display()), err))?;
    let mut frames = open_capture(file, args.frame_max);

    let mut rows = Vec::new();
    let mut index = 0usize;
    while let Some(frame) = next_frame(&mut frames)? {
        if args.channel.is_none_or(|channel| channel == frame.channel) {
            rows.push(FrameRow::new(index, &frame, payload_size(&frame)?));
        }
        index += 1;
    }
    debug!(total = index, listed = rows.len(), "capture decoded");

    print_frames(&rows, format);
    Ok(SUCCESS)
}

pub(crate) fn open_capture(file: File, frame_max: u32) -> FrameReader<BufReader<File>> {
    FrameReader::with_config(BufReader::new(file), FrameConfig::for_frame_max(frame_max))
}

/// The next frame, or `None` at a clean end of the capture.
pub(crate) fn next_frame(reader: &mut FrameReader<BufReader<File>>) -> CliResult<Option<Frame>> {
    match reader.read_frame() {
        Ok(frame) => Ok(Some(frame)),
        Err(FrameError::ConnectionClosed) if reader.buffered() == 0 => Ok(None),
        Err(FrameError::ConnectionClosed) => Err(CliError::new(
            DATA_INVALID,
            format!(
                "capture ends inside a frame ({} trailing bytes)",
                reader.buffered()
            ),
        )),
        Err(err) => Err(frame_error("decode failed", err)),
    }
}

fn payload_size(frame: &Frame) -> CliResult<usize> {
    let mut buf = BytesMut::new();
    encode_frame(frame, &mut buf).map_err(|err| frame_error("re-encode failed", err))?;
    Ok(buf.len().saturating_sub(FRAME_OVERHEAD))
}
