use clap::{Args, Subcommand};
use std::path::PathBuf;

use amqprims_frame::DEFAULT_FRAME_MAX;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod replay;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a captured frame stream and list its frames.
    Decode(DecodeArgs),
    /// Reassemble the messages in a captured server-to-client frame stream.
    Replay(ReplayArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Replay(args) => replay::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file holding raw frames (a leading protocol header is skipped).
    pub file: PathBuf,
    /// Only list frames on this channel.
    #[arg(long, short = 'c')]
    pub channel: Option<u16>,
    /// Negotiated frame_max; 0 disables the size check.
    #[arg(long, default_value_t = DEFAULT_FRAME_MAX, env = "AMQPRIMS_FRAME_MAX")]
    pub frame_max: u32,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Capture file holding raw frames sent by the server.
    pub file: PathBuf,
    /// Negotiated frame_max; 0 disables the size check.
    #[arg(long, default_value_t = DEFAULT_FRAME_MAX, env = "AMQPRIMS_FRAME_MAX")]
    pub frame_max: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
