mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "amqprims", version, about = "AMQP 0-9-1 frame capture tools")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true, env = "AMQPRIMS_FORMAT")]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        global = true,
        env = "AMQPRIMS_LOG_LEVEL"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit::USAGE
            } else {
                exit::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decode_subcommand() {
        let cli = Cli::try_parse_from([
            "amqprims",
            "decode",
            "/tmp/capture.bin",
            "--channel",
            "3",
            "--frame-max",
            "4096",
        ])
        .expect("decode args should parse");

        match cli.command {
            Command::Decode(args) => {
                assert_eq!(args.channel, Some(3));
                assert_eq!(args.frame_max, 4096);
            }
            other => panic!("expected decode, got {other:?}"),
        }
    }

    #[test]
    fn replay_defaults_frame_max() {
        let cli = Cli::try_parse_from(["amqprims", "replay", "/tmp/capture.bin"])
            .expect("replay args should parse");
        match cli.command {
            Command::Replay(args) => {
                assert_eq!(args.frame_max, amqprims_frame::DEFAULT_FRAME_MAX)
            }
            other => panic!("expected replay, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_numeric_channel() {
        let err = Cli::try_parse_from(["amqprims", "decode", "/tmp/x", "--channel", "one"])
            .expect_err("channel must be numeric");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
