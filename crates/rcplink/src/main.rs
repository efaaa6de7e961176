mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "rcplink", version, about = "RCP link layer CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        env = "RCPLINK_LOG_FORMAT",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "RCPLINK_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
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
    fn parses_loopback_subcommand() {
        let cli = Cli::try_parse_from([
            "rcplink",
            "loopback",
            "--count",
            "3",
            "--priority",
            "high",
        ])
        .expect("loopback args should parse");

        match cli.command {
            Command::Loopback(args) => {
                assert_eq!(args.count, 3);
                assert!(!args.reset_midway);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_version_subcommand() {
        let cli = Cli::try_parse_from(["rcplink", "version", "--extended"])
            .expect("version args should parse");
        assert!(matches!(cli.command, Command::Version(_)));
    }

    #[test]
    fn rejects_unknown_priority() {
        let err = Cli::try_parse_from(["rcplink", "loopback", "--priority", "urgent"])
            .expect_err("invalid priority should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
