use clap::{Args, Subcommand, ValueEnum};

use rcplink_buffer::Priority;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod loopback;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive frames through an in-memory link and echo peer.
    Loopback(LoopbackArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Loopback(args) => loopback::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    /// Number of frames to send.
    #[arg(long, short = 'n', default_value_t = 10)]
    pub count: usize,

    /// Payload text; a sequence number is appended per frame.
    #[arg(long, default_value = "rcplink loopback")]
    pub payload: String,

    /// Outbound priority lane.
    #[arg(long, value_enum, default_value_t = PriorityArg::Low)]
    pub priority: PriorityArg,

    /// Bus id passed to the adapter at init.
    #[arg(long, default_value_t = 0)]
    pub bus_id: u8,

    /// Simulate an RCP restart halfway through.
    #[arg(long)]
    pub reset_midway: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum PriorityArg {
    Low,
    High,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => Priority::Low,
            PriorityArg::High => Priority::High,
        }
    }
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
