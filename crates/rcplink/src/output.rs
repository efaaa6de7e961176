use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

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

#[derive(Serialize)]
pub struct LoopbackReport {
    pub schema_id: &'static str,
    pub frames_sent: usize,
    pub frames_echoed: usize,
    pub bytes: usize,
    pub elapsed_ms: u128,
    pub reset_epoch: u64,
}

impl LoopbackReport {
    pub const SCHEMA_ID: &'static str =
        "https://schemas.3leaps.dev/rcplink/cli/v1/loopback-report.schema.json";
}

pub fn print_loopback_report(report: &LoopbackReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SENT", "ECHOED", "BYTES", "ELAPSED (ms)", "EPOCH"])
                .add_row(vec![
                    report.frames_sent.to_string(),
                    report.frames_echoed.to_string(),
                    report.bytes.to_string(),
                    report.elapsed_ms.to_string(),
                    report.reset_epoch.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "sent={} echoed={} bytes={} elapsed={}ms epoch={}",
                report.frames_sent,
                report.frames_echoed,
                report.bytes,
                report.elapsed_ms,
                report.reset_epoch
            );
        }
    }
}
