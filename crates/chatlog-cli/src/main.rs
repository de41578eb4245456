mod bootstrap_helpers;
mod cli_args;
mod commands;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chatlog_dedup::DedupCache;
use chatlog_runtime::{MessagePipeline, TracingSink};
use chatlog_store::LogStore;
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::{Cli, CliCommand};
use crate::commands::{execute_history_command, execute_ingest_command, open_input};

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let store = LogStore::open(cli.store_config()).with_context(|| {
        format!("failed to open log store {}", cli.store_root.display())
    })?;
    let stdout = io::stdout();
    let mut output = stdout.lock();

    match &cli.command {
        CliCommand::Ingest { input } => {
            let pipeline = MessagePipeline::new(
                Arc::new(DedupCache::new(cli.dedup_config())),
                Arc::new(store),
                cli.pipeline_policy(),
                Arc::new(TracingSink),
            );
            let reader = open_input(input)?;
            let report = execute_ingest_command(&pipeline, reader, &mut output)?;
            output.flush().context("failed to flush stdout")?;
            if report.failed > 0 {
                bail!("{} message(s) could not be logged", report.failed);
            }
        }
        CliCommand::History {
            kind,
            name,
            from,
            to,
        } => {
            execute_history_command(&store, *kind, name, *from, *to, &mut output)?;
        }
    }
    Ok(())
}
