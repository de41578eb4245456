use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chatlog_runtime::{MessagePipeline, PipelineOutcome};
use chatlog_store::{ConversationKind, LogStore, Period};
use serde_json::{json, Value};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Per-run totals of an `ingest` command.
pub(crate) struct IngestReport {
    pub(crate) logged: usize,
    pub(crate) duplicates: usize,
    pub(crate) ignored: usize,
    pub(crate) failed: usize,
}

pub(crate) fn open_input(input: &str) -> Result<Box<dyn BufRead>> {
    if input == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let path = Path::new(input);
    let file =
        File::open(path).with_context(|| format!("failed to open input {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Runs every non-blank input line through the pipeline and writes one JSON
/// summary per line.
pub(crate) fn execute_ingest_command(
    pipeline: &MessagePipeline,
    input: impl BufRead,
    output: &mut impl Write,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                tracing::warn!(line = line_number, %error, "skipping unreadable input line");
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let summary = match pipeline.handle_raw(&line) {
            Ok(outcome) => {
                match &outcome {
                    PipelineOutcome::Duplicate => report.duplicates += 1,
                    PipelineOutcome::Ignored { .. } => report.ignored += 1,
                    PipelineOutcome::Logged { .. } => report.logged += 1,
                }
                let mut summary = serde_json::to_value(&outcome)
                    .context("failed to encode pipeline outcome")?;
                if let Value::Object(fields) = &mut summary {
                    fields.insert("line".to_string(), json!(line_number));
                }
                summary
            }
            Err(error) => {
                report.failed += 1;
                tracing::warn!(line = line_number, %error, "failed to log message");
                json!({
                    "line": line_number,
                    "outcome": "failed",
                    "reason_code": error.reason_code(),
                    "error": error.to_string(),
                })
            }
        };
        writeln!(output, "{summary}").context("failed to write ingest summary")?;
    }
    output.flush().context("failed to flush ingest summaries")?;
    tracing::info!(
        logged = report.logged,
        duplicates = report.duplicates,
        ignored = report.ignored,
        failed = report.failed,
        "ingest finished"
    );
    Ok(report)
}

/// Writes the matching log entries as NDJSON and returns how many were written.
pub(crate) fn execute_history_command(
    store: &LogStore,
    kind: ConversationKind,
    name: &str,
    from: Option<Period>,
    to: Option<Period>,
    output: &mut impl Write,
) -> Result<usize> {
    let mut history = store
        .get_history(kind, name, from, to)
        .with_context(|| format!("failed to read history for {kind} conversation '{name}'"))?;
    let mut written = 0;
    for entry in history.by_ref() {
        let line = serde_json::to_string(&entry).context("failed to encode log entry")?;
        writeln!(output, "{line}").context("failed to write history entry")?;
        written += 1;
    }
    output.flush().context("failed to flush history")?;
    if history.skipped_lines() > 0 {
        tracing::warn!(
            skipped = history.skipped_lines(),
            "skipped unparseable log lines"
        );
    }
    Ok(written)
}
