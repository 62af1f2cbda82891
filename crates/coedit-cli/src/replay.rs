//! Replay of newline-delimited JSON operation logs

use std::io::BufRead;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

use coedit_core::{ApplyOutcome, ConflictResolutionService, DocumentId, Operation};

/// A log line that did not make it into the document
#[derive(Debug, Clone, Serialize)]
pub struct RejectedLine {
    pub line: usize,
    pub reason: String,
}

/// Outcome of replaying one log
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReplayReport {
    pub applied: usize,
    pub duplicates: usize,
    pub rejected: Vec<RejectedLine>,
}

/// Feed every operation in `reader` to the service, one JSON object per line.
///
/// Blank lines and lines starting with `#` are skipped. Malformed or
/// rejected operations are recorded and replay continues, unless
/// `stop_on_error` is set.
pub fn replay<R: BufRead>(
    service: &ConflictResolutionService,
    id: &DocumentId,
    reader: R,
    stop_on_error: bool,
) -> Result<ReplayReport> {
    let mut report = ReplayReport::default();

    for (index, line) in reader.lines().enumerate() {
        let number = index + 1;
        let line = line.with_context(|| format!("failed to read line {}", number))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let result = Operation::from_json(line)
            .and_then(|op| service.apply_operation(id, op))
            .map_err(|e| e.to_string());

        match result {
            Ok(ApplyOutcome::Applied { version, .. }) => {
                debug!(line = number, version, "Replayed operation");
                report.applied += 1;
            }
            Ok(ApplyOutcome::Duplicate) => {
                debug!(line = number, "Skipped duplicate operation");
                report.duplicates += 1;
            }
            Err(reason) => {
                if stop_on_error {
                    bail!("line {}: {}", number, reason);
                }
                warn!(line = number, %reason, "Rejected operation");
                report.rejected.push(RejectedLine { line: number, reason });
            }
        }
    }

    Ok(report)
}
