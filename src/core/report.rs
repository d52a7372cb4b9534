use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ErrorKind, PairError};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairStatus {
    Extracted { frames: usize, objects: usize },
    Skipped { kind: ErrorKind, reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PairOutcome {
    /// Pair key relative to the dataset root, e.g. `set00/V000`
    pub relative: PathBuf,
    #[serde(flatten)]
    pub status: PairStatus,
}

impl PairOutcome {
    pub fn extracted(relative: PathBuf, frames: usize, objects: usize) -> Self {
        Self {
            relative,
            status: PairStatus::Extracted { frames, objects },
        }
    }

    pub fn skipped(relative: PathBuf, err: &PairError) -> Self {
        Self {
            relative,
            status: PairStatus::Skipped {
                kind: err.kind(),
                reason: err.to_string(),
            },
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match &self.status {
            PairStatus::Extracted { .. } => None,
            PairStatus::Skipped { kind, .. } => Some(*kind),
        }
    }
}

/// Aggregate result of one run, also written out as the run manifest
#[derive(Clone, Debug, Serialize)]
pub struct ExtractReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub frames_written: usize,
    pub outcomes: Vec<PairOutcome>,
}

impl ExtractReport {
    pub fn new(started_at: DateTime<Utc>, mut outcomes: Vec<PairOutcome>) -> Self {
        outcomes.sort_by(|a, b| a.relative.cmp(&b.relative));

        let mut report = Self {
            started_at,
            finished_at: Utc::now(),
            succeeded: 0,
            skipped: 0,
            failed: 0,
            frames_written: 0,
            outcomes,
        };
        for outcome in &report.outcomes {
            match &outcome.status {
                PairStatus::Extracted { frames, .. } => {
                    report.succeeded += 1;
                    report.frames_written += frames;
                }
                PairStatus::Skipped {
                    kind: ErrorKind::MissingPair,
                    ..
                } => report.skipped += 1,
                PairStatus::Skipped { .. } => report.failed += 1,
            }
        }
        report
    }

    /// Pairs that had both files and were decoded
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Every attempted pair failed
    pub fn is_total_failure(&self) -> bool {
        self.attempted() > 0 && self.succeeded == 0
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.kind() == Some(kind))
            .count()
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "{} pairs extracted ({} frames), {} skipped, {} failed",
            self.succeeded, self.frames_written, self.skipped, self.failed
        );
        for kind in ErrorKind::ALL {
            let n = self.count(kind);
            if n > 0 {
                text.push_str(&format!("\n  {:?}: {}", kind, n));
            }
        }
        for outcome in &self.outcomes {
            if let PairStatus::Skipped { reason, .. } = &outcome.status {
                text.push_str(&format!("\n  - {}: {}", outcome.relative.display(), reason));
            }
        }
        text
    }
}
