use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::blend::Suggestions;
use crate::error::MasteryError;
use crate::models::{InterventionStatus, MasteryLevel, MasteryStatusRecord, Selection};
use crate::store::StatusStore;
use crate::thresholds::{classify, ThresholdConfig};

/// Outcome of comparing one persisted status with a fresh suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing stored yet; store the suggestion.
    Insert(MasteryLevel),
    /// Stored status lags the evidence; replace it.
    Overwrite {
        from: MasteryLevel,
        to: MasteryLevel,
    },
    /// Stored status already matches, or there is nothing to suggest.
    Unchanged,
    /// Stored `above` outranks any computed suggestion.
    Sticky,
}

impl Decision {
    /// Level to write, if any.
    pub fn write(self) -> Option<MasteryLevel> {
        match self {
            Decision::Insert(level) | Decision::Overwrite { to: level, .. } => Some(level),
            Decision::Unchanged | Decision::Sticky => None,
        }
    }
}

pub fn decide(persisted: Option<MasteryLevel>, suggestion: Option<MasteryLevel>) -> Decision {
    match (persisted, suggestion) {
        (_, None) => Decision::Unchanged,
        (None, Some(level)) => Decision::Insert(level),
        (Some(current), Some(level)) if current == level => Decision::Unchanged,
        (Some(MasteryLevel::Above), Some(_)) => Decision::Sticky,
        (Some(current), Some(level)) => Decision::Overwrite {
            from: current,
            to: level,
        },
    }
}

/// The state a standard ends up in after reconciliation.
pub fn merge(
    persisted: Option<MasteryLevel>,
    suggestion: Option<MasteryLevel>,
) -> Option<MasteryLevel> {
    decide(persisted, suggestion).write().or(persisted)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub overwritten: usize,
    pub unchanged: usize,
    pub sticky: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub writes: Vec<MasteryStatusRecord>,
    pub summary: ReconcileSummary,
}

pub fn plan(
    selection: &Selection,
    persisted: &HashMap<String, MasteryStatusRecord>,
    suggestions: &Suggestions,
    thresholds: &ThresholdConfig,
    actor: &str,
    now: DateTime<Utc>,
) -> ReconcilePlan {
    let mut result = ReconcilePlan::default();

    for (code, pct) in suggestions {
        let existing = persisted.get(code);
        let suggestion = classify(Some(*pct), thresholds).level();
        let decision = decide(existing.map(|row| row.status), suggestion);

        match decision {
            Decision::Insert(_) => result.summary.inserted += 1,
            Decision::Overwrite { .. } => result.summary.overwritten += 1,
            Decision::Unchanged => result.summary.unchanged += 1,
            Decision::Sticky => result.summary.sticky += 1,
        }

        if let Some(status) = decision.write() {
            result.writes.push(MasteryStatusRecord {
                class_name: selection.class_name.clone(),
                grade: selection.grade.clone(),
                standard_code: code.clone(),
                status,
                intervention: existing
                    .map(|row| row.intervention)
                    .unwrap_or(InterventionStatus::None),
                updated_by: actor.to_string(),
                updated_at: now,
            });
        }
    }

    result
}

/// Result of pushing a batch of writes to the status store.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub written: Vec<MasteryStatusRecord>,
    pub failed: Vec<(MasteryStatusRecord, MasteryError)>,
}

/// Upserts every record, continuing past failures so each one can be retried
/// on its own.
pub async fn apply<S>(store: &S, writes: Vec<MasteryStatusRecord>) -> ApplyReport
where
    S: StatusStore + ?Sized,
{
    let mut report = ApplyReport::default();
    for record in writes {
        match store.upsert_status(&record).await {
            Ok(()) => report.written.push(record),
            Err(err) => report.failed.push((record, err)),
        }
    }
    report
}
