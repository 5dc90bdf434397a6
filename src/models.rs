use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MasteryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standard {
    pub code: String,
    pub domain: String,
    pub grade: String,
    pub cluster: String,
    pub text: String,
}

/// The (class, grade) pair every read and write is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selection {
    pub class_name: String,
    pub grade: String,
}

impl Selection {
    pub fn new(class_name: impl Into<String>, grade: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            grade: grade.into(),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / grade {}", self.class_name, self.grade)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionTag {
    pub standard_code: Option<String>,
    pub max_points: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StandardTags {
    /// Each section carries its own standard and point value.
    Sections(Vec<SectionTag>),
    /// A flat list of standards attached to the assessment as a whole.
    Whole {
        codes: Vec<String>,
        max_score: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentRecord {
    pub id: Uuid,
    pub class_name: String,
    pub grade: String,
    pub semester: String,
    pub title: String,
    pub tags: StandardTags,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryScores {
    Sections(BTreeMap<usize, Option<f64>>),
    Whole(Option<f64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeEntry {
    pub assessment_id: Uuid,
    pub student_id: String,
    pub scores: EntryScores,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mark {
    GotIt,
    Almost,
    NotYet,
}

impl Mark {
    /// Pseudo-score a mark stands in for when blended with assessment data.
    pub fn score(self) -> f64 {
        match self {
            Mark::GotIt => 95.0,
            Mark::Almost => 60.0,
            Mark::NotYet => 20.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mark::GotIt => "got_it",
            Mark::Almost => "almost",
            Mark::NotYet => "not_yet",
        }
    }
}

impl FromStr for Mark {
    type Err = MasteryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "got_it" => Ok(Mark::GotIt),
            "almost" => Ok(Mark::Almost),
            "not_yet" => Ok(Mark::NotYet),
            other => Err(MasteryError::Malformed(format!("unknown mark `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuickCheckMark {
    pub id: Uuid,
    pub student_id: String,
    pub standard_code: String,
    pub class_name: String,
    pub grade: String,
    pub mark: Mark,
    pub recorded_at: DateTime<Utc>,
}

/// Ordinal mastery band. Variant order is the band order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MasteryLevel {
    Below,
    Approaching,
    On,
    Above,
}

impl MasteryLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            MasteryLevel::Below => "below",
            MasteryLevel::Approaching => "approaching",
            MasteryLevel::On => "on",
            MasteryLevel::Above => "above",
        }
    }
}

impl FromStr for MasteryLevel {
    type Err = MasteryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "below" => Ok(MasteryLevel::Below),
            "approaching" => Ok(MasteryLevel::Approaching),
            "on" => Ok(MasteryLevel::On),
            "above" => Ok(MasteryLevel::Above),
            other => Err(MasteryError::Malformed(format!(
                "unknown mastery status `{other}`"
            ))),
        }
    }
}

impl fmt::Display for MasteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status as shown to the caller; `NotStarted` is the absence of a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    NotStarted,
    Level(MasteryLevel),
}

impl Status {
    pub fn level(self) -> Option<MasteryLevel> {
        match self {
            Status::NotStarted => None,
            Status::Level(level) => Some(level),
        }
    }

    /// Whether the intervention workflow applies to this status.
    pub fn needs_support(self) -> bool {
        matches!(
            self,
            Status::Level(MasteryLevel::Below) | Status::Level(MasteryLevel::Approaching)
        )
    }
}

impl From<Option<MasteryLevel>> for Status {
    fn from(level: Option<MasteryLevel>) -> Self {
        level.map(Status::Level).unwrap_or(Status::NotStarted)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::NotStarted => f.write_str("not_started"),
            Status::Level(level) => level.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterventionStatus {
    #[default]
    None,
    NotYetTaught,
    TaughtNeedsReteach,
    Reteaching,
    Reassessing,
}

impl InterventionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InterventionStatus::None => "none",
            InterventionStatus::NotYetTaught => "not_yet_taught",
            InterventionStatus::TaughtNeedsReteach => "taught_needs_reteach",
            InterventionStatus::Reteaching => "reteaching",
            InterventionStatus::Reassessing => "reassessing",
        }
    }
}

impl FromStr for InterventionStatus {
    type Err = MasteryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "none" | "" => Ok(InterventionStatus::None),
            "not_yet_taught" => Ok(InterventionStatus::NotYetTaught),
            "taught_needs_reteach" => Ok(InterventionStatus::TaughtNeedsReteach),
            "reteaching" => Ok(InterventionStatus::Reteaching),
            "reassessing" => Ok(InterventionStatus::Reassessing),
            other => Err(MasteryError::Malformed(format!(
                "unknown intervention status `{other}`"
            ))),
        }
    }
}

impl fmt::Display for InterventionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted mastery row. Absence of a row means not started.
#[derive(Debug, Clone, PartialEq)]
pub struct MasteryStatusRecord {
    pub class_name: String,
    pub grade: String,
    pub standard_code: String,
    pub status: MasteryLevel,
    pub intervention: InterventionStatus,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

/// Per-standard output handed back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardView {
    pub code: String,
    pub domain: String,
    pub cluster: String,
    pub text: String,
    pub effective_status: Status,
    pub computed_percentage: Option<f64>,
    pub intervention_status: Option<InterventionStatus>,
    pub has_manual_override: bool,
}
