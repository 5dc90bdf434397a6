use async_trait::async_trait;
use uuid::Uuid;

use crate::error::MasteryError;
use crate::models::{
    AssessmentRecord, GradeEntry, MasteryStatusRecord, QuickCheckMark, Selection, Standard,
};
use crate::thresholds::ThresholdBook;

#[cfg(test)]
pub mod memory;

#[async_trait]
pub trait StandardsSource: Send + Sync {
    async fn standards_for_grade(&self, grade: &str) -> Result<Vec<Standard>, MasteryError>;
}

#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn assessments(
        &self,
        selection: &Selection,
        semester: &str,
    ) -> Result<Vec<AssessmentRecord>, MasteryError>;

    async fn grade_entries(&self, assessment_ids: &[Uuid]) -> Result<Vec<GradeEntry>, MasteryError>;
}

#[async_trait]
pub trait QuickCheckStore: Send + Sync {
    async fn append_quick_check(&self, mark: &QuickCheckMark) -> Result<(), MasteryError>;

    async fn quick_checks(
        &self,
        selection: &Selection,
        standard_code: Option<&str>,
    ) -> Result<Vec<QuickCheckMark>, MasteryError>;
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn statuses(&self, selection: &Selection) -> Result<Vec<MasteryStatusRecord>, MasteryError>;

    /// Insert or replace the row keyed by (class, grade, standard_code).
    async fn upsert_status(&self, record: &MasteryStatusRecord) -> Result<(), MasteryError>;

    /// Returns whether a row was removed.
    async fn delete_status(
        &self,
        selection: &Selection,
        standard_code: &str,
    ) -> Result<bool, MasteryError>;
}

#[async_trait]
pub trait ThresholdStore: Send + Sync {
    async fn load_thresholds(&self) -> Result<ThresholdBook, MasteryError>;

    async fn save_thresholds(&self, book: &ThresholdBook) -> Result<(), MasteryError>;
}

pub trait MasteryStore:
    StandardsSource + AssessmentStore + QuickCheckStore + StatusStore + ThresholdStore
{
}

impl<T> MasteryStore for T where
    T: StandardsSource + AssessmentStore + QuickCheckStore + StatusStore + ThresholdStore
{
}
