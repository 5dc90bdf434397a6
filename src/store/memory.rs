use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use super::{AssessmentStore, QuickCheckStore, StandardsSource, StatusStore, ThresholdStore};
use crate::error::MasteryError;
use crate::models::{
    AssessmentRecord, GradeEntry, MasteryStatusRecord, QuickCheckMark, Selection, Standard,
};
use crate::thresholds::ThresholdBook;

type StatusKey = (String, String, String);

#[derive(Default)]
struct Tables {
    standards: Vec<Standard>,
    assessments: Vec<AssessmentRecord>,
    entries: Vec<GradeEntry>,
    quick_checks: Vec<QuickCheckMark>,
    statuses: BTreeMap<StatusKey, MasteryStatusRecord>,
    thresholds: serde_json::Value,
    failing_upserts: HashSet<String>,
    fail_status_reads: bool,
    status_read_gate: Option<Arc<Notify>>,
}

/// In-process store with counters and failure switches for tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    pub upserts: AtomicUsize,
    pub deletes: AtomicUsize,
    pub evidence_loads: AtomicUsize,
}

fn key(class_name: &str, grade: &str, code: &str) -> StatusKey {
    (class_name.to_string(), grade.to_string(), code.to_string())
}

impl MemoryStore {
    pub async fn add_standard(&self, code: &str, grade: &str) {
        self.tables.lock().await.standards.push(Standard {
            code: code.to_string(),
            domain: "Reading: Literature".to_string(),
            grade: grade.to_string(),
            cluster: "Key Ideas and Details".to_string(),
            text: format!("Objective {code}"),
        });
    }

    pub async fn add_assessment(&self, assessment: AssessmentRecord, entries: Vec<GradeEntry>) {
        let mut tables = self.tables.lock().await;
        tables.assessments.push(assessment);
        tables.entries.extend(entries);
    }

    pub async fn put_status(&self, record: MasteryStatusRecord) {
        let mut tables = self.tables.lock().await;
        let key = key(&record.class_name, &record.grade, &record.standard_code);
        tables.statuses.insert(key, record);
    }

    pub async fn set_threshold_document(&self, document: serde_json::Value) {
        self.tables.lock().await.thresholds = document;
    }

    pub async fn fail_upserts_for(&self, code: &str) {
        self.tables.lock().await.failing_upserts.insert(code.to_string());
    }

    pub async fn heal_upserts(&self) {
        self.tables.lock().await.failing_upserts.clear();
    }

    pub async fn fail_status_reads(&self, fail: bool) {
        self.tables.lock().await.fail_status_reads = fail;
    }

    /// Holds the next status read until `gate` is notified.
    pub async fn gate_next_status_read(&self, gate: Arc<Notify>) {
        self.tables.lock().await.status_read_gate = Some(gate);
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StandardsSource for MemoryStore {
    async fn standards_for_grade(&self, grade: &str) -> Result<Vec<Standard>, MasteryError> {
        self.evidence_loads.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables.lock().await;
        let mut standards: Vec<Standard> = tables
            .standards
            .iter()
            .filter(|s| s.grade == grade)
            .cloned()
            .collect();
        standards.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(standards)
    }
}

#[async_trait]
impl AssessmentStore for MemoryStore {
    async fn assessments(
        &self,
        selection: &Selection,
        semester: &str,
    ) -> Result<Vec<AssessmentRecord>, MasteryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .assessments
            .iter()
            .filter(|a| {
                a.class_name == selection.class_name
                    && a.grade == selection.grade
                    && a.semester == semester
            })
            .cloned()
            .collect())
    }

    async fn grade_entries(&self, assessment_ids: &[Uuid]) -> Result<Vec<GradeEntry>, MasteryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .entries
            .iter()
            .filter(|e| assessment_ids.contains(&e.assessment_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl QuickCheckStore for MemoryStore {
    async fn append_quick_check(&self, mark: &QuickCheckMark) -> Result<(), MasteryError> {
        self.tables.lock().await.quick_checks.push(mark.clone());
        Ok(())
    }

    async fn quick_checks(
        &self,
        selection: &Selection,
        standard_code: Option<&str>,
    ) -> Result<Vec<QuickCheckMark>, MasteryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .quick_checks
            .iter()
            .filter(|m| m.class_name == selection.class_name && m.grade == selection.grade)
            .filter(|m| standard_code.map_or(true, |code| m.standard_code == code))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn statuses(&self, selection: &Selection) -> Result<Vec<MasteryStatusRecord>, MasteryError> {
        let gate = self.tables.lock().await.status_read_gate.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let tables = self.tables.lock().await;
        if tables.fail_status_reads {
            return Err(MasteryError::Storage("status table unavailable".into()));
        }
        Ok(tables
            .statuses
            .values()
            .filter(|r| r.class_name == selection.class_name && r.grade == selection.grade)
            .cloned()
            .collect())
    }

    async fn upsert_status(&self, record: &MasteryStatusRecord) -> Result<(), MasteryError> {
        let mut tables = self.tables.lock().await;
        if tables.failing_upserts.contains(&record.standard_code) {
            return Err(MasteryError::Storage(format!(
                "write rejected for {}",
                record.standard_code
            )));
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let key = key(&record.class_name, &record.grade, &record.standard_code);
        tables.statuses.insert(key, record.clone());
        Ok(())
    }

    async fn delete_status(
        &self,
        selection: &Selection,
        standard_code: &str,
    ) -> Result<bool, MasteryError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock().await;
        let key = key(&selection.class_name, &selection.grade, standard_code);
        Ok(tables.statuses.remove(&key).is_some())
    }
}

#[async_trait]
impl ThresholdStore for MemoryStore {
    async fn load_thresholds(&self) -> Result<ThresholdBook, MasteryError> {
        let tables = self.tables.lock().await;
        ThresholdBook::from_document(&tables.thresholds)
    }

    async fn save_thresholds(&self, book: &ThresholdBook) -> Result<(), MasteryError> {
        self.tables.lock().await.thresholds = book.to_document();
        Ok(())
    }
}
