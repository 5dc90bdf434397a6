//! Selection-scoped mastery engine; results for a superseded selection are dropped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregate::aggregate;
use crate::blend::{blend, QuickCheckWeighting, Suggestions};
use crate::cache::KeyedCache;
use crate::cycle::{self, CycleWrite};
use crate::error::MasteryError;
use crate::intervention;
use crate::models::{
    AssessmentRecord, GradeEntry, InterventionStatus, MasteryLevel, MasteryStatusRecord,
    QuickCheckMark, Selection, Standard, StandardView, Status,
};
use crate::reconcile::{self, ReconcileSummary};
use crate::store::MasteryStore;
use crate::thresholds::{classify, ThresholdBook, ThresholdConfig};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub semester: String,
    pub actor: String,
    pub weighting: QuickCheckWeighting,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            semester: "fall".to_string(),
            actor: "mastery-engine".to_string(),
            weighting: QuickCheckWeighting::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Evidence {
    pub standards: Vec<Standard>,
    pub assessments: Vec<AssessmentRecord>,
    pub entries: Vec<GradeEntry>,
    pub quick_checks: Vec<QuickCheckMark>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionToken {
    selection: Selection,
    generation: u64,
}

impl SelectionToken {
    pub fn selection(&self) -> &Selection {
        &self.selection
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    evidence: Arc<Evidence>,
    suggestions: Suggestions,
    thresholds: ThresholdConfig,
    statuses: HashMap<String, MasteryStatusRecord>,
}

impl Snapshot {
    fn views(&self) -> Vec<StandardView> {
        build_views(
            &self.evidence.standards,
            &self.statuses,
            &self.suggestions,
            &self.thresholds,
        )
    }

    fn knows(&self, code: &str) -> bool {
        self.evidence.standards.iter().any(|s| s.code == code)
    }
}

#[derive(Default)]
struct Session {
    token: Option<SelectionToken>,
    generation: u64,
    snapshot: Option<Arc<Snapshot>>,
    reconciled: bool,
    pending: Vec<MasteryStatusRecord>,
}

impl Session {
    fn is_current(&self, token: &SelectionToken) -> bool {
        self.token.as_ref() == Some(token)
    }

    fn forget_pending(&mut self, selection: &Selection, code: &str) {
        self.pending.retain(|record| {
            !(record.class_name == selection.class_name
                && record.grade == selection.grade
                && record.standard_code == code)
        });
    }

    fn record_write(&mut self, selection: &Selection, code: &str, row: Option<&MasteryStatusRecord>) {
        let Some(token) = &self.token else {
            return;
        };
        if &token.selection != selection {
            return;
        }
        if let Some(snapshot) = self.snapshot.as_mut() {
            let snapshot = Arc::make_mut(snapshot);
            match row {
                Some(row) => {
                    snapshot.statuses.insert(code.to_string(), row.clone());
                }
                None => {
                    snapshot.statuses.remove(code);
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct ReconcileOutcome {
    pub summary: ReconcileSummary,
    pub written: usize,
    pub failed: Vec<(String, MasteryError)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOutcome {
    pub written: usize,
    pub still_pending: usize,
}

pub fn effective_status(
    persisted: Option<MasteryLevel>,
    pct: Option<f64>,
    thresholds: &ThresholdConfig,
) -> Status {
    match persisted {
        Some(level) => Status::Level(level),
        None => classify(pct, thresholds),
    }
}

pub fn build_views(
    standards: &[Standard],
    statuses: &HashMap<String, MasteryStatusRecord>,
    suggestions: &Suggestions,
    thresholds: &ThresholdConfig,
) -> Vec<StandardView> {
    standards
        .iter()
        .map(|standard| {
            let row = statuses.get(&standard.code);
            let pct = suggestions.get(&standard.code).copied();
            let effective = effective_status(row.map(|r| r.status), pct, thresholds);
            StandardView {
                code: standard.code.clone(),
                domain: standard.domain.clone(),
                cluster: standard.cluster.clone(),
                text: standard.text.clone(),
                effective_status: effective,
                computed_percentage: pct,
                intervention_status: intervention::visible(effective, row.map(|r| r.intervention)),
                has_manual_override: row.is_some(),
            }
        })
        .collect()
}

pub struct MasteryEngine<S: MasteryStore + ?Sized> {
    store: Arc<S>,
    config: EngineConfig,
    evidence: KeyedCache<Selection, Evidence>,
    session: RwLock<Session>,
}

impl<S: MasteryStore + ?Sized> MasteryEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            evidence: KeyedCache::default(),
            session: RwLock::new(Session::default()),
        }
    }

    /// Makes `selection` current. Re-selecting the current selection keeps
    /// its token, computed state and run-once flag.
    pub async fn select(&self, selection: Selection) -> SelectionToken {
        let mut session = self.session.write().await;
        if let Some(token) = &session.token {
            if token.selection == selection {
                return token.clone();
            }
        }

        session.generation += 1;
        let token = SelectionToken {
            selection,
            generation: session.generation,
        };
        debug!(selection = %token.selection, generation = token.generation, "selection changed");
        session.token = Some(token.clone());
        session.snapshot = None;
        session.reconciled = false;
        token
    }

    pub async fn open(
        &self,
        selection: Selection,
    ) -> Result<(Option<ReconcileOutcome>, Vec<StandardView>), MasteryError> {
        self.select(selection).await;
        self.refresh().await?;
        let outcome = self.reconcile().await?;
        let views = self.views().await?;
        Ok((outcome, views))
    }

    pub async fn refresh(&self) -> Result<Vec<StandardView>, MasteryError> {
        let token = self.current_token().await?;
        let snapshot = self.compute(&token).await?;

        let mut session = self.session.write().await;
        if !session.is_current(&token) {
            debug!(selection = %token.selection, "discarding stale recomputation");
            return Err(MasteryError::StaleSelection);
        }
        let views = snapshot.views();
        session.snapshot = Some(Arc::new(snapshot));
        Ok(views)
    }

    pub async fn views(&self) -> Result<Vec<StandardView>, MasteryError> {
        let token = self.current_token().await?;
        Ok(self.snapshot_for(&token).await?.views())
    }

    /// Writes fresh suggestions over persisted statuses, at most once per
    /// selection. Returns `None` when it already ran.
    pub async fn reconcile(&self) -> Result<Option<ReconcileOutcome>, MasteryError> {
        let token = self.current_token().await?;
        let snapshot = self.snapshot_for(&token).await?;

        {
            let mut session = self.session.write().await;
            if !session.is_current(&token) {
                return Err(MasteryError::StaleSelection);
            }
            if session.reconciled {
                debug!(selection = %token.selection, "reconciliation already ran");
                return Ok(None);
            }
            session.reconciled = true;
        }

        let plan = reconcile::plan(
            &token.selection,
            &snapshot.statuses,
            &snapshot.suggestions,
            &snapshot.thresholds,
            &self.config.actor,
            Utc::now(),
        );
        let summary = plan.summary;
        let report = reconcile::apply(self.store.as_ref(), plan.writes).await;

        let mut session = self.session.write().await;
        for record in &report.written {
            session.forget_pending(&token.selection, &record.standard_code);
        }
        for (record, err) in &report.failed {
            warn!(
                selection = %token.selection,
                standard = %record.standard_code,
                error = %err,
                "status write failed, queued for retry"
            );
            session.forget_pending(&token.selection, &record.standard_code);
            session.pending.push(record.clone());
        }
        if !session.is_current(&token) {
            debug!(selection = %token.selection, "discarding stale reconciliation");
            return Err(MasteryError::StaleSelection);
        }
        for record in &report.written {
            session.record_write(&token.selection, &record.standard_code, Some(record));
        }

        info!(
            selection = %token.selection,
            inserted = summary.inserted,
            overwritten = summary.overwritten,
            unchanged = summary.unchanged,
            sticky = summary.sticky,
            failed = report.failed.len(),
            "reconciled mastery statuses"
        );

        Ok(Some(ReconcileOutcome {
            summary,
            written: report.written.len(),
            failed: report
                .failed
                .into_iter()
                .map(|(record, err)| (record.standard_code, err))
                .collect(),
        }))
    }

    pub async fn pending_writes(&self) -> usize {
        self.session.read().await.pending.len()
    }

    /// Retries writes that failed during reconciliation. Each queued record is
    /// decided again against the row stored now, so a status that reached
    /// `above` in the meantime stays there.
    pub async fn retry_pending(&self) -> Result<RetryOutcome, MasteryError> {
        let pending = std::mem::take(&mut self.session.write().await.pending);
        if pending.is_empty() {
            return Ok(RetryOutcome {
                written: 0,
                still_pending: 0,
            });
        }

        let mut stored: HashMap<Selection, Option<HashMap<String, MasteryStatusRecord>>> =
            HashMap::new();
        let mut writes = Vec::new();
        let mut unread = Vec::new();
        for mut record in pending {
            let selection = Selection::new(record.class_name.clone(), record.grade.clone());
            if !stored.contains_key(&selection) {
                let rows = match self.store.statuses(&selection).await {
                    Ok(rows) => Some(
                        rows.into_iter()
                            .map(|row| (row.standard_code.clone(), row))
                            .collect(),
                    ),
                    Err(err) => {
                        warn!(%selection, error = %err, "could not re-read statuses for retry");
                        None
                    }
                };
                stored.insert(selection.clone(), rows);
            }
            let Some(rows) = stored.get(&selection).and_then(Option::as_ref) else {
                unread.push(record);
                continue;
            };

            let existing = rows.get(&record.standard_code);
            match reconcile::decide(existing.map(|row| row.status), Some(record.status)).write() {
                Some(_) => {
                    if let Some(row) = existing {
                        record.intervention = row.intervention;
                    }
                    writes.push(record);
                }
                None => {
                    debug!(%selection, standard = %record.standard_code, "queued write superseded");
                }
            }
        }

        let report = reconcile::apply(self.store.as_ref(), writes).await;

        let mut session = self.session.write().await;
        for record in &report.written {
            let selection = Selection::new(record.class_name.clone(), record.grade.clone());
            session.record_write(&selection, &record.standard_code, Some(record));
        }
        for (record, err) in report.failed {
            warn!(standard = %record.standard_code, error = %err, "retry failed");
            session.pending.push(record);
        }
        session.pending.extend(unread);

        Ok(RetryOutcome {
            written: report.written.len(),
            still_pending: session.pending.len(),
        })
    }

    pub async fn cycle(&self, code: &str, actor: &str) -> Result<Status, MasteryError> {
        let token = self.current_token().await?;
        let selection = &token.selection;
        let evidence = self.load_evidence(selection).await?;
        if !evidence.standards.iter().any(|s| s.code == code) {
            return Err(MasteryError::UnknownStandard(code.to_string()));
        }

        let existing = self.persisted(selection, code).await?;
        let current = Status::from(existing.as_ref().map(|row| row.status));

        let (next, row) = match cycle::step(current) {
            CycleWrite::Delete => {
                self.store.delete_status(selection, code).await?;
                (Status::NotStarted, None)
            }
            CycleWrite::Upsert(level) => {
                let row = MasteryStatusRecord {
                    class_name: selection.class_name.clone(),
                    grade: selection.grade.clone(),
                    standard_code: code.to_string(),
                    status: level,
                    intervention: existing
                        .as_ref()
                        .map(|row| row.intervention)
                        .unwrap_or_default(),
                    updated_by: actor.to_string(),
                    updated_at: Utc::now(),
                };
                self.store.upsert_status(&row).await?;
                (Status::Level(level), Some(row))
            }
        };

        let mut session = self.session.write().await;
        session.forget_pending(selection, code);
        session.record_write(selection, code, row.as_ref());
        info!(%selection, standard = code, from = %current, to = %next, by = actor, "status cycled");
        Ok(next)
    }

    /// Sets the intervention on a standard that is below or approaching.
    ///
    /// When the status comes only from evidence, the computed band is
    /// persisted along with the intervention, so the standard then reports a
    /// manual override.
    pub async fn set_intervention(
        &self,
        code: &str,
        status: InterventionStatus,
        actor: &str,
    ) -> Result<(), MasteryError> {
        let token = self.current_token().await?;
        let selection = &token.selection;
        let snapshot = self.snapshot_for(&token).await?;
        if !snapshot.knows(code) {
            return Err(MasteryError::UnknownStandard(code.to_string()));
        }

        let existing = self.persisted(selection, code).await?;
        let effective = effective_status(
            existing.as_ref().map(|row| row.status),
            snapshot.suggestions.get(code).copied(),
            &snapshot.thresholds,
        );
        intervention::check_editable(code, effective)?;
        let level = effective
            .level()
            .ok_or_else(|| MasteryError::InterventionLocked {
                code: code.to_string(),
                status: effective,
            })?;

        let row = MasteryStatusRecord {
            class_name: selection.class_name.clone(),
            grade: selection.grade.clone(),
            standard_code: code.to_string(),
            status: level,
            intervention: status,
            updated_by: actor.to_string(),
            updated_at: Utc::now(),
        };
        self.store.upsert_status(&row).await?;

        let mut session = self.session.write().await;
        session.forget_pending(selection, code);
        session.record_write(selection, code, Some(&row));
        info!(%selection, standard = code, intervention = %status, by = actor, "intervention updated");
        Ok(())
    }

    pub async fn record_quick_check(&self, mark: QuickCheckMark) -> Result<(), MasteryError> {
        self.store.append_quick_check(&mark).await?;
        let selection = Selection::new(mark.class_name.clone(), mark.grade.clone());
        self.evidence.invalidate(&selection).await;
        self.invalidate_snapshot(|current| current == &selection).await;
        debug!(%selection, standard = %mark.standard_code, mark = mark.mark.as_str(), "quick check recorded");
        Ok(())
    }

    pub async fn thresholds(&self) -> Result<ThresholdBook, MasteryError> {
        self.store.load_thresholds().await
    }

    pub async fn set_thresholds(
        &self,
        class_name: &str,
        cfg: ThresholdConfig,
    ) -> Result<(), MasteryError> {
        let mut book = self.store.load_thresholds().await?;
        book.set(class_name, cfg)?;
        self.store.save_thresholds(&book).await?;
        self.invalidate_snapshot(|current| current.class_name == class_name)
            .await;
        info!(class = class_name, above = cfg.above, on = cfg.on, approaching = cfg.approaching, "thresholds saved");
        Ok(())
    }

    async fn current_token(&self) -> Result<SelectionToken, MasteryError> {
        self.session
            .read()
            .await
            .token
            .clone()
            .ok_or(MasteryError::NoSelection)
    }

    async fn invalidate_snapshot(&self, matches: impl Fn(&Selection) -> bool) {
        let mut session = self.session.write().await;
        if session.token.as_ref().is_some_and(|t| matches(&t.selection)) {
            session.snapshot = None;
        }
    }

    async fn snapshot_for(&self, token: &SelectionToken) -> Result<Arc<Snapshot>, MasteryError> {
        {
            let session = self.session.read().await;
            if !session.is_current(token) {
                return Err(MasteryError::StaleSelection);
            }
            if let Some(snapshot) = &session.snapshot {
                return Ok(Arc::clone(snapshot));
            }
        }

        let snapshot = Arc::new(self.compute(token).await?);
        let mut session = self.session.write().await;
        if !session.is_current(token) {
            return Err(MasteryError::StaleSelection);
        }
        session.snapshot = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    async fn compute(&self, token: &SelectionToken) -> Result<Snapshot, MasteryError> {
        let selection = &token.selection;
        let evidence = self.load_evidence(selection).await?;
        let thresholds = self
            .store
            .load_thresholds()
            .await?
            .for_class(&selection.class_name);
        let statuses = self
            .store
            .statuses(selection)
            .await?
            .into_iter()
            .map(|row| (row.standard_code.clone(), row))
            .collect();

        let totals = aggregate(&evidence.assessments, &evidence.entries);
        let suggestions = blend(totals, &evidence.quick_checks, self.config.weighting);
        debug!(%selection, suggested = suggestions.len(), "suggestions computed");

        Ok(Snapshot {
            evidence,
            suggestions,
            thresholds,
            statuses,
        })
    }

    async fn load_evidence(&self, selection: &Selection) -> Result<Arc<Evidence>, MasteryError> {
        self.evidence
            .get_or_load(selection, || async {
                let standards = self.store.standards_for_grade(&selection.grade).await?;
                let assessments = self
                    .store
                    .assessments(selection, &self.config.semester)
                    .await?;
                let ids: Vec<Uuid> = assessments.iter().map(|a| a.id).collect();
                let entries = if ids.is_empty() {
                    Vec::new()
                } else {
                    self.store.grade_entries(&ids).await?
                };
                let quick_checks = self.store.quick_checks(selection, None).await?;
                Ok::<_, MasteryError>(Evidence {
                    standards,
                    assessments,
                    entries,
                    quick_checks,
                })
            })
            .await
    }

    async fn persisted(
        &self,
        selection: &Selection,
        code: &str,
    ) -> Result<Option<MasteryStatusRecord>, MasteryError> {
        Ok(self
            .store
            .statuses(selection)
            .await?
            .into_iter()
            .find(|row| row.standard_code == code))
    }
}
