use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::MasteryError;
use crate::models::{
    AssessmentRecord, EntryScores, GradeEntry, Mark, MasteryStatusRecord, QuickCheckMark,
    SectionTag, Selection, Standard, StandardTags,
};
use crate::store::{AssessmentStore, QuickCheckStore, StandardsSource, StatusStore, ThresholdStore};
use crate::thresholds::{ThresholdBook, ThresholdConfig};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let standards = vec![
        (
            "RL.3.1",
            "Reading: Literature",
            "Key Ideas and Details",
            "Ask and answer questions to demonstrate understanding of a text.",
        ),
        (
            "RL.3.2",
            "Reading: Literature",
            "Key Ideas and Details",
            "Recount stories and determine the central message or moral.",
        ),
        (
            "RL.3.3",
            "Reading: Literature",
            "Key Ideas and Details",
            "Describe characters and explain how their actions shape events.",
        ),
        (
            "RI.3.1",
            "Reading: Informational Text",
            "Key Ideas and Details",
            "Ask and answer questions, referring explicitly to the text.",
        ),
        (
            "RF.3.3",
            "Reading: Foundational Skills",
            "Phonics and Word Recognition",
            "Know and apply grade-level phonics and word analysis skills.",
        ),
    ];

    for (code, domain, cluster, text) in standards {
        sqlx::query(
            r#"
            INSERT INTO standards_mastery.standards (code, domain, grade, cluster, description)
            VALUES ($1, $2, '3', $3, $4)
            ON CONFLICT (code) DO UPDATE
            SET domain = EXCLUDED.domain, cluster = EXCLUDED.cluster,
                description = EXCLUDED.description
            "#,
        )
        .bind(code)
        .bind(domain)
        .bind(cluster)
        .bind(text)
        .execute(pool)
        .await?;
    }

    let quiz_id = Uuid::parse_str("6b1f0a52-8d54-4f3e-9a5e-0f2b7c1d9e11")?;
    let sections = serde_json::to_string(&vec![
        SectionTag {
            standard_code: Some("RL.3.1".to_string()),
            max_points: 25.0,
        },
        SectionTag {
            standard_code: Some("RL.3.2".to_string()),
            max_points: 20.0,
        },
        SectionTag {
            standard_code: None,
            max_points: 5.0,
        },
    ])?;
    sqlx::query(
        r#"
        INSERT INTO standards_mastery.assessments
        (id, class_name, grade, semester, title, tag_mode, sections)
        VALUES ($1, 'Lily', '3', 'fall', 'Story Elements Check', 'sections', $2::jsonb)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(quiz_id)
    .bind(sections)
    .execute(pool)
    .await?;

    let benchmark_id = Uuid::parse_str("c4e9d8b7-3a21-4c0f-8f4d-52a6e1b0c733")?;
    sqlx::query(
        r#"
        INSERT INTO standards_mastery.assessments
        (id, class_name, grade, semester, title, tag_mode, whole_standards, max_score)
        VALUES ($1, 'Lily', '3', 'fall', 'Unit 1 Benchmark', 'whole', $2, 40)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(benchmark_id)
    .bind(vec!["RL.3.3".to_string(), "RI.3.1".to_string()])
    .execute(pool)
    .await?;

    let quiz_scores = vec![
        ("lily-01", r#"{"0": 20, "1": 11, "2": 5}"#),
        ("lily-02", r#"{"0": 19, "1": 9, "2": 4}"#),
    ];
    for (student, scores) in quiz_scores {
        sqlx::query(
            r#"
            INSERT INTO standards_mastery.grade_entries
            (id, assessment_id, student_id, section_scores)
            VALUES ($1, $2, $3, $4::jsonb)
            ON CONFLICT (assessment_id, student_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(quiz_id)
        .bind(student)
        .bind(scores)
        .execute(pool)
        .await?;
    }

    for (student, score) in [("lily-01", 31.0_f64), ("lily-02", 27.5), ("lily-03", 35.0)] {
        sqlx::query(
            r#"
            INSERT INTO standards_mastery.grade_entries
            (id, assessment_id, student_id, score)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (assessment_id, student_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(benchmark_id)
        .bind(student)
        .bind(score)
        .execute(pool)
        .await?;
    }

    let checks = vec![
        ("seed-qc-001", "lily-01", "RL.3.1", Mark::GotIt),
        ("seed-qc-002", "lily-01", "RF.3.3", Mark::GotIt),
        ("seed-qc-003", "lily-02", "RF.3.3", Mark::GotIt),
        ("seed-qc-004", "lily-03", "RF.3.3", Mark::NotYet),
    ];
    let recorded_at = Utc
        .with_ymd_and_hms(2026, 9, 14, 15, 30, 0)
        .single()
        .context("invalid seed timestamp")?;
    for (source_key, student, code, mark) in checks {
        sqlx::query(
            r#"
            INSERT INTO standards_mastery.quick_checks
            (id, student_id, standard_code, class_name, grade, mark, recorded_at, source_key)
            VALUES ($1, $2, $3, 'Lily', '3', $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student)
        .bind(code)
        .bind(mark.as_str())
        .bind(recorded_at)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let store = PgStore::new(pool.clone());
    let mut book = store.load_thresholds().await?;
    book.set("Lily", ThresholdConfig::default())?;
    store.save_thresholds(&book).await?;

    Ok(())
}

pub async fn import_quick_checks(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: String,
        standard_code: String,
        class_name: String,
        grade: String,
        mark: Mark,
        recorded_at: Option<DateTime<Utc>>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO standards_mastery.quick_checks
            (id, student_id, standard_code, class_name, grade, mark, recorded_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.student_id)
        .bind(&row.standard_code)
        .bind(&row.class_name)
        .bind(&row.grade)
        .bind(row.mark.as_str())
        .bind(row.recorded_at.unwrap_or_else(Utc::now))
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Postgres-backed implementation of every storage seam.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StandardsSource for PgStore {
    async fn standards_for_grade(&self, grade: &str) -> Result<Vec<Standard>, MasteryError> {
        let rows = sqlx::query(
            "SELECT code, domain, grade, cluster, description \
             FROM standards_mastery.standards WHERE grade = $1 ORDER BY code",
        )
        .bind(grade)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Standard {
                code: row.get("code"),
                domain: row.get("domain"),
                grade: row.get("grade"),
                cluster: row.get("cluster"),
                text: row.get("description"),
            })
            .collect())
    }
}

#[async_trait]
impl AssessmentStore for PgStore {
    async fn assessments(
        &self,
        selection: &Selection,
        semester: &str,
    ) -> Result<Vec<AssessmentRecord>, MasteryError> {
        let rows = sqlx::query(
            "SELECT id, class_name, grade, semester, title, tag_mode, \
             sections::text AS sections, whole_standards, max_score \
             FROM standards_mastery.assessments \
             WHERE class_name = $1 AND grade = $2 AND semester = $3 \
             ORDER BY created_at",
        )
        .bind(&selection.class_name)
        .bind(&selection.grade)
        .bind(semester)
        .fetch_all(&self.pool)
        .await?;

        let mut assessments = Vec::with_capacity(rows.len());
        for row in rows {
            let tag_mode: String = row.get("tag_mode");
            let tags = match tag_mode.as_str() {
                "sections" => {
                    let sections: String = row.get("sections");
                    StandardTags::Sections(serde_json::from_str(&sections)?)
                }
                "whole" => StandardTags::Whole {
                    codes: row.get("whole_standards"),
                    max_score: row.get("max_score"),
                },
                other => {
                    return Err(MasteryError::Malformed(format!(
                        "unknown tag mode `{other}`"
                    )))
                }
            };

            assessments.push(AssessmentRecord {
                id: row.get("id"),
                class_name: row.get("class_name"),
                grade: row.get("grade"),
                semester: row.get("semester"),
                title: row.get("title"),
                tags,
            });
        }

        Ok(assessments)
    }

    async fn grade_entries(&self, assessment_ids: &[Uuid]) -> Result<Vec<GradeEntry>, MasteryError> {
        let rows = sqlx::query(
            "SELECT assessment_id, student_id, score, section_scores::text AS section_scores \
             FROM standards_mastery.grade_entries WHERE assessment_id = ANY($1)",
        )
        .bind(assessment_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let section_scores: Option<String> = row.get("section_scores");
            let scores = match section_scores {
                Some(raw) => {
                    let parsed: BTreeMap<usize, Option<f64>> = serde_json::from_str(&raw)?;
                    EntryScores::Sections(parsed)
                }
                None => EntryScores::Whole(row.get("score")),
            };
            entries.push(GradeEntry {
                assessment_id: row.get("assessment_id"),
                student_id: row.get("student_id"),
                scores,
            });
        }

        Ok(entries)
    }
}

#[async_trait]
impl QuickCheckStore for PgStore {
    async fn append_quick_check(&self, mark: &QuickCheckMark) -> Result<(), MasteryError> {
        sqlx::query(
            r#"
            INSERT INTO standards_mastery.quick_checks
            (id, student_id, standard_code, class_name, grade, mark, recorded_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(mark.id)
        .bind(&mark.student_id)
        .bind(&mark.standard_code)
        .bind(&mark.class_name)
        .bind(&mark.grade)
        .bind(mark.mark.as_str())
        .bind(mark.recorded_at)
        .bind(format!("app-{}", mark.id))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn quick_checks(
        &self,
        selection: &Selection,
        standard_code: Option<&str>,
    ) -> Result<Vec<QuickCheckMark>, MasteryError> {
        let mut query = String::from(
            "SELECT id, student_id, standard_code, class_name, grade, mark, recorded_at \
             FROM standards_mastery.quick_checks \
             WHERE class_name = $1 AND grade = $2",
        );
        if standard_code.is_some() {
            query.push_str(" AND standard_code = $3");
        }
        query.push_str(" ORDER BY recorded_at");

        let mut rows = sqlx::query(&query)
            .bind(&selection.class_name)
            .bind(&selection.grade);
        if let Some(code) = standard_code {
            rows = rows.bind(code);
        }

        let records = rows.fetch_all(&self.pool).await?;
        let mut marks = Vec::with_capacity(records.len());
        for row in records {
            let mark: String = row.get("mark");
            marks.push(QuickCheckMark {
                id: row.get("id"),
                student_id: row.get("student_id"),
                standard_code: row.get("standard_code"),
                class_name: row.get("class_name"),
                grade: row.get("grade"),
                mark: mark.parse()?,
                recorded_at: row.get("recorded_at"),
            });
        }

        Ok(marks)
    }
}

#[async_trait]
impl StatusStore for PgStore {
    async fn statuses(&self, selection: &Selection) -> Result<Vec<MasteryStatusRecord>, MasteryError> {
        let rows = sqlx::query(
            "SELECT class_name, grade, standard_code, status, intervention_status, \
             updated_by, updated_at \
             FROM standards_mastery.mastery_statuses \
             WHERE class_name = $1 AND grade = $2",
        )
        .bind(&selection.class_name)
        .bind(&selection.grade)
        .fetch_all(&self.pool)
        .await?;

        let mut statuses = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.get("status");
            let intervention: String = row.get("intervention_status");
            statuses.push(MasteryStatusRecord {
                class_name: row.get("class_name"),
                grade: row.get("grade"),
                standard_code: row.get("standard_code"),
                status: status.parse()?,
                intervention: intervention.parse()?,
                updated_by: row.get("updated_by"),
                updated_at: row.get("updated_at"),
            });
        }

        Ok(statuses)
    }

    async fn upsert_status(&self, record: &MasteryStatusRecord) -> Result<(), MasteryError> {
        sqlx::query(
            r#"
            INSERT INTO standards_mastery.mastery_statuses
            (class_name, grade, standard_code, status, intervention_status, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (class_name, grade, standard_code) DO UPDATE
            SET status = EXCLUDED.status,
                intervention_status = EXCLUDED.intervention_status,
                updated_by = EXCLUDED.updated_by,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.class_name)
        .bind(&record.grade)
        .bind(&record.standard_code)
        .bind(record.status.as_str())
        .bind(record.intervention.as_str())
        .bind(&record.updated_by)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_status(
        &self,
        selection: &Selection,
        standard_code: &str,
    ) -> Result<bool, MasteryError> {
        let result = sqlx::query(
            "DELETE FROM standards_mastery.mastery_statuses \
             WHERE class_name = $1 AND grade = $2 AND standard_code = $3",
        )
        .bind(&selection.class_name)
        .bind(&selection.grade)
        .bind(standard_code)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ThresholdStore for PgStore {
    async fn load_thresholds(&self) -> Result<ThresholdBook, MasteryError> {
        let row = sqlx::query(
            "SELECT config::text AS config FROM standards_mastery.threshold_settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("config");
                ThresholdBook::from_document(&serde_json::from_str(&raw)?)
            }
            None => Ok(ThresholdBook::default()),
        }
    }

    async fn save_thresholds(&self, book: &ThresholdBook) -> Result<(), MasteryError> {
        sqlx::query(
            r#"
            INSERT INTO standards_mastery.threshold_settings (id, config, updated_at)
            VALUES (1, $1::jsonb, now())
            ON CONFLICT (id) DO UPDATE
            SET config = EXCLUDED.config, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(book.to_document().to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
