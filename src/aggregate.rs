use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use crate::models::{AssessmentRecord, EntryScores, GradeEntry, StandardTags};

/// Running evidence total for one standard.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    pub sum_pct: f64,
    pub count: f64,
}

impl Accumulator {
    pub fn add(&mut self, pct: f64, weight: f64) {
        self.sum_pct += pct * weight;
        self.count += weight;
    }

    /// Weighted mean, or `None` when nothing has been added.
    pub fn mean(&self) -> Option<f64> {
        if self.count > 0.0 {
            Some(self.sum_pct / self.count)
        } else {
            None
        }
    }
}

/// How an assessment's scores turn into samples for its standards.
///
/// Section-tagged standards get one sample per student who answered the
/// section. Whole-assessment standards get a single sample holding the class
/// average, however many students took it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRule {
    PerStudent,
    ClassAverage,
}

pub fn sample_rule(tags: &StandardTags) -> SampleRule {
    match tags {
        StandardTags::Sections(_) => SampleRule::PerStudent,
        StandardTags::Whole { .. } => SampleRule::ClassAverage,
    }
}

/// Score as a percentage of `max`; a zero or missing denominator yields 0.
pub fn percent(score: f64, max: Option<f64>) -> f64 {
    match max {
        Some(max) if max > 0.0 => score / max * 100.0,
        _ => 0.0,
    }
}

pub fn aggregate(
    assessments: &[AssessmentRecord],
    entries: &[GradeEntry],
) -> HashMap<String, Accumulator> {
    let mut by_assessment: HashMap<Uuid, Vec<&GradeEntry>> = HashMap::new();
    for entry in entries {
        by_assessment
            .entry(entry.assessment_id)
            .or_default()
            .push(entry);
    }

    let mut totals: HashMap<String, Accumulator> = HashMap::new();
    for assessment in assessments {
        let entries = by_assessment
            .get(&assessment.id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        match sample_rule(&assessment.tags) {
            SampleRule::PerStudent => add_section_samples(&mut totals, assessment, entries),
            SampleRule::ClassAverage => add_class_sample(&mut totals, assessment, entries),
        }
    }

    totals
}

fn add_section_samples(
    totals: &mut HashMap<String, Accumulator>,
    assessment: &AssessmentRecord,
    entries: &[&GradeEntry],
) {
    let StandardTags::Sections(sections) = &assessment.tags else {
        return;
    };

    for (index, section) in sections.iter().enumerate() {
        let Some(code) = section
            .standard_code
            .as_deref()
            .filter(|code| !code.is_empty())
        else {
            continue;
        };

        for entry in entries {
            let EntryScores::Sections(scores) = &entry.scores else {
                continue;
            };
            if let Some(Some(score)) = scores.get(&index) {
                let pct = percent(*score, Some(section.max_points));
                totals.entry(code.to_string()).or_default().add(pct, 1.0);
            }
        }
    }
}

fn add_class_sample(
    totals: &mut HashMap<String, Accumulator>,
    assessment: &AssessmentRecord,
    entries: &[&GradeEntry],
) {
    let StandardTags::Whole { codes, max_score } = &assessment.tags else {
        return;
    };

    let scored: Vec<f64> = entries
        .iter()
        .filter_map(|entry| match entry.scores {
            EntryScores::Whole(Some(score)) => Some(percent(score, *max_score)),
            _ => None,
        })
        .collect();

    if scored.is_empty() {
        return;
    }

    let avg_pct = scored.iter().sum::<f64>() / scored.len() as f64;
    let unique: BTreeSet<&str> = codes
        .iter()
        .map(String::as_str)
        .filter(|code| !code.is_empty())
        .collect();
    for code in unique {
        totals.entry(code.to_string()).or_default().add(avg_pct, 1.0);
    }
}
