use std::collections::{BTreeMap, HashMap};

use crate::aggregate::Accumulator;
use crate::models::QuickCheckMark;

/// Weight of quick-check evidence relative to one assessment sample.
pub const QUICK_CHECK_WEIGHT: f64 = 0.5;

/// Blended percentage per standard code. Standards with no evidence are absent.
pub type Suggestions = BTreeMap<String, f64>;

/// How much total weight a standard's quick checks carry in the blend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuickCheckWeighting {
    /// Every mark adds half a sample.
    #[default]
    PerMark,
    /// All marks for a standard collapse into one half-weight sample.
    PerStandard,
}

impl QuickCheckWeighting {
    fn weight(self, marks: usize) -> f64 {
        match self {
            QuickCheckWeighting::PerMark => QUICK_CHECK_WEIGHT * marks as f64,
            QuickCheckWeighting::PerStandard => QUICK_CHECK_WEIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuickCheckSummary {
    pub average: f64,
    pub marks: usize,
}

pub fn summarize_marks(marks: &[QuickCheckMark]) -> HashMap<String, QuickCheckSummary> {
    let mut totals: HashMap<String, (f64, usize)> = HashMap::new();
    for mark in marks {
        let entry = totals.entry(mark.standard_code.clone()).or_insert((0.0, 0));
        entry.0 += mark.mark.score();
        entry.1 += 1;
    }

    totals
        .into_iter()
        .map(|(code, (sum, marks))| {
            (
                code,
                QuickCheckSummary {
                    average: sum / marks as f64,
                    marks,
                },
            )
        })
        .collect()
}

/// Folds quick-check averages into assessment totals and finalises each
/// standard's percentage, rounded to one decimal and kept within 0..=100.
pub fn blend(
    mut totals: HashMap<String, Accumulator>,
    marks: &[QuickCheckMark],
    weighting: QuickCheckWeighting,
) -> Suggestions {
    for (code, summary) in summarize_marks(marks) {
        totals
            .entry(code)
            .or_default()
            .add(summary.average, weighting.weight(summary.marks));
    }

    totals
        .into_iter()
        .filter_map(|(code, acc)| {
            acc.mean()
                .map(|mean| (code, round_tenth(mean.clamp(0.0, 100.0))))
        })
        .collect()
}

pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
