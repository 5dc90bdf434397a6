use std::fmt::Write;

use crate::intervention;
use crate::models::{MasteryLevel, Selection, StandardView, Status};
use crate::thresholds::ThresholdConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusMix {
    pub not_started: usize,
    pub below: usize,
    pub approaching: usize,
    pub on: usize,
    pub above: usize,
}

pub fn summarize_statuses(views: &[StandardView]) -> StatusMix {
    let mut mix = StatusMix::default();
    for view in views {
        match view.effective_status {
            Status::NotStarted => mix.not_started += 1,
            Status::Level(MasteryLevel::Below) => mix.below += 1,
            Status::Level(MasteryLevel::Approaching) => mix.approaching += 1,
            Status::Level(MasteryLevel::On) => mix.on += 1,
            Status::Level(MasteryLevel::Above) => mix.above += 1,
        }
    }
    mix
}

pub fn format_percentage(pct: Option<f64>) -> String {
    pct.map(|pct| format!("{pct:.1}%"))
        .unwrap_or_else(|| "no evidence".to_string())
}

pub fn build_report(
    selection: &Selection,
    semester: &str,
    thresholds: &ThresholdConfig,
    views: &[StandardView],
) -> String {
    let mix = summarize_statuses(views);
    let mut output = String::new();

    let _ = writeln!(output, "# Standards Mastery Report");
    let _ = writeln!(output, "Generated for {} ({} semester)", selection, semester);
    let _ = writeln!(
        output,
        "Cutoffs: above {:.0}, on {:.0}, approaching {:.0}",
        thresholds.above, thresholds.on, thresholds.approaching
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");

    if views.is_empty() {
        let _ = writeln!(output, "No standards defined for this grade.");
    } else {
        let _ = writeln!(output, "- above: {}", mix.above);
        let _ = writeln!(output, "- on: {}", mix.on);
        let _ = writeln!(output, "- approaching: {}", mix.approaching);
        let _ = writeln!(output, "- below: {}", mix.below);
        let _ = writeln!(output, "- not started: {}", mix.not_started);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Standards");

    for view in views {
        let marker = if view.has_manual_override { " (set)" } else { "" };
        let _ = writeln!(
            output,
            "- {} {}{}: {} [{}]",
            view.code,
            view.effective_status,
            marker,
            format_percentage(view.computed_percentage),
            view.domain
        );
    }

    let active: Vec<&StandardView> = views
        .iter()
        .filter(|v| v.intervention_status.is_some_and(intervention::is_active))
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Active Interventions");

    if active.is_empty() {
        let _ = writeln!(output, "No interventions in progress.");
    } else {
        for view in active {
            if let Some(status) = view.intervention_status {
                let _ = writeln!(
                    output,
                    "- {} ({}): {}",
                    view.code, view.effective_status, status
                );
            }
        }
    }

    output
}
