use curriculum_core::model::SemesterLabel;
use serde::Serialize;

use super::status::ProgressSnapshot;

/// Completion figures of one semester.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemesterSummary {
    pub semester: SemesterLabel,
    pub completed_count: usize,
    pub total_count: usize,
    /// `completed_count / total_count * 100`, 0 for an empty semester.
    pub completion_pct: f64,
    pub is_complete: bool,
    /// Every earlier semester is complete.
    pub is_accessible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardTotals {
    pub completed_modules: usize,
    /// Modules the learner can open right now, including synthesized unlocks.
    pub unlocked_modules: usize,
    pub total_modules: usize,
    pub completion_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub semesters: Vec<SemesterSummary>,
    /// First semester that is not complete, or the last one once all are.
    pub current_semester: Option<SemesterLabel>,
    pub totals: DashboardTotals,
}

#[allow(clippy::cast_precision_loss)]
fn completion_pct(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    completed as f64 / total as f64 * 100.0
}

pub(crate) fn summarize(snapshot: &ProgressSnapshot<'_>) -> DashboardSummary {
    let catalog = snapshot.catalog();
    let mut semesters = Vec::with_capacity(catalog.semesters().len());
    let mut earlier_complete = true;

    for label in catalog.semesters() {
        let (completed_count, total_count) = snapshot.semester_counts(label);
        let is_complete = snapshot.is_semester_complete(label);
        semesters.push(SemesterSummary {
            semester: label.clone(),
            completed_count,
            total_count,
            completion_pct: completion_pct(completed_count, total_count),
            is_complete,
            is_accessible: earlier_complete,
        });
        earlier_complete &= is_complete;
    }

    let current_semester = semesters
        .iter()
        .find(|s| !s.is_complete)
        .or_else(|| semesters.last())
        .map(|s| s.semester.clone());

    let total_modules = catalog.modules().len();
    let completed_modules = semesters.iter().map(|s| s.completed_count).sum();
    let unlocked_modules = catalog
        .modules()
        .iter()
        .filter(|m| snapshot.is_unlocked(m))
        .count();

    DashboardSummary {
        semesters,
        current_semester,
        totals: DashboardTotals {
            completed_modules,
            unlocked_modules,
            total_modules,
            completion_pct: completion_pct(completed_modules, total_modules),
        },
    }
}
