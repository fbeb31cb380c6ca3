//! Per-user module unlocking, completion, and semester cascades.

mod dashboard;
mod service;
mod status;

use curriculum_core::model::SemesterLabel;
use serde::{Deserialize, Serialize};

pub use dashboard::{DashboardSummary, DashboardTotals, SemesterSummary};
pub use service::ProgressionService;
pub use status::ModuleStatus;

/// Administrator-tunable progression rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionPolicy {
    /// Treat a semester without modules as complete. Off by default, so a
    /// misconfigured empty semester blocks the cascade instead of skipping it.
    #[serde(default)]
    pub empty_semester_completes: bool,
}

/// Result of trying to open the semester after a given one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeOutcome {
    pub unlocked: bool,
    pub next_semester: Option<SemesterLabel>,
}

impl CascadeOutcome {
    pub(crate) fn blocked() -> Self {
        Self {
            unlocked: false,
            next_semester: None,
        }
    }
}
