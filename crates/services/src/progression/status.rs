use std::collections::HashMap;

use curriculum_core::model::{Catalog, Module, ModuleId, Percentage, SemesterLabel, UserProgress};
use serde::Serialize;

use super::ProgressionPolicy;

/// Effective state of one module for one user, as shown to the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleStatus {
    pub module_id: ModuleId,
    pub semester: SemesterLabel,
    pub order: u32,
    pub title: String,
    pub is_unlocked: bool,
    pub percentage: Percentage,
    pub is_completed: bool,
}

/// One user's stored progress, indexed by module, evaluated against a catalog.
///
/// Every read-side rule lives here so the status list and the dashboard can
/// never disagree.
pub(crate) struct ProgressSnapshot<'a> {
    catalog: &'a Catalog,
    policy: ProgressionPolicy,
    records: HashMap<ModuleId, UserProgress>,
}

impl<'a> ProgressSnapshot<'a> {
    pub(crate) fn new(
        catalog: &'a Catalog,
        policy: ProgressionPolicy,
        records: impl IntoIterator<Item = UserProgress>,
    ) -> Self {
        Self {
            catalog,
            policy,
            records: records
                .into_iter()
                .map(|p| (p.module_id(), p))
                .collect(),
        }
    }

    pub(crate) fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    pub(crate) fn record(&self, module_id: ModuleId) -> Option<&UserProgress> {
        self.records.get(&module_id)
    }

    pub(crate) fn is_completed(&self, module_id: ModuleId) -> bool {
        self.record(module_id)
            .is_some_and(UserProgress::is_module_completed)
    }

    /// `(completed, total)` module counts of one semester.
    pub(crate) fn semester_counts(&self, semester: &SemesterLabel) -> (usize, usize) {
        self.catalog
            .modules_in(semester)
            .fold((0, 0), |(done, total), m| {
                (done + usize::from(self.is_completed(m.id())), total + 1)
            })
    }

    pub(crate) fn is_semester_complete(&self, semester: &SemesterLabel) -> bool {
        let (done, total) = self.semester_counts(semester);
        if total == 0 {
            return self.policy.empty_semester_completes;
        }
        done == total
    }

    /// Whether completing `semester` lets the learner into the one after it.
    ///
    /// An empty semester only counts as complete under the lenient policy,
    /// and then only once the learner has reached it.
    pub(crate) fn opens_next(&self, semester: &SemesterLabel) -> bool {
        if !self.is_semester_complete(semester) {
            return false;
        }
        let (_, total) = self.semester_counts(semester);
        total > 0 || self.is_reached(semester)
    }

    /// The learner may enter `semester` without a stored unlock.
    pub(crate) fn is_reached(&self, semester: &SemesterLabel) -> bool {
        if self.catalog.is_first_semester(semester) {
            return true;
        }
        self.catalog
            .previous_semester(semester)
            .is_some_and(|prev| self.opens_next(prev))
    }

    /// First semester: always open. Otherwise the stored flag wins, and
    /// without a record the module is open once its semester is reached.
    pub(crate) fn is_unlocked(&self, module: &Module) -> bool {
        if self.catalog.is_first_semester(module.semester()) {
            return true;
        }
        if let Some(record) = self.record(module.id()) {
            return record.is_module_unlocked();
        }
        self.is_reached(module.semester())
    }

    pub(crate) fn status(&self, module: &Module) -> ModuleStatus {
        let record = self.record(module.id());
        ModuleStatus {
            module_id: module.id(),
            semester: module.semester().clone(),
            order: module.order(),
            title: module.title().to_owned(),
            is_unlocked: self.is_unlocked(module),
            percentage: record.map_or(Percentage::ZERO, UserProgress::progress_percentage),
            is_completed: record.is_some_and(UserProgress::is_module_completed),
        }
    }

    pub(crate) fn statuses(&self) -> Vec<ModuleStatus> {
        self.catalog.modules().iter().map(|m| self.status(m)).collect()
    }
}
