use std::sync::Arc;

use curriculum_core::model::{
    Catalog, Identity, Module, ModuleId, Percentage, ProgressMutation, SemesterLabel, UserProgress,
};
use storage::repository::{AppliedMutation, ProgressRepository};
use tracing::{debug, info};

use super::dashboard::{self, DashboardSummary};
use super::status::{ModuleStatus, ProgressSnapshot};
use super::{CascadeOutcome, ProgressionPolicy};
use crate::Clock;
use crate::error::ProgressionError;
use crate::retry;

/// The progression engine.
///
/// Holds no per-user state: every call reads from and writes through the
/// progress store, which serializes writes per `(user, module)` key.
#[derive(Clone)]
pub struct ProgressionService {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
    policy: ProgressionPolicy,
}

impl ProgressionService {
    #[must_use]
    pub fn new(clock: Clock, progress: Arc<dyn ProgressRepository>) -> Self {
        Self {
            clock,
            progress,
            policy: ProgressionPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ProgressionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn policy(&self) -> ProgressionPolicy {
        self.policy
    }

    //
    // ─── READS ─────────────────────────────────────────────────────────────────
    //

    /// Effective unlock status of every module, in catalog order.
    ///
    /// Read-only: modules without a record are reported, never persisted.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::StoreUnavailable` if progress cannot be read.
    #[tracing::instrument(skip_all, fields(user_id = identity.user_id().value()))]
    pub async fn module_statuses(
        &self,
        identity: &Identity,
        catalog: &Catalog,
    ) -> Result<Vec<ModuleStatus>, ProgressionError> {
        let snapshot = self.snapshot(identity, catalog).await?;
        Ok(snapshot.statuses())
    }

    /// True iff the semester has modules and every one of them has a
    /// completed record. An empty semester follows the policy.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::SemesterNotFound` for a label outside the catalog.
    /// Returns `ProgressionError::StoreUnavailable` if progress cannot be read.
    pub async fn is_semester_complete(
        &self,
        identity: &Identity,
        catalog: &Catalog,
        semester: &SemesterLabel,
    ) -> Result<bool, ProgressionError> {
        require_semester(catalog, semester)?;
        let module_ids = catalog.module_ids_in(semester);
        if module_ids.is_empty() {
            return Ok(self.policy.empty_semester_completes);
        }

        let records = self
            .progress
            .list_progress_for_modules(identity.user_id(), &module_ids)
            .await?;
        let completed = records
            .iter()
            .filter(|p| p.is_module_completed())
            .count();
        Ok(completed == module_ids.len())
    }

    /// Stored record of one module.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::ModuleNotFound` for an unknown module and
    /// `ProgressionError::ProgressNotFound` when the user never touched it.
    pub async fn module_progress(
        &self,
        identity: &Identity,
        catalog: &Catalog,
        module_id: ModuleId,
    ) -> Result<UserProgress, ProgressionError> {
        require_module(catalog, module_id)?;
        self.progress
            .get_progress(identity.user_id(), module_id)
            .await?
            .ok_or(ProgressionError::ProgressNotFound(module_id))
    }

    /// Stored records of one semester's modules, in catalog order.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::SemesterNotFound` for a label outside the catalog.
    pub async fn semester_progress(
        &self,
        identity: &Identity,
        catalog: &Catalog,
        semester: &SemesterLabel,
    ) -> Result<Vec<UserProgress>, ProgressionError> {
        require_semester(catalog, semester)?;
        let module_ids = catalog.module_ids_in(semester);
        let mut records = self
            .progress
            .list_progress_for_modules(identity.user_id(), &module_ids)
            .await?;
        records.sort_by_key(|p| module_ids.iter().position(|id| *id == p.module_id()));
        Ok(records)
    }

    /// Per-semester completion plus totals.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::StoreUnavailable` if progress cannot be read.
    #[tracing::instrument(skip_all, fields(user_id = identity.user_id().value()))]
    pub async fn dashboard(
        &self,
        identity: &Identity,
        catalog: &Catalog,
    ) -> Result<DashboardSummary, ProgressionError> {
        let snapshot = self.snapshot(identity, catalog).await?;
        Ok(dashboard::summarize(&snapshot))
    }

    //
    // ─── WRITES ────────────────────────────────────────────────────────────────
    //

    /// Open a module for the user, creating its record on first touch.
    ///
    /// Idempotent apart from refreshing `last_accessed`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::ModuleNotFound` for an unknown module.
    /// Returns `ProgressionError::Conflict` if the store stays contended.
    #[tracing::instrument(skip_all, fields(user_id = identity.user_id().value(), module_id = %module_id))]
    pub async fn unlock_module(
        &self,
        identity: &Identity,
        catalog: &Catalog,
        module_id: ModuleId,
    ) -> Result<UserProgress, ProgressionError> {
        require_module(catalog, module_id)?;
        let applied = self
            .apply(identity, module_id, ProgressMutation::Unlock)
            .await?;
        if applied.effect.created {
            debug!("progress record created");
        }
        Ok(applied.progress)
    }

    /// Set the module percentage, clamped into `0..=100`.
    ///
    /// Reaching 100 completes the module and tries to open the next semester.
    /// A completed module stays at 100.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::ModuleNotFound` for an unknown module.
    /// Returns `ProgressionError::Conflict` if the store stays contended.
    #[tracing::instrument(skip_all, fields(user_id = identity.user_id().value(), module_id = %module_id, percentage = percentage))]
    pub async fn update_progress_percentage(
        &self,
        identity: &Identity,
        catalog: &Catalog,
        module_id: ModuleId,
        percentage: i64,
    ) -> Result<UserProgress, ProgressionError> {
        let module = require_module(catalog, module_id)?;
        let pct = Percentage::clamped(percentage);
        let applied = self
            .apply(identity, module_id, ProgressMutation::SetPercentage(pct))
            .await?;

        if applied.effect.completed {
            info!("module completed by progress");
            self.try_cascade_unlock(identity, catalog, module.semester())
                .await?;
        }
        Ok(applied.progress)
    }

    /// Complete a module outright (e.g. after an exam pass).
    ///
    /// Always stamps `completed_at` and always evaluates the cascade, so it
    /// also repairs a cascade that an earlier crash left unfinished.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::ModuleNotFound` for an unknown module.
    /// Returns `ProgressionError::Conflict` if the store stays contended.
    #[tracing::instrument(skip_all, fields(user_id = identity.user_id().value(), module_id = %module_id))]
    pub async fn mark_module_completed(
        &self,
        identity: &Identity,
        catalog: &Catalog,
        module_id: ModuleId,
    ) -> Result<UserProgress, ProgressionError> {
        let module = require_module(catalog, module_id)?;
        let applied = self
            .apply(identity, module_id, ProgressMutation::Complete)
            .await?;
        if applied.effect.completed {
            info!("module marked completed");
        }

        self.try_cascade_unlock(identity, catalog, module.semester())
            .await?;
        Ok(applied.progress)
    }

    /// Unlock every module of the semester after `semester` once `semester`
    /// is complete. Under a lenient policy the cascade skips empty semesters
    /// and opens the first later one that has modules.
    ///
    /// Safe to call repeatedly: modules already unlocked keep their
    /// percentage and timestamps.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::SemesterNotFound` for a label outside the catalog.
    /// Returns `ProgressionError::Conflict` if the store stays contended.
    #[tracing::instrument(skip_all, fields(user_id = identity.user_id().value(), semester = %semester))]
    pub async fn try_cascade_unlock(
        &self,
        identity: &Identity,
        catalog: &Catalog,
        semester: &SemesterLabel,
    ) -> Result<CascadeOutcome, ProgressionError> {
        require_semester(catalog, semester)?;
        let Some(mut next) = catalog.next_semester(semester) else {
            debug!("last semester, nothing to cascade");
            return Ok(CascadeOutcome::blocked());
        };
        if !self.snapshot(identity, catalog).await?.opens_next(semester) {
            debug!("semester incomplete, cascade skipped");
            return Ok(CascadeOutcome::blocked());
        }
        // Empty semesters that count as complete are passed straight through.
        while self.policy.empty_semester_completes
            && catalog.modules_in(next).next().is_none()
        {
            match catalog.next_semester(next) {
                Some(after) => next = after,
                None => break,
            }
        }

        let targets = catalog.module_ids_in(next);
        let targets = targets.as_slice();
        let store = self.progress.as_ref();
        let user_id = identity.user_id();
        let now = self.clock.now();
        let changed = retry::once_on_conflict("unlock_modules", move || {
            store.unlock_modules(user_id, targets, now)
        })
        .await?;

        if changed.is_empty() {
            debug!(next = %next, "next semester already unlocked");
        } else {
            info!(next = %next, unlocked = changed.len(), "next semester unlocked");
        }
        Ok(CascadeOutcome {
            unlocked: true,
            next_semester: Some(next.clone()),
        })
    }

    /// Manual cascade trigger taking a raw semester label.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::InvalidInput` for a blank label and
    /// `ProgressionError::SemesterNotFound` for one outside the catalog.
    pub async fn unlock_next_semester(
        &self,
        identity: &Identity,
        catalog: &Catalog,
        current_semester: &str,
    ) -> Result<CascadeOutcome, ProgressionError> {
        let semester = SemesterLabel::new(current_semester)
            .map_err(|e| ProgressionError::InvalidInput(e.to_string()))?;
        self.try_cascade_unlock(identity, catalog, &semester).await
    }

    //
    // ─── HELPERS ───────────────────────────────────────────────────────────────
    //

    async fn snapshot<'c>(
        &self,
        identity: &Identity,
        catalog: &'c Catalog,
    ) -> Result<ProgressSnapshot<'c>, ProgressionError> {
        let records = self.progress.list_user_progress(identity.user_id()).await?;
        Ok(ProgressSnapshot::new(catalog, self.policy, records))
    }

    async fn apply(
        &self,
        identity: &Identity,
        module_id: ModuleId,
        mutation: ProgressMutation,
    ) -> Result<AppliedMutation, ProgressionError> {
        let store = self.progress.as_ref();
        let user_id = identity.user_id();
        let now = self.clock.now();
        let applied = retry::once_on_conflict("apply_mutation", move || {
            store.apply_mutation(user_id, module_id, mutation, now)
        })
        .await?;
        Ok(applied)
    }
}

fn require_module(catalog: &Catalog, module_id: ModuleId) -> Result<&Module, ProgressionError> {
    catalog
        .module(module_id)
        .ok_or(ProgressionError::ModuleNotFound(module_id))
}

fn require_semester(catalog: &Catalog, semester: &SemesterLabel) -> Result<(), ProgressionError> {
    if catalog.contains_semester(semester) {
        Ok(())
    } else {
        Err(ProgressionError::SemesterNotFound(semester.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use curriculum_core::model::{Role, UserId};
    use curriculum_core::time::{fixed_clock, fixed_now};
    use storage::repository::{InMemoryRepository, StorageError};

    struct Fixture {
        repo: InMemoryRepository,
        catalog: Catalog,
        /// Module ids per semester, in catalog order.
        ids: Vec<Vec<ModuleId>>,
        learner: Identity,
    }

    impl Fixture {
        fn new(layout: &[(&str, usize)]) -> Self {
            let mut semesters = Vec::new();
            let mut modules = Vec::new();
            let mut ids = Vec::new();
            for (label, count) in layout {
                let label = SemesterLabel::new(label).unwrap();
                let mut in_semester = Vec::new();
                for order in 0..*count {
                    let order = u32::try_from(order).unwrap();
                    let module = Module::new(
                        ModuleId::generate(),
                        label.clone(),
                        order,
                        format!("{label}-{order}"),
                        format!("{label} module {order}"),
                        None,
                        fixed_now(),
                    )
                    .unwrap();
                    in_semester.push(module.id());
                    modules.push(module);
                }
                semesters.push(label);
                ids.push(in_semester);
            }

            Self {
                repo: InMemoryRepository::new(),
                catalog: Catalog::new(semesters, modules, vec![]).unwrap(),
                ids,
                learner: Identity::new(UserId::new(7), vec![Role::Student]),
            }
        }

        fn service(&self) -> ProgressionService {
            self.service_at(fixed_clock())
        }

        fn service_at(&self, clock: Clock) -> ProgressionService {
            ProgressionService::new(clock, Arc::new(self.repo.clone()))
        }

        fn label(&self, s: &str) -> SemesterLabel {
            SemesterLabel::new(s).unwrap()
        }

        async fn status_of(&self, svc: &ProgressionService, module_id: ModuleId) -> ModuleStatus {
            svc.module_statuses(&self.learner, &self.catalog)
                .await
                .unwrap()
                .into_iter()
                .find(|s| s.module_id == module_id)
                .unwrap()
        }
    }

    fn later(hours: i64) -> DateTime<Utc> {
        fixed_now() + Duration::hours(hours)
    }

    #[tokio::test]
    async fn first_semester_is_open_for_a_new_user() {
        let fx = Fixture::new(&[("S1", 2), ("S2", 1)]);
        let statuses = fx
            .service()
            .module_statuses(&fx.learner, &fx.catalog)
            .await
            .unwrap();

        let open: Vec<_> = statuses.iter().map(|s| s.is_unlocked).collect();
        assert_eq!(open, vec![true, true, false]);
        assert!(statuses.iter().all(|s| s.percentage == Percentage::ZERO && !s.is_completed));
        // reads never persist synthesized state
        assert!(fx.repo.list_user_progress(UserId::new(7)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_catalog_reports_nothing() {
        let fx = Fixture::new(&[]);
        let svc = fx.service();
        assert!(svc.module_statuses(&fx.learner, &fx.catalog).await.unwrap().is_empty());
        let dash = svc.dashboard(&fx.learner, &fx.catalog).await.unwrap();
        assert!(dash.current_semester.is_none());
        assert_eq!(dash.totals.total_modules, 0);
    }

    #[tokio::test]
    async fn percentage_walkthrough_completes_and_cascades() {
        let fx = Fixture::new(&[("S1", 2), ("S2", 1)]);
        let svc = fx.service();
        let (m1, m2, m3) = (fx.ids[0][0], fx.ids[0][1], fx.ids[1][0]);

        let p1 = svc
            .update_progress_percentage(&fx.learner, &fx.catalog, m1, 100)
            .await
            .unwrap();
        assert!(p1.is_module_completed());
        assert_eq!(p1.completed_at(), Some(fixed_now()));
        assert!(!fx.status_of(&svc, m3).await.is_unlocked);

        let p2 = svc
            .update_progress_percentage(&fx.learner, &fx.catalog, m2, 100)
            .await
            .unwrap();
        assert!(p2.is_module_completed());

        let m3_record = fx.repo.get_progress(UserId::new(7), m3).await.unwrap().unwrap();
        assert!(m3_record.is_module_unlocked());
        assert_eq!(m3_record.progress_percentage(), Percentage::ZERO);
        assert_eq!(m3_record.last_accessed(), None);

        let p3 = svc
            .update_progress_percentage(&fx.learner, &fx.catalog, m3, 50)
            .await
            .unwrap();
        assert_eq!(p3.progress_percentage().value(), 50);
        assert!(!p3.is_module_completed());

        let last = svc
            .try_cascade_unlock(&fx.learner, &fx.catalog, &fx.label("S2"))
            .await
            .unwrap();
        assert_eq!(last, CascadeOutcome::blocked());
    }

    #[tokio::test]
    async fn cascade_waits_for_the_whole_semester() {
        let fx = Fixture::new(&[("S1", 2), ("S2", 1)]);
        let svc = fx.service();
        let (a, b, c) = (fx.ids[0][0], fx.ids[0][1], fx.ids[1][0]);

        svc.mark_module_completed(&fx.learner, &fx.catalog, a)
            .await
            .unwrap();
        assert!(!fx.status_of(&svc, c).await.is_unlocked);
        assert!(fx.repo.get_progress(UserId::new(7), c).await.unwrap().is_none());

        svc.mark_module_completed(&fx.learner, &fx.catalog, b)
            .await
            .unwrap();
        let status = fx.status_of(&svc, c).await;
        assert!(status.is_unlocked);
        assert_eq!(status.percentage, Percentage::ZERO);
    }

    #[tokio::test]
    async fn repeated_cascade_leaves_next_semester_alone() {
        let fx = Fixture::new(&[("S1", 1), ("S2", 1)]);
        let (a, c) = (fx.ids[0][0], fx.ids[1][0]);
        fx.service()
            .mark_module_completed(&fx.learner, &fx.catalog, a)
            .await
            .unwrap();
        fx.service()
            .update_progress_percentage(&fx.learner, &fx.catalog, c, 30)
            .await
            .unwrap();
        let before = fx.repo.get_progress(UserId::new(7), c).await.unwrap().unwrap();

        let svc = fx.service_at(fixed_clock().advanced_by(Duration::hours(5)));
        for _ in 0..2 {
            let outcome = svc
                .try_cascade_unlock(&fx.learner, &fx.catalog, &fx.label("S1"))
                .await
                .unwrap();
            assert!(outcome.unlocked);
            assert_eq!(outcome.next_semester, Some(fx.label("S2")));
        }

        let after = fx.repo.get_progress(UserId::new(7), c).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn unlock_is_idempotent_apart_from_last_accessed() {
        let fx = Fixture::new(&[("S1", 1)]);
        let m = fx.ids[0][0];

        let first = fx
            .service()
            .unlock_module(&fx.learner, &fx.catalog, m)
            .await
            .unwrap();
        let second = fx
            .service_at(fixed_clock().advanced_by(Duration::hours(1)))
            .unlock_module(&fx.learner, &fx.catalog, m)
            .await
            .unwrap();

        assert!(second.is_module_unlocked());
        assert_eq!(second.started_at(), first.started_at());
        assert_eq!(second.progress_percentage(), first.progress_percentage());
        assert_eq!(second.last_accessed(), Some(later(1)));
        assert_eq!(fx.repo.list_user_progress(UserId::new(7)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_percentages_are_clamped() {
        let fx = Fixture::new(&[("S1", 2)]);
        let svc = fx.service();
        let (a, b) = (fx.ids[0][0], fx.ids[0][1]);

        let over = svc
            .update_progress_percentage(&fx.learner, &fx.catalog, a, 150)
            .await
            .unwrap();
        assert_eq!(over.progress_percentage(), Percentage::FULL);
        assert!(over.is_module_completed());

        let under = svc
            .update_progress_percentage(&fx.learner, &fx.catalog, b, -20)
            .await
            .unwrap();
        assert_eq!(under.progress_percentage(), Percentage::ZERO);
        assert!(under.is_module_unlocked());
    }

    #[tokio::test]
    async fn completion_is_terminal() {
        let fx = Fixture::new(&[("S1", 1)]);
        let svc = fx.service();
        let m = fx.ids[0][0];

        svc.mark_module_completed(&fx.learner, &fx.catalog, m)
            .await
            .unwrap();
        let lowered = svc
            .update_progress_percentage(&fx.learner, &fx.catalog, m, 40)
            .await
            .unwrap();
        assert_eq!(lowered.progress_percentage(), Percentage::FULL);
        assert!(lowered.is_module_completed());
    }

    #[tokio::test]
    async fn explicit_completion_restamps_and_repairs_cascade() {
        let fx = Fixture::new(&[("S1", 1), ("S2", 2)]);
        let (a, c) = (fx.ids[0][0], fx.ids[1][0]);

        // completion persisted but the cascade never ran
        fx.repo
            .apply_mutation(UserId::new(7), a, ProgressMutation::Complete, fixed_now())
            .await
            .unwrap();
        assert!(fx.repo.get_progress(UserId::new(7), c).await.unwrap().is_none());

        let again = fx
            .service_at(fixed_clock().advanced_by(Duration::hours(2)))
            .mark_module_completed(&fx.learner, &fx.catalog, a)
            .await
            .unwrap();
        assert_eq!(again.completed_at(), Some(later(2)));
        for id in &fx.ids[1] {
            let record = fx.repo.get_progress(UserId::new(7), *id).await.unwrap().unwrap();
            assert!(record.is_module_unlocked());
        }
    }

    #[tokio::test]
    async fn unlocks_are_never_rescinded() {
        let fx = Fixture::new(&[("S1", 1), ("S2", 1), ("S3", 1)]);
        let svc = fx.service();
        let (a, b, c) = (fx.ids[0][0], fx.ids[1][0], fx.ids[2][0]);

        svc.unlock_module(&fx.learner, &fx.catalog, c).await.unwrap();
        svc.update_progress_percentage(&fx.learner, &fx.catalog, b, 10)
            .await
            .unwrap();
        svc.mark_module_completed(&fx.learner, &fx.catalog, a)
            .await
            .unwrap();
        svc.update_progress_percentage(&fx.learner, &fx.catalog, c, 0)
            .await
            .unwrap();

        let statuses = svc.module_statuses(&fx.learner, &fx.catalog).await.unwrap();
        assert!(statuses.iter().all(|s| s.is_unlocked));
    }

    #[tokio::test]
    async fn empty_semester_blocks_cascade_by_default() {
        let fx = Fixture::new(&[("S1", 1), ("S2", 0), ("S3", 1)]);
        let a = fx.ids[0][0];
        let late = fx.ids[2][0];
        let svc = fx.service();

        let outcome = svc
            .update_progress_percentage(&fx.learner, &fx.catalog, a, 100)
            .await
            .unwrap();
        assert!(outcome.is_module_completed());
        assert!(
            !svc.is_semester_complete(&fx.learner, &fx.catalog, &fx.label("S2"))
                .await
                .unwrap()
        );
        let blocked = svc
            .try_cascade_unlock(&fx.learner, &fx.catalog, &fx.label("S2"))
            .await
            .unwrap();
        assert!(!blocked.unlocked);
        assert!(!fx.status_of(&svc, late).await.is_unlocked);

        let lenient = svc.with_policy(ProgressionPolicy {
            empty_semester_completes: true,
        });
        let opened = lenient
            .try_cascade_unlock(&fx.learner, &fx.catalog, &fx.label("S2"))
            .await
            .unwrap();
        assert!(opened.unlocked);
        assert_eq!(opened.next_semester, Some(fx.label("S3")));
    }

    #[tokio::test]
    async fn lenient_policy_passes_empty_semester_only_after_earlier_ones() {
        let fx = Fixture::new(&[("S1", 1), ("S2", 0), ("S3", 1)]);
        let (a, c) = (fx.ids[0][0], fx.ids[2][0]);
        let svc = fx.service().with_policy(ProgressionPolicy {
            empty_semester_completes: true,
        });

        assert!(!fx.status_of(&svc, c).await.is_unlocked);
        let dash = svc.dashboard(&fx.learner, &fx.catalog).await.unwrap();
        assert!(!dash.semesters[2].is_accessible);
        assert_eq!(dash.totals.unlocked_modules, 1);
        let early = svc
            .unlock_next_semester(&fx.learner, &fx.catalog, "S2")
            .await
            .unwrap();
        assert!(!early.unlocked);

        svc.mark_module_completed(&fx.learner, &fx.catalog, a)
            .await
            .unwrap();
        let stored = svc
            .module_progress(&fx.learner, &fx.catalog, c)
            .await
            .unwrap();
        assert!(stored.is_module_unlocked());
        assert_eq!(stored.progress_percentage().value(), 0);
        assert!(fx.status_of(&svc, c).await.is_unlocked);
        let dash = svc.dashboard(&fx.learner, &fx.catalog).await.unwrap();
        assert!(dash.semesters[2].is_accessible);
    }

    #[tokio::test]
    async fn dashboard_matches_counts() {
        let fx = Fixture::new(&[("S1", 2), ("S2", 3), ("S3", 1)]);
        let svc = fx.service();
        for id in &fx.ids[0] {
            svc.mark_module_completed(&fx.learner, &fx.catalog, *id)
                .await
                .unwrap();
        }
        svc.mark_module_completed(&fx.learner, &fx.catalog, fx.ids[1][0])
            .await
            .unwrap();

        let dash = svc.dashboard(&fx.learner, &fx.catalog).await.unwrap();
        for s in &dash.semesters {
            let expected = s.completed_count as f64 / s.total_count as f64 * 100.0;
            assert!((s.completion_pct - expected).abs() < 1e-9);
        }
        assert_eq!(dash.current_semester, Some(fx.label("S2")));

        let flags: Vec<_> = dash
            .semesters
            .iter()
            .map(|s| (s.is_complete, s.is_accessible))
            .collect();
        assert_eq!(flags, vec![(true, true), (false, true), (false, false)]);

        assert_eq!(dash.totals.completed_modules, 3);
        assert_eq!(dash.totals.total_modules, 6);
        assert_eq!(dash.totals.unlocked_modules, 5);
        assert!((dash.totals.completion_pct - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn dashboard_points_at_last_semester_when_all_done() {
        let fx = Fixture::new(&[("S1", 1), ("S2", 1)]);
        let svc = fx.service();
        for ids in &fx.ids {
            svc.mark_module_completed(&fx.learner, &fx.catalog, ids[0])
                .await
                .unwrap();
        }
        let dash = svc.dashboard(&fx.learner, &fx.catalog).await.unwrap();
        assert_eq!(dash.current_semester, Some(fx.label("S2")));
        assert!(dash.semesters.iter().all(|s| s.is_complete && s.is_accessible));
    }

    #[tokio::test]
    async fn progress_reads_report_missing_data() {
        let fx = Fixture::new(&[("S1", 2), ("S2", 1)]);
        let svc = fx.service();
        let (a, b) = (fx.ids[0][0], fx.ids[0][1]);

        let err = svc
            .module_progress(&fx.learner, &fx.catalog, a)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressionError::ProgressNotFound(id) if id == a));

        svc.update_progress_percentage(&fx.learner, &fx.catalog, b, 20)
            .await
            .unwrap();
        svc.unlock_module(&fx.learner, &fx.catalog, a).await.unwrap();
        let semester = svc
            .semester_progress(&fx.learner, &fx.catalog, &fx.label("S1"))
            .await
            .unwrap();
        let order: Vec<_> = semester.iter().map(UserProgress::module_id).collect();
        assert_eq!(order, vec![a, b]);
        assert!(
            svc.semester_progress(&fx.learner, &fx.catalog, &fx.label("S2"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn unknown_targets_are_rejected() {
        let fx = Fixture::new(&[("S1", 1)]);
        let svc = fx.service();
        let stranger = ModuleId::generate();

        let err = svc
            .unlock_module(&fx.learner, &fx.catalog, stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressionError::ModuleNotFound(_)));

        let err = svc
            .unlock_next_semester(&fx.learner, &fx.catalog, "S9")
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressionError::SemesterNotFound(label) if label == "S9"));

        let err = svc
            .unlock_next_semester(&fx.learner, &fx.catalog, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressionError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn manual_trigger_parses_labels() {
        let fx = Fixture::new(&[("S1", 1), ("S2", 1)]);
        let svc = fx.service();
        let early = svc
            .unlock_next_semester(&fx.learner, &fx.catalog, " S1 ")
            .await
            .unwrap();
        assert!(!early.unlocked);

        svc.mark_module_completed(&fx.learner, &fx.catalog, fx.ids[0][0])
            .await
            .unwrap();
        let outcome = svc
            .unlock_next_semester(&fx.learner, &fx.catalog, "S1")
            .await
            .unwrap();
        assert!(outcome.unlocked);
    }

    #[tokio::test]
    async fn users_do_not_share_progress() {
        let fx = Fixture::new(&[("S1", 1), ("S2", 1)]);
        let svc = fx.service();
        svc.mark_module_completed(&fx.learner, &fx.catalog, fx.ids[0][0])
            .await
            .unwrap();

        let other = Identity::student(UserId::new(8));
        let statuses = svc.module_statuses(&other, &fx.catalog).await.unwrap();
        assert!(!statuses[1].is_unlocked);
        assert!(!statuses[0].is_completed);
    }

    /// Reports a conflict on the first `failures` writes, then delegates.
    struct ContendedStore {
        inner: InMemoryRepository,
        failures: AtomicUsize,
    }

    impl ContendedStore {
        fn contended(&self) -> bool {
            self.failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl ProgressRepository for ContendedStore {
        async fn get_progress(
            &self,
            user_id: UserId,
            module_id: ModuleId,
        ) -> Result<Option<UserProgress>, StorageError> {
            self.inner.get_progress(user_id, module_id).await
        }

        async fn list_user_progress(
            &self,
            user_id: UserId,
        ) -> Result<Vec<UserProgress>, StorageError> {
            self.inner.list_user_progress(user_id).await
        }

        async fn list_progress_for_modules(
            &self,
            user_id: UserId,
            module_ids: &[ModuleId],
        ) -> Result<Vec<UserProgress>, StorageError> {
            self.inner.list_progress_for_modules(user_id, module_ids).await
        }

        async fn apply_mutation(
            &self,
            user_id: UserId,
            module_id: ModuleId,
            mutation: ProgressMutation,
            now: DateTime<Utc>,
        ) -> Result<AppliedMutation, StorageError> {
            if self.contended() {
                return Err(StorageError::Conflict);
            }
            self.inner.apply_mutation(user_id, module_id, mutation, now).await
        }

        async fn unlock_modules(
            &self,
            user_id: UserId,
            module_ids: &[ModuleId],
            now: DateTime<Utc>,
        ) -> Result<Vec<ModuleId>, StorageError> {
            if self.contended() {
                return Err(StorageError::Conflict);
            }
            self.inner.unlock_modules(user_id, module_ids, now).await
        }
    }

    #[tokio::test]
    async fn a_single_conflict_is_retried() {
        let fx = Fixture::new(&[("S1", 1), ("S2", 1)]);
        let store = Arc::new(ContendedStore {
            inner: fx.repo.clone(),
            failures: AtomicUsize::new(1),
        });
        let svc = ProgressionService::new(fixed_clock(), store);

        let done = svc
            .mark_module_completed(&fx.learner, &fx.catalog, fx.ids[0][0])
            .await
            .unwrap();
        assert!(done.is_module_completed());
        assert!(fx.status_of(&fx.service(), fx.ids[1][0]).await.is_unlocked);
    }

    #[tokio::test]
    async fn persistent_conflict_is_surfaced() {
        let fx = Fixture::new(&[("S1", 1)]);
        let store = Arc::new(ContendedStore {
            inner: fx.repo.clone(),
            failures: AtomicUsize::new(2),
        });
        let svc = ProgressionService::new(fixed_clock(), store);

        let err = svc
            .unlock_module(&fx.learner, &fx.catalog, fx.ids[0][0])
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressionError::Conflict));
        assert!(fx.repo.list_user_progress(UserId::new(7)).await.unwrap().is_empty());
    }
}
