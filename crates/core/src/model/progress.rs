use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::{ModuleId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("progress percentage must be within 0..=100, got {0}")]
    PercentageOutOfRange(i64),

    #[error("a module at 100% must be marked completed")]
    FullButIncomplete,

    #[error("a completed module must carry a completion timestamp")]
    MissingCompletedAt,

    #[error("a module that is not completed cannot carry a completion timestamp")]
    UnexpectedCompletedAt,
}

//
// ─── PERCENTAGE ────────────────────────────────────────────────────────────────
//

/// Completion percentage of a module, always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Percentage(u8);

impl Percentage {
    pub const ZERO: Self = Self(0);
    pub const FULL: Self = Self(100);

    /// Strict constructor.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::PercentageOutOfRange` outside `0..=100`.
    pub fn new(value: i64) -> Result<Self, ProgressError> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Self)
            .ok_or(ProgressError::PercentageOutOfRange(value))
    }

    /// Saturating constructor: values below 0 become 0, above 100 become 100.
    #[must_use]
    pub fn clamped(value: i64) -> Self {
        let v = value.clamp(0, 100);
        // in range after clamp
        Self(u8::try_from(v).unwrap_or(100))
    }

    /// `completed / total` expressed as a floored percentage; 0 when `total` is 0.
    #[must_use]
    pub fn from_ratio(completed: usize, total: usize) -> Self {
        if total == 0 {
            return Self::ZERO;
        }
        let completed = completed.min(total);
        let pct = completed.saturating_mul(100) / total;
        Self::clamped(i64::try_from(pct).unwrap_or(100))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_full(self) -> bool {
        self.0 == 100
    }
}

impl TryFrom<i64> for Percentage {
    type Error = ProgressError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percentage> for u8 {
    fn from(p: Percentage) -> Self {
        p.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

//
// ─── MUTATIONS ─────────────────────────────────────────────────────────────────
//

/// A single write against one `(user, module)` progress record.
///
/// Stores apply these atomically through [`UserProgress::apply`], creating
/// the record with unlock semantics first when it does not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMutation {
    Unlock,
    SetPercentage(Percentage),
    Complete,
}

/// What a mutation changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MutationEffect {
    /// The record did not exist and was created by this mutation.
    pub created: bool,
    /// The record went from locked to unlocked.
    pub unlocked: bool,
    /// The record went from not completed to completed.
    pub completed: bool,
}

//
// ─── USER PROGRESS ─────────────────────────────────────────────────────────────
//

/// Progress of one user through one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    user_id: UserId,
    module_id: ModuleId,
    is_module_unlocked: bool,
    is_module_completed: bool,
    progress_percentage: Percentage,
    last_accessed: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl UserProgress {
    /// First touch of a module: unlocked, nothing done yet.
    #[must_use]
    pub fn first_touch(user_id: UserId, module_id: ModuleId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            module_id,
            is_module_unlocked: true,
            is_module_completed: false,
            progress_percentage: Percentage::ZERO,
            last_accessed: Some(now),
            started_at: now,
            completed_at: None,
        }
    }

    /// Record created by a semester cascade. Unlike a first touch the learner
    /// has not opened the module yet, so `last_accessed` stays empty.
    #[must_use]
    pub fn cascaded(user_id: UserId, module_id: ModuleId, now: DateTime<Utc>) -> Self {
        Self {
            last_accessed: None,
            ..Self::first_touch(user_id, module_id, now)
        }
    }

    /// Rehydrate a record from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the stored row breaks the completion
    /// invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        user_id: UserId,
        module_id: ModuleId,
        is_module_unlocked: bool,
        is_module_completed: bool,
        progress_percentage: Percentage,
        last_accessed: Option<DateTime<Utc>>,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressError> {
        if progress_percentage.is_full() && !is_module_completed {
            return Err(ProgressError::FullButIncomplete);
        }
        match (is_module_completed, completed_at) {
            (true, None) => return Err(ProgressError::MissingCompletedAt),
            (false, Some(_)) => return Err(ProgressError::UnexpectedCompletedAt),
            _ => {}
        }

        Ok(Self {
            user_id,
            module_id,
            is_module_unlocked,
            is_module_completed,
            progress_percentage,
            last_accessed,
            started_at,
            completed_at,
        })
    }

    /// Apply `mutation` to an optional existing record.
    ///
    /// A missing record is first created as a [`first_touch`](Self::first_touch),
    /// which is the only way records come into existence.
    #[must_use]
    pub fn apply(
        existing: Option<Self>,
        user_id: UserId,
        module_id: ModuleId,
        mutation: ProgressMutation,
        now: DateTime<Utc>,
    ) -> (Self, MutationEffect) {
        let (mut progress, mut effect) = match existing {
            Some(p) => (p, MutationEffect::default()),
            None => (
                Self::first_touch(user_id, module_id, now),
                MutationEffect {
                    created: true,
                    unlocked: true,
                    completed: false,
                },
            ),
        };

        effect.unlocked |= progress.unlock(now);
        match mutation {
            ProgressMutation::Unlock => {}
            ProgressMutation::SetPercentage(pct) => {
                effect.completed = progress.set_percentage(pct, now);
            }
            ProgressMutation::Complete => {
                effect.completed = progress.mark_completed(now);
            }
        }
        (progress, effect)
    }

    /// Unlock and refresh `last_accessed`. Returns true if the record was locked.
    pub fn unlock(&mut self, now: DateTime<Utc>) -> bool {
        let was_locked = !self.is_module_unlocked;
        self.is_module_unlocked = true;
        self.last_accessed = Some(now);
        was_locked
    }

    /// Unlock without touching anything else. Used by semester cascades so an
    /// already-open module keeps its timestamps. Returns true if it was locked.
    pub fn ensure_unlocked(&mut self) -> bool {
        let was_locked = !self.is_module_unlocked;
        self.is_module_unlocked = true;
        was_locked
    }

    /// Set the percentage and auto-complete at 100.
    ///
    /// Completion is terminal: a completed module stays at 100 regardless of
    /// the value given. Returns true if this call completed the module.
    pub fn set_percentage(&mut self, pct: Percentage, now: DateTime<Utc>) -> bool {
        self.last_accessed = Some(now);
        if self.is_module_completed {
            return false;
        }
        self.progress_percentage = pct;
        if pct.is_full() {
            self.is_module_completed = true;
            self.completed_at = Some(now);
            return true;
        }
        false
    }

    /// Explicit completion (e.g. an exam pass). Normalizes the percentage to
    /// 100 and stamps `completed_at`. Returns true if it was not completed before.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> bool {
        let newly = !self.is_module_completed;
        self.is_module_completed = true;
        self.completed_at = Some(now);
        self.progress_percentage = Percentage::FULL;
        self.last_accessed = Some(now);
        newly
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    #[must_use]
    pub fn is_module_unlocked(&self) -> bool {
        self.is_module_unlocked
    }

    #[must_use]
    pub fn is_module_completed(&self) -> bool {
        self.is_module_completed
    }

    #[must_use]
    pub fn progress_percentage(&self) -> Percentage {
        self.progress_percentage
    }

    #[must_use]
    pub fn last_accessed(&self) -> Option<DateTime<Utc>> {
        self.last_accessed
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;
    use proptest::prelude::*;

    fn ids() -> (UserId, ModuleId) {
        (UserId::new(7), ModuleId::generate())
    }

    #[test]
    fn percentage_clamps_out_of_range_values() {
        assert_eq!(Percentage::clamped(150), Percentage::FULL);
        assert_eq!(Percentage::clamped(-3), Percentage::ZERO);
        assert_eq!(Percentage::clamped(42).value(), 42);
    }

    #[test]
    fn strict_percentage_rejects_out_of_range() {
        assert_eq!(
            Percentage::new(101).unwrap_err(),
            ProgressError::PercentageOutOfRange(101)
        );
        assert!(Percentage::new(-1).is_err());
        assert_eq!(Percentage::new(100).unwrap(), Percentage::FULL);
    }

    #[test]
    fn ratio_floors() {
        assert_eq!(Percentage::from_ratio(1, 3).value(), 33);
        assert_eq!(Percentage::from_ratio(3, 3), Percentage::FULL);
        assert_eq!(Percentage::from_ratio(0, 0), Percentage::ZERO);
    }

    #[test]
    fn apply_creates_record_with_unlock_semantics() {
        let (user, module) = ids();
        let now = fixed_now();
        let (p, effect) = UserProgress::apply(None, user, module, ProgressMutation::Unlock, now);

        assert!(effect.created);
        assert!(p.is_module_unlocked());
        assert_eq!(p.progress_percentage(), Percentage::ZERO);
        assert_eq!(p.started_at(), now);
        assert_eq!(p.last_accessed(), Some(now));
    }

    #[test]
    fn unlock_twice_only_refreshes_last_accessed() {
        let (user, module) = ids();
        let now = fixed_now();
        let (first, _) = UserProgress::apply(None, user, module, ProgressMutation::Unlock, now);
        let later = now + Duration::hours(1);
        let (second, effect) =
            UserProgress::apply(Some(first.clone()), user, module, ProgressMutation::Unlock, later);

        assert_eq!(effect, MutationEffect::default());
        assert_eq!(second.started_at(), first.started_at());
        assert_eq!(second.last_accessed(), Some(later));
    }

    #[test]
    fn reaching_full_percentage_completes_once() {
        let (user, module) = ids();
        let now = fixed_now();
        let (p, effect) = UserProgress::apply(
            None,
            user,
            module,
            ProgressMutation::SetPercentage(Percentage::FULL),
            now,
        );
        assert!(effect.completed);
        assert!(p.is_module_completed());
        assert_eq!(p.completed_at(), Some(now));

        let (p, effect) = UserProgress::apply(
            Some(p),
            user,
            module,
            ProgressMutation::SetPercentage(Percentage::FULL),
            now + Duration::minutes(1),
        );
        assert!(!effect.completed);
        assert_eq!(p.completed_at(), Some(now));
    }

    #[test]
    fn completed_module_keeps_full_percentage() {
        let (user, module) = ids();
        let now = fixed_now();
        let (p, _) = UserProgress::apply(None, user, module, ProgressMutation::Complete, now);
        let (p, _) = UserProgress::apply(
            Some(p),
            user,
            module,
            ProgressMutation::SetPercentage(Percentage::clamped(40)),
            now,
        );
        assert_eq!(p.progress_percentage(), Percentage::FULL);
        assert!(p.is_module_completed());
    }

    #[test]
    fn explicit_completion_normalizes_percentage() {
        let (user, module) = ids();
        let now = fixed_now();
        let (p, _) = UserProgress::apply(
            None,
            user,
            module,
            ProgressMutation::SetPercentage(Percentage::clamped(30)),
            now,
        );
        let (p, effect) = UserProgress::apply(Some(p), user, module, ProgressMutation::Complete, now);
        assert!(effect.completed);
        assert_eq!(p.progress_percentage(), Percentage::FULL);
        assert_eq!(p.completed_at(), Some(now));
    }

    #[test]
    fn apply_unlocks_a_locked_record() {
        let (user, module) = ids();
        let now = fixed_now();
        let locked = UserProgress::from_persisted(
            user,
            module,
            false,
            false,
            Percentage::clamped(20),
            None,
            now,
            None,
        )
        .unwrap();
        let (p, effect) =
            UserProgress::apply(Some(locked), user, module, ProgressMutation::Unlock, now);
        assert!(effect.unlocked);
        assert!(!effect.created);
        assert!(p.is_module_unlocked());
        assert_eq!(p.progress_percentage().value(), 20);
    }

    #[test]
    fn cascade_record_has_no_last_accessed() {
        let (user, module) = ids();
        let p = UserProgress::cascaded(user, module, fixed_now());
        assert!(p.is_module_unlocked());
        assert!(p.last_accessed().is_none());
    }

    #[test]
    fn from_persisted_rejects_full_incomplete_row() {
        let (user, module) = ids();
        let err = UserProgress::from_persisted(
            user,
            module,
            true,
            false,
            Percentage::FULL,
            None,
            fixed_now(),
            None,
        )
        .unwrap_err();
        assert_eq!(err, ProgressError::FullButIncomplete);
    }

    #[test]
    fn from_persisted_rejects_completed_without_timestamp() {
        let (user, module) = ids();
        let err = UserProgress::from_persisted(
            user,
            module,
            true,
            true,
            Percentage::FULL,
            None,
            fixed_now(),
            None,
        )
        .unwrap_err();
        assert_eq!(err, ProgressError::MissingCompletedAt);
    }

    fn mutation_strategy() -> impl Strategy<Value = ProgressMutation> {
        prop_oneof![
            Just(ProgressMutation::Unlock),
            Just(ProgressMutation::Complete),
            (-50_i64..200).prop_map(|v| ProgressMutation::SetPercentage(Percentage::clamped(v))),
        ]
    }

    proptest! {
        #[test]
        fn mutation_sequences_keep_invariants(
            mutations in proptest::collection::vec(mutation_strategy(), 1..20)
        ) {
            let (user, module) = ids();
            let mut now = fixed_now();
            let mut current: Option<UserProgress> = None;
            let mut was_unlocked = false;

            for mutation in mutations {
                now += Duration::seconds(1);
                let (next, _) = UserProgress::apply(current.take(), user, module, mutation, now);

                if next.progress_percentage().is_full() {
                    prop_assert!(next.is_module_completed());
                }
                if next.is_module_completed() {
                    prop_assert!(next.completed_at().is_some());
                }
                if was_unlocked {
                    prop_assert!(next.is_module_unlocked());
                }
                was_unlocked = next.is_module_unlocked();
                current = Some(next);
            }
        }
    }
}
