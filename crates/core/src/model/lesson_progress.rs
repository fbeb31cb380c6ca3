use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{LessonId, UserId};

/// Whether a user has finished one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    user_id: UserId,
    lesson_id: LessonId,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl LessonProgress {
    #[must_use]
    pub fn new(user_id: UserId, lesson_id: LessonId) -> Self {
        Self {
            user_id,
            lesson_id,
            completed: false,
            completed_at: None,
        }
    }

    /// Rehydrate from storage. A completion timestamp without the completed
    /// flag is dropped.
    #[must_use]
    pub fn from_persisted(
        user_id: UserId,
        lesson_id: LessonId,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            user_id,
            lesson_id,
            completed,
            completed_at: completed_at.filter(|_| completed),
        }
    }

    /// Mark completed (stamping `now` on the first completion) or clear it.
    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        if completed {
            if !self.completed {
                self.completed_at = Some(now);
            }
        } else {
            self.completed_at = None;
        }
        self.completed = completed;
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
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

    #[test]
    fn completion_keeps_first_timestamp() {
        let mut lp = LessonProgress::new(UserId::new(1), LessonId::generate());
        lp.set_completed(true, fixed_now());
        lp.set_completed(true, fixed_now() + Duration::days(1));
        assert_eq!(lp.completed_at(), Some(fixed_now()));
    }

    #[test]
    fn undo_clears_timestamp() {
        let mut lp = LessonProgress::new(UserId::new(1), LessonId::generate());
        lp.set_completed(true, fixed_now());
        lp.set_completed(false, fixed_now());
        assert!(!lp.completed());
        assert!(lp.completed_at().is_none());
    }
}
