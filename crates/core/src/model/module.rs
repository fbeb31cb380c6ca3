use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{LessonId, ModuleId};
use crate::model::semester::SemesterLabel;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModuleError {
    #[error("module code cannot be empty")]
    EmptyCode,

    #[error("module title cannot be empty")]
    EmptyTitle,

    #[error("lesson title cannot be empty")]
    EmptyLessonTitle,
}

/// A unit of curriculum content belonging to exactly one semester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    id: ModuleId,
    semester: SemesterLabel,
    order: u32,
    code: String,
    title: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl Module {
    /// Creates a module.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::EmptyCode` or `ModuleError::EmptyTitle` when
    /// the trimmed values are empty.
    pub fn new(
        id: ModuleId,
        semester: SemesterLabel,
        order: u32,
        code: impl Into<String>,
        title: impl Into<String>,
        description: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ModuleError> {
        let code = code.into().trim().to_owned();
        if code.is_empty() {
            return Err(ModuleError::EmptyCode);
        }
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(ModuleError::EmptyTitle);
        }
        let description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        Ok(Self {
            id,
            semester,
            order,
            code,
            title,
            description,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn semester(&self) -> &SemesterLabel {
        &self.semester
    }

    /// Display position inside the module's semester.
    #[must_use]
    pub fn order(&self) -> u32 {
        self.order
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A lesson inside a module. Lesson completion drives module percentage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    id: LessonId,
    module_id: ModuleId,
    order: u32,
    title: String,
}

impl Lesson {
    /// # Errors
    ///
    /// Returns `ModuleError::EmptyLessonTitle` if the title is blank.
    pub fn new(
        id: LessonId,
        module_id: ModuleId,
        order: u32,
        title: impl Into<String>,
    ) -> Result<Self, ModuleError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(ModuleError::EmptyLessonTitle);
        }
        Ok(Self {
            id,
            module_id,
            order,
            title,
        })
    }

    #[must_use]
    pub fn id(&self) -> LessonId {
        self.id
    }

    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    #[must_use]
    pub fn order(&self) -> u32 {
        self.order
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }
}
