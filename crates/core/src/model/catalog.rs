use std::collections::HashMap;

use thiserror::Error;

use crate::model::ids::{LessonId, ModuleId};
use crate::model::module::{Lesson, Module};
use crate::model::semester::SemesterLabel;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("semester label cannot be empty")]
    EmptySemesterLabel,

    #[error("semester {0} is declared more than once")]
    DuplicateSemester(SemesterLabel),

    #[error("module {module} references undeclared semester {semester}")]
    UnknownSemester {
        module: ModuleId,
        semester: SemesterLabel,
    },

    #[error("module {0} is declared more than once")]
    DuplicateModule(ModuleId),

    #[error("lesson {0} is declared more than once")]
    DuplicateLesson(LessonId),

    #[error("lesson {lesson} references unknown module {module}")]
    UnknownModule { lesson: LessonId, module: ModuleId },
}

//
// ─── CATALOG ───────────────────────────────────────────────────────────────────
//

/// Ordered view of the curriculum: semesters, their modules, and lessons.
///
/// Semester order is the order of the list given to [`Catalog::new`].
/// Modules are kept sorted by (semester rank, module order, module id), which
/// is the order every progression read reports them in.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    semesters: Vec<SemesterLabel>,
    modules: Vec<Module>,
    lessons: Vec<Lesson>,
    semester_rank: HashMap<SemesterLabel, usize>,
    module_index: HashMap<ModuleId, usize>,
    lesson_index: HashMap<LessonId, usize>,
}

impl Catalog {
    /// Validate and index a catalog.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` for duplicate semesters, modules, or lessons, a
    /// module in an undeclared semester, or a lesson of an unknown module.
    pub fn new(
        semesters: Vec<SemesterLabel>,
        mut modules: Vec<Module>,
        mut lessons: Vec<Lesson>,
    ) -> Result<Self, CatalogError> {
        let mut semester_rank = HashMap::with_capacity(semesters.len());
        for (rank, label) in semesters.iter().enumerate() {
            if semester_rank.insert(label.clone(), rank).is_some() {
                return Err(CatalogError::DuplicateSemester(label.clone()));
            }
        }

        for module in &modules {
            if !semester_rank.contains_key(module.semester()) {
                return Err(CatalogError::UnknownSemester {
                    module: module.id(),
                    semester: module.semester().clone(),
                });
            }
        }

        modules.sort_by_key(|m| (semester_rank[m.semester()], m.order(), m.id()));

        let mut module_index = HashMap::with_capacity(modules.len());
        for (idx, module) in modules.iter().enumerate() {
            if module_index.insert(module.id(), idx).is_some() {
                return Err(CatalogError::DuplicateModule(module.id()));
            }
        }

        lessons.sort_by_key(|l| (module_index.get(&l.module_id()).copied(), l.order(), l.id()));

        let mut lesson_index = HashMap::with_capacity(lessons.len());
        for (idx, lesson) in lessons.iter().enumerate() {
            if !module_index.contains_key(&lesson.module_id()) {
                return Err(CatalogError::UnknownModule {
                    lesson: lesson.id(),
                    module: lesson.module_id(),
                });
            }
            if lesson_index.insert(lesson.id(), idx).is_some() {
                return Err(CatalogError::DuplicateLesson(lesson.id()));
            }
        }

        Ok(Self {
            semesters,
            modules,
            lessons,
            semester_rank,
            module_index,
            lesson_index,
        })
    }

    /// Semesters in declared order.
    #[must_use]
    pub fn semesters(&self) -> &[SemesterLabel] {
        &self.semesters
    }

    /// Modules in catalog order.
    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    #[must_use]
    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.module_index.get(&id).map(|&idx| &self.modules[idx])
    }

    #[must_use]
    pub fn lesson(&self, id: LessonId) -> Option<&Lesson> {
        self.lesson_index.get(&id).map(|&idx| &self.lessons[idx])
    }

    /// Position of `semester` in the declared order.
    #[must_use]
    pub fn semester_rank(&self, semester: &SemesterLabel) -> Option<usize> {
        self.semester_rank.get(semester).copied()
    }

    #[must_use]
    pub fn contains_semester(&self, semester: &SemesterLabel) -> bool {
        self.semester_rank.contains_key(semester)
    }

    /// The lowest-ordered semester, whose modules are always open.
    #[must_use]
    pub fn first_semester(&self) -> Option<&SemesterLabel> {
        self.semesters.first()
    }

    #[must_use]
    pub fn last_semester(&self) -> Option<&SemesterLabel> {
        self.semesters.last()
    }

    #[must_use]
    pub fn is_first_semester(&self, semester: &SemesterLabel) -> bool {
        self.first_semester() == Some(semester)
    }

    /// The semester immediately after `semester`, if any.
    #[must_use]
    pub fn next_semester(&self, semester: &SemesterLabel) -> Option<&SemesterLabel> {
        let rank = self.semester_rank(semester)?;
        self.semesters.get(rank + 1)
    }

    /// The semester immediately before `semester`, if any.
    #[must_use]
    pub fn previous_semester(&self, semester: &SemesterLabel) -> Option<&SemesterLabel> {
        let rank = self.semester_rank(semester)?;
        rank.checked_sub(1).and_then(|r| self.semesters.get(r))
    }

    /// Modules of one semester, in catalog order.
    pub fn modules_in<'a>(
        &'a self,
        semester: &'a SemesterLabel,
    ) -> impl Iterator<Item = &'a Module> + 'a {
        self.modules.iter().filter(move |m| m.semester() == semester)
    }

    #[must_use]
    pub fn module_ids_in(&self, semester: &SemesterLabel) -> Vec<ModuleId> {
        self.modules_in(semester).map(Module::id).collect()
    }

    /// Lessons of one module, in lesson order.
    pub fn lessons_of(&self, module_id: ModuleId) -> impl Iterator<Item = &Lesson> + '_ {
        self.lessons
            .iter()
            .filter(move |l| l.module_id() == module_id)
    }
}
