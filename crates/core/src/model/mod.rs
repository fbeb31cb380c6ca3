mod catalog;
mod identity;
mod ids;
mod lesson_progress;
mod module;
mod progress;
mod semester;

pub use catalog::{Catalog, CatalogError};
pub use identity::{Identity, IdentityError, Role};
pub use ids::{LessonId, ModuleId, ParseIdError, UserId};
pub use lesson_progress::LessonProgress;
pub use module::{Lesson, Module, ModuleError};
pub use progress::{MutationEffect, Percentage, ProgressError, ProgressMutation, UserProgress};
pub use semester::SemesterLabel;
