#![forbid(unsafe_code)]

pub mod app_services;
pub mod catalog_service;
pub mod error;
pub mod lesson_progress_service;
pub mod progression;
mod retry;

pub use curriculum_core::Clock;

pub use app_services::CurriculumServices;
pub use catalog_service::CatalogService;
pub use error::{CatalogServiceError, ProgressionError, ServicesInitError};
pub use lesson_progress_service::{LessonProgressService, ModuleLessonProgress};
pub use progression::{
    CascadeOutcome, DashboardSummary, DashboardTotals, ModuleStatus, ProgressionPolicy,
    ProgressionService, SemesterSummary,
};
