use thiserror::Error;

use crate::model::{CatalogError, IdentityError, ModuleError, ProgressError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}
