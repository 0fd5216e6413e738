use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::context::ContextError;
use crate::handle::HandleError;
use crate::transfer::TransferError;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Handle(#[from] HandleError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("{} does not exist", path.display())]
    MissingFile { path: PathBuf },
    #[error("failed to start loader for {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{pending} operations still running after {waited:?}")]
    Timeout { pending: usize, waited: Duration },
}
