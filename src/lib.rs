pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod handle;
pub mod history;
pub mod logging;
pub mod native;
pub mod operation;
pub mod render;
pub mod transfer;

#[cfg(test)]
mod test_support;

pub use app::{AppContext, Direction, Signal, StatusLevel};
pub use error::{AppError, AppResult};
pub use operation::Operation;
