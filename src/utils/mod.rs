//! Shared utilities

pub mod error;
pub mod format;
pub mod paths;

pub use error::{AppError, ErrorResponse};
pub use format::format_duration;
pub use paths::unique_movie_path;
