//! HTTP surface: media streaming, analysis triggers and downloads.

pub mod error;
pub mod range;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, AppState};
