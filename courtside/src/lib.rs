//! courtside library crate.
//!
//! Media streaming and analysis-job orchestration for match video. The
//! binary wires these modules into an HTTP service; tests drive them
//! directly.

pub mod api;
pub mod artifact;
pub mod config;
pub mod convert;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod matches;
pub mod utils;
pub mod worker;

pub use error::{Error, Result};
