//! Core types and error handling for krateoctl
//!
//! Everything other modules share lives here: the [`KrateoError`] taxonomy and
//! the [`ErrorContext`] wrapper used by the CLI to print actionable failures.

pub mod error;

pub use error::{ErrorContext, KrateoError, user_friendly_error};
