//! Integration test suite for krateoctl
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! - **plan**: the binary's `plan`, `apply` and error output, no cluster needed
//! - **workflow**: load, resolve and run end to end against recording fakes

#[path = "../common/mod.rs"]
mod common;

mod plan;
mod workflow;
