//! # ModelHub Testing Utils
//!
//! Shared test doubles for the scheduler and pool crates.
//!
//! - **Mock model systems**: configurable success, failure, hang and status
//! - **Mock connections**: togglable health with disconnect counters
//! - **Builders**: fast scheduler and pool configurations for tests
//! - **Helpers**: polling utilities for asynchronous assertions
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! modelhub-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
