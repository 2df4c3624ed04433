//! # Alerting Testing Utils
//!
//! Shared test doubles and builders for the alert scheduler workspace.
//!
//! ```toml
//! [dev-dependencies]
//! alerting-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
