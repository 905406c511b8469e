//! Shared infrastructure for the Catalog Audit workspace.

pub mod logging;

pub use logging::{init_default_logging, init_logging, init_test_logging};
