//! Shared types, error taxonomy and trait boundaries used across the
//! search aggregator, streaming engine, reconciliation loop and admission
//! controller crates.

pub mod correlation;
pub mod domain;
pub mod error;
pub mod models;
pub mod progress;
pub mod retry;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::{Error, Result};
