//! Shared utilities for rxscan integration tests.
//!
//! - `TestHarness`: temp-dir database and blob store, services and handlers
//!   wired to fake recognition strategies
//! - fixtures for generating uploads

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::{KeyedStrategy, TestHarness};
