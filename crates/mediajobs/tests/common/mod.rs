//! Shared test utilities for mediajobs integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a ledger, storage, targets and a scripted codec
//! - Builders for conversion requests and configs

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{MemoryTarget, ScriptedTranscoder, TargetStore, TestHarness};
