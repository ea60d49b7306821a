//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on catalog
//! records and task outcomes in memory and return deterministic outputs.

pub mod catalog;
pub mod outcome;
pub mod summary;
