//! Deterministic, pure logic shared by the generation pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! file maps and history records and return deterministic outputs suitable
//! for tests.

pub mod classifier;
pub mod history;
pub mod quality;
pub mod recommendations;
pub mod requirements;
pub mod sanitize;
pub mod strategy;
pub mod types;
