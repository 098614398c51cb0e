//! Deterministic, pure logic for belief-state tracking.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod extract;
pub mod operator;
pub mod store;
pub mod types;
