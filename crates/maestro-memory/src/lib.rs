//! Learning store for execution outcomes.
//!
//! The orchestrator appends a compact pattern line per finished task so that
//! later classification can learn from what worked. The store contract is
//! write-mostly: `store(text, category, tags)`; `list` and `count` exist for
//! inspection and tests.
//!
//! # Main types
//!
//! - [`LearningStore`]: Trait for learning store backends.
//! - [`InMemoryLearningStore`]: Volatile store, useful for tests and dry runs.
//! - [`FileLearningStore`]: JSONL-backed append-only store.
//! - [`LearningEntry`]: A single stored pattern.

/// Learning store trait and its in-memory and file-backed implementations.
pub mod store;

pub use store::{FileLearningStore, InMemoryLearningStore, LearningEntry, LearningStore};
