//! Execution attempt persistence.
//!
//! Attempts live in an in-memory store for queries and are mirrored to a
//! JSON Lines audit trail on disk. The on-disk file is strictly
//! append-only; in-memory corrections (from push updates) produce a new
//! audit line with a bumped revision rather than rewriting history.

pub mod error;
pub mod store;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use store::ExecutionStore;
pub use writer::JsonLinesWriter;
