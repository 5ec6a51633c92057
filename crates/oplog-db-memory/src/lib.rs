//! In-memory storage backend for operation logs.
//!
//! Keeps rows in insertion order behind a tokio `RwLock`. Useful for tests
//! and for embedding the capture pipeline without a database.

mod storage;

pub use storage::InMemoryLogStorage;
