//! Durable storage for the trust network.
//!
//! The in-memory aggregates are authoritative while running. A
//! `StateStore` is seeded with the full state once, then receives each
//! mutation as a `StateChange` before it is committed in memory, and hands
//! the state back on start, where it is validated before use.

pub mod mock;
pub mod sqlite;
pub mod traits;

pub use mock::MockStateStore;
pub use sqlite::SqliteStateStore;
pub use traits::{StateStore, StoreError, StoreResult};
