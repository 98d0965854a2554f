//! Storage layer
//!
//! Two layers over one SQLite database:
//! - [`Store`]: named collections with generic CRUD and schema migrations
//! - [`Repository`]: conversation-level semantics (cascade delete, search,
//!   export/import, backup/restore)

pub mod repo;
pub mod schema;
pub mod store;

pub use repo::{ImportSummary, Repository, RestoreSummary};
pub use store::Store;
