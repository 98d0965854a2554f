//! # chatvault-core
//!
//! Core library for chatvault - a local chat archive.
//!
//! This library provides:
//! - Parsers that normalize raw chat logs (HTML transcripts, JSON exports,
//!   LINE-style text) into conversations and messages
//! - A SQLite-backed document store with versioned migrations
//! - A conversation repository: search, cascade delete, export/import,
//!   backup/restore
//! - An ingestion service tying parsers and storage together with
//!   provenance tracking
//!
//! ## Architecture
//!
//! Data flows in one direction:
//! - **Raw:** log documents supplied by the caller (never stored)
//! - **Normalized:** conversations and messages in SQLite, with a `source`
//!   linking each imported conversation back to its log record
//! - **Interchange:** JSON bundles for export, import, and backup
//!
//! ## Example
//!
//! ```rust,no_run
//! use chatvault_core::{Config, Ingestor, LogRecord, Repository, Store};
//! use std::sync::Arc;
//!
//! let config = Config::load().expect("failed to load config");
//!
//! let store = Arc::new(Store::open(&config.database_path()).expect("failed to open database"));
//! store.migrate().expect("failed to run migrations");
//!
//! let repo = Repository::new(store);
//! let ingestor = Ingestor::with_config(repo.clone(), &config.import);
//!
//! let content = std::fs::read_to_string("/logs/chat.html").expect("failed to read log");
//! let summary = ingestor
//!     .ingest(LogRecord::new("/logs/chat.html"), &content)
//!     .expect("failed to ingest log");
//! println!("imported {} messages", summary.message_count);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::{Repository, Store};
pub use error::{Error, Result};
pub use ingest::{IngestSummary, Ingestor};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod parse;
pub mod types;
