//! # cvmatch-store
//!
//! Local persistence for cvmatch: an in-memory SQLite database whose full
//! image is written to a durable [`kv::BlobStore`] after every change.
//!
//! A [`Session`] owns the active connection and its lifecycle (load, create,
//! import, export, checkpoint); a [`Repository`] wraps a session and
//! provides typed CRUD helpers for jobs and analyses.

pub mod analyses;
pub mod backup;
pub mod engine;
pub mod jobs;
pub mod kv;
pub mod migrations;
pub mod models;
pub mod repository;
pub mod session;

mod error;

pub use engine::Engine;
pub use error::{ErrorCategory, Result, StoreError, INVALID_IMPORT_MESSAGE};
pub use kv::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use models::*;
pub use repository::Repository;
pub use session::{Session, SessionState};
