//! `db` crate — Postgres storage for workflows, runs and action outcomes.
//!
//! Row structs and one function per SQL statement. State columns are plain
//! strings here; the engine maps them onto its own types.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use pool::DbPool;
