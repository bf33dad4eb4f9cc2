//! blackbook-core - Core library for Perun's BlackBook
//!
//! This crate contains the shared models, database layer, and the
//! bidirectional contact sync engine used by the HTTP API and the CLI.

pub mod db;
pub mod error;
pub mod models;
pub mod sync;

pub use error::{Error, Result};
pub use models::{Person, PersonId};
