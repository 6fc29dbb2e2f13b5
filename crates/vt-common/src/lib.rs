//! Vehicle telemetry common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the pipeline crates:
//! - Record and run identity types
//! - Column names and Arrow types of the telemetry schema
//! - UTC partition-key derivation
//! - Common error types

pub mod error;
pub mod id;
pub mod schema;
pub mod time;

pub use error::{Error, Result};
pub use id::{IdentityKey, RunId, Vin};
pub use schema::SCHEMA_VERSION;
pub use time::PartitionKey;
