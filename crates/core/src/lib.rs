//! `duka-core`: shared sync-layer primitives.
//!
//! This crate contains **pure domain** building blocks (no IO concerns):
//! identifiers, the collection/operation vocabulary, timestamp formatting,
//! and the error model shared by the store and the sync engine.

pub mod collection;
pub mod error;
pub mod id;
pub mod time;

pub use collection::{Collection, Operation};
pub use error::{DomainError, DomainResult};
pub use id::{ClientId, MutationId, RecordId};
