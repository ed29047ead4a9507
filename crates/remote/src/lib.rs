//! `duka-remote`: the wire to the hosted backend.
//!
//! Everything that leaves the device goes through the [`RemoteBackend`]
//! trait: one remote table per collection, spoken to as plain JSON rows.
//! [`PostgrestClient`] is the production implementation (a Supabase-style
//! PostgREST project); [`memory::InMemoryBackend`] is a faithful fake for
//! tests. Product images travel separately through [`ObjectStore`].

pub mod backend;
pub mod error;
pub mod memory;
pub mod postgrest;
pub mod storage;

pub use backend::RemoteBackend;
pub use error::{RemoteError, RemoteResult};
pub use memory::InMemoryBackend;
pub use postgrest::PostgrestClient;
pub use storage::{InMemoryObjectStore, ObjectStore, StorageClient};
