//! The duka app layer: write operations over the local store, process
//! configuration, and product image upload.
//!
//! A UI embeds [`Actions`] for its writes and reads straight from the
//! [`duka_store::Store`]; the `duka` binary wires the same pieces to
//! the sync engine and runs headless.

pub mod actions;
pub mod assets;
pub mod config;
pub mod identity;

pub use actions::{Actions, NewProduct};
pub use assets::ProductImageSync;
pub use config::Config;
