//! Record types synchronized between the local store and the remote backend.
//!
//! This crate contains the business record shapes and their deterministic
//! logic (stock classification, sale math, mutation payload validation). It
//! performs no IO; persistence lives in `duka-store`.

pub mod mutation;
pub mod notification;
pub mod product;
pub mod sale;
pub mod setting;

pub use mutation::{MAX_SYNC_ATTEMPTS, Mutation, MutationPayload, MutationStatus};
pub use notification::{NotificationKind, NotificationRecord};
pub use product::{DEFAULT_LOW_STOCK_LEVEL, ProductRecord, StockLevel};
pub use sale::SaleRecord;
pub use setting::SettingRecord;
