//! Lookup store backends for group policy records.

pub mod lookup_store;
pub mod memory;
pub mod postgres;

pub use lookup_store::{
    BatchGetOutput, BatchGetRequest, LookupStore, StoreItem, MAX_BATCH_GET_KEYS,
};
pub use memory::InMemoryLookupStore;
pub use postgres::PgLookupStore;
