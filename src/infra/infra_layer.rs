// The infra module contains implementations of core traits.

#[path = "storage/storage_backend.rs"]
pub mod storage;

pub use storage::StoreBackend;
