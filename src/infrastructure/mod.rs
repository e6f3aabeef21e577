//! Storage and queue adapters implementing the domain ports.

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
mod staging;
