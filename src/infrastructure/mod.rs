//! Adapters for the domain ports: storage backends, event publishers and
//! start-up seeding.

pub mod in_memory;
pub mod publisher;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod seed;
