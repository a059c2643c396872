#![warn(clippy::unwrap_used)]

pub mod client;
pub mod eviction;
pub mod keys;
pub mod memory;
pub mod repository;
pub mod store;

pub use client::RedisStore;
pub use eviction::{EvictionPolicy, LRU_INDEX_KEY};
pub use memory::MemoryStore;
pub use repository::CachedSleepRecordRepository;
pub use store::{connect, CacheStore};
