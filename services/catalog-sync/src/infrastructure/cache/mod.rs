//! 编码缓存及其后端

mod code_cache;
mod memory_store;

pub use code_cache::{CacheStatus, CodeCache, DEFAULT_CACHE_KEY};
pub use memory_store::MemoryCacheStore;
