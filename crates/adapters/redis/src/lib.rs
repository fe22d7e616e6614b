//! stockbridge-adapter-redis - Redis 适配器

mod cache;
mod connection;
mod health;
mod lock;

pub use cache::*;
pub use connection::*;
pub use health::*;
pub use lock::*;
