//! 持久化

mod converters;
mod memory;
mod migrations;
mod postgres;
mod rows;

pub use memory::InMemoryMappingRepository;
pub use migrations::migrations;
pub use postgres::PostgresMappingRepository;
