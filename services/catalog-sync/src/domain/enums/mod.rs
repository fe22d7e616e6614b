//! 枚举模块

mod mapping_status;

pub use mapping_status::{MappingStatus, UnknownMappingStatus};
