//! 仓储接口模块

mod mapping_repository;

pub use mapping_repository::MappingRepository;
