//! 领域层
//!
//! 实体、值对象、枚举、仓储接口、外部网关接口和版本决策

pub mod entities;
pub mod enums;
pub mod gateways;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use enums::*;
pub use gateways::*;
pub use repositories::*;
pub use services::*;
pub use value_objects::*;
