//! 基础设施层

pub mod cache;
pub mod katana;
pub mod koza;
pub mod persistence;
