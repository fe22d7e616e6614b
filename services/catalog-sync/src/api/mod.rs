//! 只读诊断接口
//!
//! 挂载在 bootstrap 的健康检查服务器上

mod error;
mod routes;

pub use error::ApiError;
pub use routes::{DiagnosticsState, router};
