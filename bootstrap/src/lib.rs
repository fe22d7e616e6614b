//! stockbridge-bootstrap - 统一服务启动骨架
//!
//! 配置加载、基础设施创建、健康检查 / 指标服务器和优雅关闭

mod health;
mod infrastructure;
mod metrics;
mod runtime;
mod server;

pub use health::*;
pub use infrastructure::*;
pub use metrics::*;
pub use runtime::*;
pub use server::*;
