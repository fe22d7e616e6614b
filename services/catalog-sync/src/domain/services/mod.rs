//! 领域服务

mod versioning;

pub use versioning::{VersionDecision, VersioningPolicy};
