//! 映射状态枚举

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// 产品映射状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingStatus {
    /// 等待同步
    #[default]
    Pending,
    /// 已同步到下游
    Synced,
    /// 同步失败
    Failed,
    /// 已被新版本取代
    Superseded,
}

impl MappingStatus {
    /// 是否为活跃映射（未被取代）
    pub fn is_active(&self) -> bool {
        !matches!(self, MappingStatus::Superseded)
    }

    /// 数据库中的文本表示
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingStatus::Pending => "PENDING",
            MappingStatus::Synced => "SYNCED",
            MappingStatus::Failed => "FAILED",
            MappingStatus::Superseded => "SUPERSEDED",
        }
    }
}

impl std::fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("未知的映射状态: {0}")]
pub struct UnknownMappingStatus(pub String);

impl FromStr for MappingStatus {
    type Err = UnknownMappingStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(MappingStatus::Pending),
            "SYNCED" => Ok(MappingStatus::Synced),
            "FAILED" => Ok(MappingStatus::Failed),
            "SUPERSEDED" => Ok(MappingStatus::Superseded),
            other => Err(UnknownMappingStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!("synced".parse::<MappingStatus>(), Ok(MappingStatus::Synced));
        assert_eq!(" SUPERSEDED ".parse::<MappingStatus>(), Ok(MappingStatus::Superseded));
        assert!("DELETED".parse::<MappingStatus>().is_err());
    }

    #[test]
    fn test_only_superseded_is_inactive() {
        assert!(MappingStatus::Pending.is_active());
        assert!(MappingStatus::Failed.is_active());
        assert!(!MappingStatus::Superseded.is_active());
    }
}
