//! 强类型 ID 定义

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// 映射记录 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From)]
#[display("{_0}")]
pub struct MappingId(pub Uuid);

impl MappingId {
    pub fn new() -> Self {
        Self(stockbridge_common::new_id())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for MappingId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for MappingId {
    fn default() -> Self {
        Self::new()
    }
}

/// 上游产品 ID（Katana 变体 ID）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct SourceProductId(String);

impl SourceProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceProductId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourceProductId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// 下游库存卡片 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From)]
#[display("{_0}")]
pub struct DownstreamId(pub i64);

impl DownstreamId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl FromStr for DownstreamId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}
