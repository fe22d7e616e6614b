//! 内存仓储
//!
//! 与 PostgreSQL 实现遵守同样的约束：每个产品最多一条活跃映射，版本号不重复

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use stockbridge_errors::{AppError, AppResult};

use crate::domain::entities::ProductMapping;
use crate::domain::enums::MappingStatus;
use crate::domain::repositories::MappingRepository;
use crate::domain::value_objects::{MappingId, SourceProductId};

#[derive(Debug, Default)]
pub struct InMemoryMappingRepository {
    /// source_id -> 全部版本（按版本号升序）
    rows: RwLock<HashMap<SourceProductId, Vec<ProductMapping>>>,
}

impl InMemoryMappingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部行数（含已取代）
    pub fn len(&self) -> usize {
        self.rows.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_insertable(versions: &[ProductMapping], mapping: &ProductMapping) -> AppResult<()> {
        if versions.iter().any(|m| m.is_active()) {
            return Err(AppError::conflict(format!(
                "产品 {} 已存在活跃映射",
                mapping.source_id()
            )));
        }
        if versions.iter().any(|m| m.version() >= mapping.version()) {
            return Err(AppError::conflict(format!(
                "产品 {} 的版本 {} 已被使用",
                mapping.source_id(),
                mapping.version()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MappingRepository for InMemoryMappingRepository {
    async fn find_active(&self, source_id: &SourceProductId) -> AppResult<Option<ProductMapping>> {
        Ok(self
            .rows
            .read()
            .get(source_id)
            .and_then(|versions| versions.iter().find(|m| m.is_active()).cloned()))
    }

    async fn find_by_id(&self, id: &MappingId) -> AppResult<Option<ProductMapping>> {
        Ok(self
            .rows
            .read()
            .values()
            .flatten()
            .find(|m| m.id() == id)
            .cloned())
    }

    async fn insert_first(&self, mapping: &ProductMapping) -> AppResult<()> {
        let mut rows = self.rows.write();
        let versions = rows.entry(mapping.source_id().clone()).or_default();
        Self::check_insertable(versions, mapping)?;
        versions.push(mapping.clone());
        Ok(())
    }

    async fn supersede_and_append(
        &self,
        previous: &ProductMapping,
        next: &ProductMapping,
    ) -> AppResult<()> {
        let mut rows = self.rows.write();
        let versions = rows
            .get_mut(previous.source_id())
            .ok_or_else(|| AppError::not_found(format!("映射 {} 不存在", previous.id())))?;

        let index = versions
            .iter()
            .position(|m| m.id() == previous.id())
            .ok_or_else(|| AppError::not_found(format!("映射 {} 不存在", previous.id())))?;
        if !versions[index].is_active() {
            return Err(AppError::conflict(format!(
                "映射 {} 已被其他版本取代",
                previous.id()
            )));
        }

        let mut superseded = versions[index].clone();
        superseded.supersede();
        let mut staged = versions.clone();
        staged[index] = superseded;
        Self::check_insertable(&staged, next)?;
        staged.push(next.clone());
        *versions = staged;
        Ok(())
    }

    async fn save_outcome(&self, mapping: &ProductMapping) -> AppResult<()> {
        let mut rows = self.rows.write();
        let slot = rows
            .get_mut(mapping.source_id())
            .and_then(|versions| versions.iter_mut().find(|m| m.id() == mapping.id()))
            .filter(|m| m.is_active())
            .ok_or_else(|| {
                AppError::conflict(format!("映射 {} 不存在或已被取代", mapping.id()))
            })?;
        *slot = mapping.clone();
        Ok(())
    }

    async fn find_by_status(
        &self,
        status: MappingStatus,
        limit: u32,
    ) -> AppResult<Vec<ProductMapping>> {
        let rows = self.rows.read();
        let mut found: Vec<ProductMapping> = rows
            .values()
            .flatten()
            .filter(|m| m.status() == status)
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.updated_at()
                .cmp(&b.updated_at())
                .then_with(|| a.source_id().cmp(b.source_id()))
        });
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn history(&self, source_id: &SourceProductId) -> AppResult<Vec<ProductMapping>> {
        Ok(self.rows.read().get(source_id).cloned().unwrap_or_default())
    }
}
