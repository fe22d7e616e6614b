//! 集成测试共用的假实现

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use catalog_sync::application::{
    BatchRunner, BatchSettings, DownstreamInvoker, SessionManager, SyncHandler, UpsertOrchestrator,
};
use catalog_sync::domain::entities::SourceProduct;
use catalog_sync::domain::gateways::{
    DownstreamError, DownstreamGateway, DownstreamRecord, DownstreamResult, DownstreamSession,
    PayloadDefaults, SourceGateway, StockCardPayload,
};
use catalog_sync::domain::services::VersioningPolicy;
use catalog_sync::domain::value_objects::{CanonicalCode, DownstreamId, SourceProductId};
use catalog_sync::infrastructure::cache::{CodeCache, MemoryCacheStore};
use catalog_sync::infrastructure::persistence::InMemoryMappingRepository;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use stockbridge_common::{Pagination, RetryConfig};
use stockbridge_errors::AppResult;

/// 可编排的下游假实现
///
/// 内部维护 编码 -> id 的"远端"存储，创建时分配递增 id
pub struct FakeDownstream {
    pub logins: AtomicU32,
    pub finds: AtomicU32,
    pub creates: AtomicU32,
    records: Mutex<HashMap<String, DownstreamId>>,
    /// 第一次对该编码发起 create 时才出现的记录（模拟其他写入方抢先创建）
    late_records: Mutex<HashMap<String, DownstreamId>>,
    next_id: AtomicI64,
    find_script: Mutex<VecDeque<DownstreamError>>,
    create_script: Mutex<VecDeque<DownstreamError>>,
    /// 创建请求在远端"处理"所需的时间
    create_delay: Duration,
    /// 远端已存在编码时，create 是否返回冲突（否则静默重复创建）
    reject_duplicates: bool,
    created_payloads: Mutex<Vec<StockCardPayload>>,
}

impl FakeDownstream {
    pub fn new() -> Self {
        Self {
            logins: AtomicU32::new(0),
            finds: AtomicU32::new(0),
            creates: AtomicU32::new(0),
            records: Mutex::new(HashMap::new()),
            late_records: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1000),
            find_script: Mutex::new(VecDeque::new()),
            create_script: Mutex::new(VecDeque::new()),
            create_delay: Duration::ZERO,
            reject_duplicates: true,
            created_payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    /// 远端接受重复编码（用于验证本地不会重复创建）
    pub fn accepting_duplicates(mut self) -> Self {
        self.reject_duplicates = false;
        self
    }

    pub fn with_record(self, code: &str, id: i64) -> Self {
        self.records.lock().insert(code.to_string(), DownstreamId(id));
        self
    }

    pub fn with_late_record(self, code: &str, id: i64) -> Self {
        self.late_records.lock().insert(code.to_string(), DownstreamId(id));
        self
    }

    /// 接下来的 find 调用依次返回这些错误
    pub fn fail_finds(&self, errors: impl IntoIterator<Item = DownstreamError>) {
        self.find_script.lock().extend(errors);
    }

    /// 接下来的 create 调用依次返回这些错误
    pub fn fail_creates(&self, errors: impl IntoIterator<Item = DownstreamError>) {
        self.create_script.lock().extend(errors);
    }

    pub fn login_count(&self) -> u32 {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn find_count(&self) -> u32 {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn record(&self, code: &str) -> Option<DownstreamId> {
        self.records.lock().get(code).copied()
    }

    pub fn created_payloads(&self) -> Vec<StockCardPayload> {
        self.created_payloads.lock().clone()
    }
}

#[async_trait]
impl DownstreamGateway for FakeDownstream {
    async fn login(&self) -> DownstreamResult<DownstreamSession> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(DownstreamSession {
            token: format!("JSESSION-{:04}-TOKEN", n),
            expires_at: Utc::now() + chrono::Duration::minutes(20),
        })
    }

    async fn find_by_code(
        &self,
        _token: &str,
        code: &CanonicalCode,
    ) -> DownstreamResult<Option<DownstreamId>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.find_script.lock().pop_front() {
            return Err(err);
        }
        Ok(self.records.lock().get(code.as_str()).copied())
    }

    async fn create(
        &self,
        _token: &str,
        payload: &StockCardPayload,
    ) -> DownstreamResult<Option<DownstreamId>> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if let Some(id) = self.late_records.lock().remove(&payload.kart_kodu) {
            self.records.lock().insert(payload.kart_kodu.clone(), id);
        }
        if let Some(err) = self.create_script.lock().pop_front() {
            return Err(err);
        }
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }

        let mut records = self.records.lock();
        if let Some(existing) = records.get(&payload.kart_kodu) {
            if self.reject_duplicates {
                return Err(DownstreamError::Conflict {
                    existing_id: Some(*existing),
                    message: "Kart kodu daha önce kullanılmış".to_string(),
                });
            }
        }
        let id = DownstreamId(self.next_id.fetch_add(1, Ordering::SeqCst));
        records.insert(payload.kart_kodu.clone(), id);
        self.created_payloads.lock().push(payload.clone());
        Ok(Some(id))
    }

    async fn list_page(
        &self,
        _token: &str,
        page: Pagination,
    ) -> DownstreamResult<Vec<DownstreamRecord>> {
        let mut all: Vec<DownstreamRecord> = self
            .records
            .lock()
            .iter()
            .map(|(code, id)| DownstreamRecord {
                code: code.clone(),
                id: *id,
            })
            .collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(all
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size as usize)
            .collect())
    }
}

/// 返回固定产品列表的上游假实现
#[derive(Default)]
pub struct FakeSource {
    products: Mutex<Vec<SourceProduct>>,
    pub calls: Mutex<Vec<Option<DateTime<Utc>>>>,
}

impl FakeSource {
    pub fn new(products: Vec<SourceProduct>) -> Self {
        Self {
            products: Mutex::new(products),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replace(&self, products: Vec<SourceProduct>) {
        *self.products.lock() = products;
    }
}

#[async_trait]
impl SourceGateway for FakeSource {
    async fn fetch_changed_products(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<SourceProduct>> {
        self.calls.lock().push(since);
        Ok(self.products.lock().clone())
    }
}

/// 组装好的测试环境
pub struct Harness {
    pub downstream: Arc<FakeDownstream>,
    pub store: Arc<MemoryCacheStore>,
    pub cache: Arc<CodeCache>,
    pub repository: Arc<InMemoryMappingRepository>,
    pub sessions: Arc<SessionManager>,
    pub invoker: Arc<DownstreamInvoker>,
    pub orchestrator: Arc<UpsertOrchestrator>,
}

impl Harness {
    pub fn new(downstream: FakeDownstream) -> Self {
        let downstream = Arc::new(downstream);
        let store = Arc::new(MemoryCacheStore::new());
        let cache = Arc::new(CodeCache::new(store.clone()));
        let repository = Arc::new(InMemoryMappingRepository::new());
        let sessions = Arc::new(SessionManager::new(
            downstream.clone(),
            Duration::from_secs(120),
        ));
        let invoker = Arc::new(DownstreamInvoker::new(
            downstream.clone(),
            sessions.clone(),
            retry_config(),
        ));
        let orchestrator = Arc::new(UpsertOrchestrator::new(
            cache.clone(),
            invoker.clone(),
            repository.clone(),
            PayloadDefaults::default(),
        ));
        Self {
            downstream,
            store,
            cache,
            repository,
            sessions,
            invoker,
            orchestrator,
        }
    }

    pub fn batch(&self, workers: usize) -> BatchRunner {
        BatchRunner::new(
            self.orchestrator.clone(),
            BatchSettings {
                workers,
                rate_limit_min: Duration::ZERO,
                rate_limit_max: Duration::ZERO,
            },
        )
    }

    pub fn handler(&self, source: Arc<FakeSource>, workers: usize) -> SyncHandler {
        SyncHandler::new(
            source,
            self.repository.clone(),
            VersioningPolicy::default(),
            self.batch(workers),
        )
    }
}

pub fn retry_config() -> RetryConfig {
    RetryConfig::new(4, Duration::from_millis(500), Duration::from_secs(4))
}

pub fn product(id: &str, code: &str, name: &str) -> SourceProduct {
    SourceProduct::new(SourceProductId::new(id), code, name)
}
