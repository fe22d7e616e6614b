//! stockbridge-config - 配置加载库

use std::collections::HashMap;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use thiserror::Error;

use secrecy::Secret;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => 20,
        _ => 5,
    }
}

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Secret<String>,
}

/// 服务器配置（健康检查 / 诊断端点）
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// 上游（Katana）配置
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// 下游（Luca / Koza）配置
#[derive(Debug, Clone, Deserialize)]
pub struct DownstreamConfig {
    pub base_url: String,
    pub org_code: String,
    pub username: String,
    pub password: Secret<String>,
    /// 登录后需要选择的分支（可选）
    pub branch_id: Option<i64>,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_refresh_buffer_secs")]
    pub refresh_buffer_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 表示 "编码已存在" 的响应片段（小写匹配）
    #[serde(default = "default_duplicate_markers")]
    pub duplicate_markers: Vec<String>,
    /// 表示会话失效的业务错误码
    #[serde(default = "default_session_expired_codes")]
    pub session_expired_codes: Vec<i64>,
}

fn default_session_ttl_secs() -> u64 {
    20 * 60
}

fn default_refresh_buffer_secs() -> u64 {
    2 * 60
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    100
}

/// 已知的重复编码提示语
pub fn default_duplicate_markers() -> Vec<String> {
    [
        "daha önce kullanılmış",
        "daha once kullanilmis",
        "kart kodu daha",
        "kart kodu var",
        "kayıt var",
        "zaten mevcut",
        "already exists",
        "duplicate",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_session_expired_codes() -> Vec<i64> {
    vec![1003]
}

impl DownstreamConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }
}

/// 下游库存卡片的默认值
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogDefaultsConfig {
    #[serde(default = "default_card_type")]
    pub card_type: i32,
    #[serde(default = "default_card_kind")]
    pub card_kind: i32,
    #[serde(default = "default_unit_id")]
    pub default_unit_id: i64,
    /// 单位名称（大写） -> 下游单位 id
    #[serde(default)]
    pub unit_ids: HashMap<String, i64>,
    pub default_category_code: Option<String>,
    /// 上游分类名称 -> 下游分类编码
    #[serde(default)]
    pub category_codes: HashMap<String, String>,
    #[serde(default = "default_vat_rate")]
    pub default_vat_rate: f64,
    #[serde(default = "default_true")]
    pub sellable: bool,
    #[serde(default = "default_true")]
    pub purchasable: bool,
    #[serde(default = "default_true")]
    pub cost_tracked: bool,
}

fn default_card_type() -> i32 {
    1
}

fn default_card_kind() -> i32 {
    1
}

fn default_unit_id() -> i64 {
    5
}

fn default_vat_rate() -> f64 {
    20.0
}

fn default_true() -> bool {
    true
}

impl Default for CatalogDefaultsConfig {
    fn default() -> Self {
        Self {
            card_type: default_card_type(),
            card_kind: default_card_kind(),
            default_unit_id: default_unit_id(),
            unit_ids: HashMap::new(),
            default_category_code: None,
            category_codes: HashMap::new(),
            default_vat_rate: default_vat_rate(),
            sellable: true,
            purchasable: true,
            cost_tracked: true,
        }
    }
}

/// 同步引擎配置
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_rate_limit_min_ms")]
    pub rate_limit_min_ms: u64,
    #[serde(default = "default_rate_limit_max_ms")]
    pub rate_limit_max_ms: u64,
    #[serde(default = "default_transient_max_attempts")]
    pub transient_max_attempts: u32,
    #[serde(default = "default_transient_initial_delay_ms")]
    pub transient_initial_delay_ms: u64,
    #[serde(default = "default_transient_max_delay_ms")]
    pub transient_max_delay_ms: u64,
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: f64,
    #[serde(default = "default_true")]
    pub warmup_on_start: bool,
    #[serde(default = "default_page_size")]
    pub warmup_page_size: u32,
    #[serde(default = "default_warmup_timeout_secs")]
    pub warmup_timeout_secs: u64,
    #[serde(default = "default_warmup_max_pages")]
    pub warmup_max_pages: u32,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_version_suffix")]
    pub version_suffix: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// 每轮周期同步后重试失败的映射
    #[serde(default)]
    pub retry_failed_on_interval: bool,
    /// 跨进程编码锁的过期时间，需覆盖一次查找加创建（含重试）的最长耗时
    #[serde(default = "default_code_lock_ttl_secs")]
    pub code_lock_ttl_secs: u64,
    /// 等待其他进程释放编码锁的最长时间
    #[serde(default = "default_code_lock_wait_secs")]
    pub code_lock_wait_secs: u64,
}

fn default_workers() -> usize {
    2
}

fn default_rate_limit_min_ms() -> u64 {
    350
}

fn default_rate_limit_max_ms() -> u64 {
    1000
}

fn default_transient_max_attempts() -> u32 {
    4
}

fn default_transient_initial_delay_ms() -> u64 {
    500
}

fn default_transient_max_delay_ms() -> u64 {
    4000
}

fn default_retry_jitter() -> f64 {
    0.2
}

fn default_warmup_timeout_secs() -> u64 {
    120
}

fn default_warmup_max_pages() -> u32 {
    500
}

fn default_interval_secs() -> u64 {
    300
}

fn default_version_suffix() -> String {
    "-V".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_code_lock_ttl_secs() -> u64 {
    300
}

fn default_code_lock_wait_secs() -> u64 {
    330
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            rate_limit_min_ms: default_rate_limit_min_ms(),
            rate_limit_max_ms: default_rate_limit_max_ms(),
            transient_max_attempts: default_transient_max_attempts(),
            transient_initial_delay_ms: default_transient_initial_delay_ms(),
            transient_max_delay_ms: default_transient_max_delay_ms(),
            retry_jitter: default_retry_jitter(),
            warmup_on_start: true,
            warmup_page_size: default_page_size(),
            warmup_timeout_secs: default_warmup_timeout_secs(),
            warmup_max_pages: default_warmup_max_pages(),
            interval_secs: default_interval_secs(),
            version_suffix: default_version_suffix(),
            cache_ttl_secs: default_cache_ttl_secs(),
            retry_failed_on_interval: false,
            code_lock_ttl_secs: default_code_lock_ttl_secs(),
            code_lock_wait_secs: default_code_lock_wait_secs(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub app_env: String,
    pub database: DatabaseConfig,
    /// 未配置时使用进程内缓存
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    pub source: SourceConfig,
    pub downstream: DownstreamConfig,
    #[serde(default)]
    pub catalog_defaults: CatalogDefaultsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(format!("{}/default.toml", config_dir)))
                .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
                .merge(Env::prefixed("").split("__")),
        )
    }

    /// 从已组装好的 Figment 提取配置
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        Ok(figment.extract()?)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
