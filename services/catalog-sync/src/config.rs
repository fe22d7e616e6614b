//! 从 AppConfig 派生各组件的运行参数

use std::time::Duration;

use rust_decimal::Decimal;
use stockbridge_common::RetryConfig;
use stockbridge_config::{AppConfig, CatalogDefaultsConfig};
use stockbridge_errors::{AppError, AppResult};

use crate::application::{BatchSettings, RemoteLockSettings, WarmupSettings};
use crate::domain::gateways::PayloadDefaults;
use crate::domain::value_objects::canonicalize;
use crate::infrastructure::katana::KatanaSettings;
use crate::infrastructure::koza::KozaSettings;

/// 同步服务的全部运行参数
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub koza: KozaSettings,
    pub katana: KatanaSettings,
    pub payload: PayloadDefaults,
    pub batch: BatchSettings,
    pub warmup: WarmupSettings,
    pub retry: RetryConfig,
    pub refresh_buffer: Duration,
    pub cache_ttl: Duration,
    pub version_suffix: String,
    pub interval: Duration,
    pub warmup_on_start: bool,
    pub retry_failed_on_interval: bool,
    pub code_lock: RemoteLockSettings,
}

impl SyncSettings {
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let sync = &config.sync;

        if sync.workers == 0 {
            return Err(AppError::validation("sync.workers 必须大于 0"));
        }
        if sync.rate_limit_min_ms > sync.rate_limit_max_ms {
            return Err(AppError::validation(
                "sync.rate_limit_min_ms 不能大于 sync.rate_limit_max_ms",
            ));
        }
        if sync.code_lock_ttl_secs == 0 || sync.code_lock_wait_secs == 0 {
            return Err(AppError::validation(
                "sync.code_lock_ttl_secs 和 sync.code_lock_wait_secs 必须大于 0",
            ));
        }
        if sync.version_suffix.trim().is_empty() {
            return Err(AppError::validation("sync.version_suffix 不能为空"));
        }

        let downstream = &config.downstream;
        if downstream.refresh_buffer_secs >= downstream.session_ttl_secs {
            return Err(AppError::validation(format!(
                "downstream.refresh_buffer_secs ({}) 必须小于 downstream.session_ttl_secs ({})",
                downstream.refresh_buffer_secs, downstream.session_ttl_secs
            )));
        }
        let koza = KozaSettings {
            base_url: downstream.base_url.clone(),
            org_code: downstream.org_code.clone(),
            username: downstream.username.clone(),
            password: downstream.password.clone(),
            branch_id: downstream.branch_id,
            session_ttl: downstream.session_ttl(),
            request_timeout: Duration::from_secs(downstream.request_timeout_secs),
            duplicate_markers: downstream.duplicate_markers.clone(),
            session_expired_codes: downstream.session_expired_codes.clone(),
        };

        let katana = KatanaSettings {
            base_url: config.source.base_url.clone(),
            api_key: config.source.api_key.clone(),
            page_size: config.source.page_size.max(1),
            request_timeout: Duration::from_secs(config.source.request_timeout_secs),
        };

        let retry = RetryConfig::new(
            sync.transient_max_attempts.max(1),
            Duration::from_millis(sync.transient_initial_delay_ms),
            Duration::from_millis(sync.transient_max_delay_ms),
        )
        .with_jitter(sync.retry_jitter);

        Ok(Self {
            koza,
            katana,
            payload: payload_defaults(&config.catalog_defaults)?,
            batch: BatchSettings {
                workers: sync.workers,
                rate_limit_min: Duration::from_millis(sync.rate_limit_min_ms),
                rate_limit_max: Duration::from_millis(sync.rate_limit_max_ms),
            },
            warmup: WarmupSettings {
                page_size: sync.warmup_page_size.max(1),
                timeout: Duration::from_secs(sync.warmup_timeout_secs),
                max_pages: sync.warmup_max_pages,
            },
            retry,
            refresh_buffer: downstream.refresh_buffer(),
            cache_ttl: Duration::from_secs(sync.cache_ttl_secs),
            version_suffix: sync.version_suffix.clone(),
            interval: Duration::from_secs(sync.interval_secs.max(1)),
            warmup_on_start: sync.warmup_on_start,
            retry_failed_on_interval: sync.retry_failed_on_interval,
            code_lock: RemoteLockSettings {
                ttl: Duration::from_secs(sync.code_lock_ttl_secs),
                wait: Duration::from_secs(sync.code_lock_wait_secs),
                ..RemoteLockSettings::default()
            },
        })
    }
}

/// 映射表的键统一做规范化，与运行时的查找方式保持一致
fn payload_defaults(config: &CatalogDefaultsConfig) -> AppResult<PayloadDefaults> {
    let default_vat_rate = Decimal::from_f64_retain(config.default_vat_rate)
        .filter(|rate| !rate.is_sign_negative() && *rate <= Decimal::from(100))
        .ok_or_else(|| {
            AppError::validation(format!(
                "catalog_defaults.default_vat_rate 无效: {}",
                config.default_vat_rate
            ))
        })?
        .round_dp(4);

    Ok(PayloadDefaults {
        card_type: config.card_type,
        card_kind: config.card_kind,
        default_unit_id: config.default_unit_id,
        unit_ids: config
            .unit_ids
            .iter()
            .map(|(name, id)| (canonicalize(name), *id))
            .collect(),
        default_category_code: config
            .default_category_code
            .as_ref()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
        category_codes: config
            .category_codes
            .iter()
            .map(|(name, code)| (canonicalize(name), code.trim().to_string()))
            .collect(),
        default_vat_rate,
        sellable: config.sellable,
        purchasable: config.purchasable,
        cost_tracked: config.cost_tracked,
    })
}
