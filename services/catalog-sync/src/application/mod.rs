//! 应用层
//!
//! 会话管理、下游调用重试、upsert 编排、批处理、缓存预热、查询、同步处理器和周期任务

pub mod batch;
pub mod code_locks;
pub mod handler;
pub mod invoker;
pub mod queries;
pub mod scheduler;
pub mod session;
pub mod upsert;
pub mod warmup;

pub use batch::{BatchItemReport, BatchRunner, BatchSettings, BatchSummary, ItemStatus};
pub use code_locks::{CodeLocks, LockWaitError, RemoteLockSettings};
pub use handler::SyncHandler;
pub use invoker::{DownstreamInvoker, InvokeError};
pub use queries::MappingQueries;
pub use scheduler::SyncScheduler;
pub use session::{SessionManager, SessionStats};
pub use upsert::{SyncedVia, UpsertOrchestrator, UpsertOutcome, UpsertStatus};
pub use warmup::{WarmupReport, WarmupService, WarmupSettings, WarmupStop};
