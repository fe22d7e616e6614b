//! Redis 连接

use redis::Client;
use redis::aio::ConnectionManager;
use secrecy::{ExposeSecret, Secret};
use stockbridge_errors::{AppError, AppResult};

/// 打开自动重连的连接管理器
pub async fn connect(url: &Secret<String>) -> AppResult<ConnectionManager> {
    let client = Client::open(url.expose_secret().as_str())
        .map_err(|e| AppError::cache(format!("Invalid Redis URL: {:?}", e.kind())))?;

    ConnectionManager::new(client)
        .await
        .map_err(|e| AppError::cache(format!("Redis connection failed: {}", e)))
}

pub async fn ping(conn: &mut ConnectionManager) -> AppResult<()> {
    let reply: String = redis::cmd("PING")
        .query_async(conn)
        .await
        .map_err(|e| AppError::cache(format!("Redis ping failed: {}", e)))?;
    if reply != "PONG" {
        return Err(AppError::cache(format!("unexpected PING reply: {}", reply)));
    }
    Ok(())
}
