use async_trait::async_trait;
use domain::UserId;

use crate::error::ApplicationError;

/// 匹配队列的入口与出口，配对算法本身不在本服务内实现
#[async_trait]
pub trait MatchmakingHook: Send + Sync {
    async fn join_queue(&self, user_id: UserId, payload: serde_json::Value) -> Result<(), ApplicationError>;
    async fn leave_queue(&self, user_id: UserId) -> Result<(), ApplicationError>;
}

/// 只记录日志的默认实现
#[derive(Debug, Default)]
pub struct LoggingMatchmakingHook;

#[async_trait]
impl MatchmakingHook for LoggingMatchmakingHook {
    async fn join_queue(&self, user_id: UserId, payload: serde_json::Value) -> Result<(), ApplicationError> {
        tracing::info!(user_id = %user_id, %payload, "joined matchmaking queue");
        Ok(())
    }

    async fn leave_queue(&self, user_id: UserId) -> Result<(), ApplicationError> {
        tracing::info!(user_id = %user_id, "left matchmaking queue");
        Ok(())
    }
}
