use async_trait::async_trait;
use domain::Notification;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 把通知投递给收件人的在线连接。
///
/// 投递是尽力而为的：调用方记录错误后继续，不影响已经提交的状态变更。
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, notification: Notification) -> Result<(), BroadcastError>;
}
