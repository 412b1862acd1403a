use std::collections::HashSet;

use async_trait::async_trait;
use domain::UserId;

/// 在线状态查询（只读）。用户至少有一个已认证连接即视为在线。
#[async_trait]
pub trait PresenceDirectory: Send + Sync {
    async fn is_online(&self, user_id: UserId) -> bool;

    /// 返回 `users` 中在线的那部分
    async fn online_among(&self, users: &[UserId]) -> HashSet<UserId>;
}
