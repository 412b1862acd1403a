use async_trait::async_trait;
use domain::{Party, PartyId, RepositoryError, Timestamp, User, UserId};

/// 用户社交档案仓储。
///
/// 所有写操作都按 `version` 做乐观并发检查：存储中的版本与传入聚合的版本不一致时
/// 返回 [`RepositoryError::Conflict`]，成功时返回版本号加一后的聚合。
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// 新建档案，昵称重复时返回 `Duplicate`
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn update(&self, user: User) -> Result<User, RepositoryError>;
    /// 在同一事务中保存两个档案，任意一方版本冲突则都不写入
    async fn save_pair(&self, first: User, second: User) -> Result<(User, User), RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_nickname(&self, nickname: &str) -> Result<Option<User>, RepositoryError>;
    /// 按 `ids` 的顺序返回存在的档案
    async fn find_many(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<User>, RepositoryError>;
}

#[async_trait]
pub trait PartyRepository: Send + Sync {
    /// 每个用户至多属于一个派对：任一成员已在其他派对时返回 `Duplicate { field: "member" }`
    async fn create(&self, party: Party) -> Result<Party, RepositoryError>;
    /// 版本不匹配返回 `Conflict`，成员归属冲突与 `create` 相同
    async fn update(&self, party: Party) -> Result<Party, RepositoryError>;
    /// 按版本删除，版本不匹配时返回 `Conflict`
    async fn delete(&self, id: PartyId, expected_version: i64) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: PartyId) -> Result<Option<Party>, RepositoryError>;
    /// 返回该成员所属的派对
    async fn find_by_member(&self, user: UserId) -> Result<Option<Party>, RepositoryError>;
    /// 删除 `cutoff` 之前创建的派对，返回删除数量
    async fn delete_created_before(&self, cutoff: Timestamp) -> Result<u64, RepositoryError>;
}
