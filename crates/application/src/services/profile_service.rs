use std::sync::Arc;

use domain::{Icon, Nickname, User, UserId};
use rand::Rng;
use uuid::Uuid;

use crate::{
    clock::Clock,
    dto::ProfileDto,
    error::ApplicationError,
    locks::{AggregateLocks, LockKey},
    repository::ProfileRepository,
    retry::{retry_on_conflict, RetryPolicy},
};

#[derive(Debug, Clone, Default)]
pub struct UpdateProfileRequest {
    pub nickname: Option<String>,
    pub icon: Option<String>,
}

pub struct ProfileServiceDependencies {
    pub profiles: Arc<dyn ProfileRepository>,
    pub locks: Arc<AggregateLocks>,
    pub clock: Arc<dyn Clock>,
    pub retry: RetryPolicy,
}

/// 社交档案的创建与维护
pub struct ProfileService {
    deps: ProfileServiceDependencies,
}

impl ProfileService {
    pub fn new(deps: ProfileServiceDependencies) -> Self {
        Self { deps }
    }

    fn parse_nickname(raw: String) -> Result<Nickname, ApplicationError> {
        let nickname = Nickname::parse(raw)?;
        // 好友申请按 uid 或昵称查找，昵称不能与 uid 混淆
        if Uuid::parse_str(nickname.as_str()).is_ok() {
            return Err(ApplicationError::InvalidArgument {
                field: "nickname".into(),
                reason: "cannot look like a uid".into(),
            });
        }
        Ok(nickname)
    }

    async fn ensure_nickname_free(&self, nickname: &Nickname, owner: Option<UserId>) -> Result<(), ApplicationError> {
        let existing = self.deps.profiles.find_by_nickname(nickname.as_str()).await?;
        if existing.is_some_and(|user| Some(user.id) != owner) {
            return Err(ApplicationError::AlreadyExists {
                resource: "nickname".into(),
            });
        }
        Ok(())
    }

    /// 以随机调色板图标创建档案
    pub async fn register(&self, nickname: String) -> Result<ProfileDto, ApplicationError> {
        let nickname = Self::parse_nickname(nickname)?;
        self.ensure_nickname_free(&nickname, None).await?;

        let icon = Icon::from_palette(rand::rng().random_range(0..Icon::PALETTE.len()));
        let user = User::register(
            UserId::from(Uuid::new_v4()),
            nickname,
            icon,
            self.deps.clock.now(),
        );
        let stored = self.deps.profiles.create(user).await?;
        tracing::info!(user_id = %stored.id, nickname = %stored.nickname, "profile registered");
        Ok(ProfileDto::from(&stored))
    }

    pub async fn me(&self, user_id: UserId) -> Result<ProfileDto, ApplicationError> {
        let user = self
            .deps
            .profiles
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("profile"))?;
        Ok(ProfileDto::from(&user))
    }

    pub async fn update_profile(
        &self,
        user_id: UserId,
        request: UpdateProfileRequest,
    ) -> Result<ProfileDto, ApplicationError> {
        let nickname = request.nickname.map(Self::parse_nickname).transpose()?;
        let icon = request.icon.map(Icon::parse).transpose()?;

        retry_on_conflict(&self.deps.retry, "update_profile", || async {
            let _locks = self.deps.locks.acquire([LockKey::User(user_id)]).await;
            let mut user = self
                .deps
                .profiles
                .find_by_id(user_id)
                .await?
                .ok_or_else(|| ApplicationError::not_found("profile"))?;

            if let Some(nickname) = &nickname {
                self.ensure_nickname_free(nickname, Some(user_id)).await?;
            }
            user.update_profile(nickname.clone(), icon.clone(), self.deps.clock.now());
            let stored = self.deps.profiles.update(user).await?;
            Ok(ProfileDto::from(&stored))
        })
        .await
    }
}
