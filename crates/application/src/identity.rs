//! 身份与会话协作方接口

use std::sync::Arc;

use async_trait::async_trait;
use domain::{Icon, Nickname, UserId};
use thiserror::Error;

use crate::repository::ProfileRepository;

/// 身份服务返回的展示信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProfile {
    pub uid: UserId,
    pub nickname: Nickname,
    pub icon: Icon,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("user not found")]
    NotFound,
    #[error("identity store unavailable: {0}")]
    Unavailable(String),
}

/// 把 uid 或昵称解析为用户
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn resolve_user(&self, query: &str) -> Result<IdentityProfile, IdentityError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid or expired session")]
    Unauthenticated,
    #[error("session service unavailable: {0}")]
    Unavailable(String),
}

/// 会话凭证校验
#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    async fn current_uid(&self, credential: &str) -> Result<UserId, SessionError>;
}

/// 基于档案仓储的身份解析：先按 uid 查找，失败再按昵称查找。
pub struct ProfileIdentityStore {
    profiles: Arc<dyn ProfileRepository>,
}

impl ProfileIdentityStore {
    pub fn new(profiles: Arc<dyn ProfileRepository>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl IdentityStore for ProfileIdentityStore {
    async fn resolve_user(&self, query: &str) -> Result<IdentityProfile, IdentityError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(IdentityError::NotFound);
        }

        let unavailable = |err: domain::RepositoryError| IdentityError::Unavailable(err.to_string());

        let by_id = match query.parse::<UserId>() {
            Ok(uid) => self.profiles.find_by_id(uid).await.map_err(unavailable)?,
            Err(_) => None,
        };
        let user = match by_id {
            Some(user) => Some(user),
            None => self
                .profiles
                .find_by_nickname(query)
                .await
                .map_err(unavailable)?,
        };

        user.map(|user| IdentityProfile {
            uid: user.id,
            nickname: user.nickname,
            icon: user.icon,
        })
        .ok_or(IdentityError::NotFound)
    }
}
