use domain::{DomainError, RepositoryError};
use thiserror::Error;

/// 对调用方同步返回的结构化错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("{resource} not found")]
    NotFound { resource: &'static str },
    #[error("authentication required")]
    Unauthenticated,
    #[error("operation cannot target yourself")]
    SelfTarget,
    #[error("users are already friends")]
    AlreadyFriends,
    #[error("friend request already sent")]
    AlreadyRequested,
    #[error("not invited to this party")]
    NotInvited,
    #[error("not in a party")]
    NotInParty,
    #[error("already a member of another party")]
    AlreadyInParty,
    #[error("{resource} already exists")]
    AlreadyExists { resource: String },
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },
    /// 并发写冲突重试次数耗尽
    #[error("concurrent update conflict, retry the operation")]
    Conflict,
    /// 外部协作方超时或不可用
    #[error("collaborator unavailable: {message}")]
    Unavailable { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl ApplicationError {
    pub fn not_found(resource: &'static str) -> Self {
        ApplicationError::NotFound { resource }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        ApplicationError::Unavailable {
            message: message.into(),
        }
    }
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidArgument { field, reason } => {
                ApplicationError::InvalidArgument { field, reason }
            }
            DomainError::SelfTarget => ApplicationError::SelfTarget,
            DomainError::AlreadyFriends => ApplicationError::AlreadyFriends,
            DomainError::AlreadyRequested => ApplicationError::AlreadyRequested,
            DomainError::NotInvited => ApplicationError::NotInvited,
            DomainError::NotInParty => ApplicationError::NotInParty,
            DomainError::AlreadyInParty => ApplicationError::AlreadyInParty,
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => ApplicationError::not_found("record"),
            RepositoryError::Conflict => ApplicationError::Conflict,
            RepositoryError::Duplicate { field } => ApplicationError::AlreadyExists { resource: field },
            RepositoryError::Storage { message } => ApplicationError::Storage { message },
        }
    }
}
