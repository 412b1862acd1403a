//! 领域模型错误定义
//!
//! 定义了系统中所有可能的错误类型，提供清晰的错误上下文。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 不能对自己执行该操作
    #[error("operation cannot target yourself")]
    SelfTarget,

    #[error("users are already friends")]
    AlreadyFriends,

    #[error("friend request already sent")]
    AlreadyRequested,

    /// 用户不在派对邀请列表中
    #[error("user is not invited to this party")]
    NotInvited,

    #[error("user is not in a party")]
    NotInParty,

    /// 用户已属于另一个派对
    #[error("user already belongs to another party")]
    AlreadyInParty,
}

impl DomainError {
    /// 创建参数校验错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 仓储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    /// 乐观并发冲突：版本号不匹配
    #[error("concurrent modification detected")]
    Conflict,

    /// 唯一约束冲突
    #[error("duplicate value for {field}")]
    Duplicate { field: String },

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>) -> Self {
        Self::Duplicate {
            field: field.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
