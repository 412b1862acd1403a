use time::Duration;

use crate::errors::DomainError;
use crate::value_objects::{PartyId, Timestamp, UserId};

/// 派对生命周期状态。解散（Dissolved）的派对直接从注册表删除，因此没有对应的枚举值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PartyState {
    /// 只有发起者一人
    Forming,
    /// 至少两名成员
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// 用户已经是成员，重复加入不修改状态
    AlreadyMember,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// 最后一名成员离开，派对应被删除，剩余邀请一并作废
    Dissolved,
    /// 仍有成员；若离开的是队长，`new_leader` 为接任者
    Remaining { new_leader: Option<UserId> },
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub leader_id: UserId,
    /// 按加入顺序排列，不含重复
    pub members: Vec<UserId>,
    pub invites: Vec<UserId>,
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Party {
    /// 默认存活时间，超时后无论是否活跃都视为过期
    pub const DEFAULT_TTL: Duration = Duration::hours(24);

    /// 以 `leader` 为唯一成员创建派对
    pub fn form(id: PartyId, leader: UserId, now: Timestamp) -> Self {
        Self {
            id,
            leader_id: leader,
            members: vec![leader],
            invites: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> PartyState {
        if self.members.len() >= 2 {
            PartyState::Active
        } else {
            PartyState::Forming
        }
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }

    pub fn is_invited(&self, user: UserId) -> bool {
        self.invites.contains(&user)
    }

    pub fn expires_at(&self, ttl: Duration) -> Timestamp {
        self.created_at + ttl
    }

    pub fn is_expired(&self, now: Timestamp, ttl: Duration) -> bool {
        now >= self.expires_at(ttl)
    }

    /// 邀请 `target`，已被邀请或已是成员时不做修改并返回 `false`。
    pub fn invite(&mut self, target: UserId, now: Timestamp) -> bool {
        if self.is_member(target) || self.is_invited(target) {
            return false;
        }
        self.invites.push(target);
        self.updated_at = now;
        true
    }

    pub fn join(&mut self, user: UserId, now: Timestamp) -> Result<JoinOutcome, DomainError> {
        if self.is_member(user) {
            return Ok(JoinOutcome::AlreadyMember);
        }
        if !self.is_invited(user) {
            return Err(DomainError::NotInvited);
        }
        self.invites.retain(|id| *id != user);
        self.members.push(user);
        self.updated_at = now;
        Ok(JoinOutcome::Joined)
    }

    pub fn leave(&mut self, user: UserId, now: Timestamp) -> Result<LeaveOutcome, DomainError> {
        if !self.is_member(user) {
            return Err(DomainError::NotInParty);
        }
        self.members.retain(|id| *id != user);
        self.updated_at = now;

        let Some(&successor) = self.members.first() else {
            self.invites.clear();
            return Ok(LeaveOutcome::Dissolved);
        };

        if self.leader_id == user {
            self.leader_id = successor;
            return Ok(LeaveOutcome::Remaining {
                new_leader: Some(successor),
            });
        }
        Ok(LeaveOutcome::Remaining { new_leader: None })
    }
}
