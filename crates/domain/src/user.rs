use std::collections::HashMap;

use crate::errors::DomainError;
use crate::value_objects::{Icon, Nickname, Timestamp, UserId};

/// 好友申请的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestResolution {
    Accepted,
    Declined,
    /// 申请不存在，未做任何修改
    NoSuchRequest,
}

/// 用户的社交档案：展示信息加上好友关系图中属于该用户的一侧。
///
/// 好友关系和申请总是成对修改（见 [`User::send_friend_request`] 与
/// [`User::respond_to_request`]），调用方负责在同一事务中持久化双方。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: UserId,
    pub nickname: Nickname,
    pub icon: Icon,
    pub friends: Vec<UserId>,
    pub friend_requests_sent: Vec<UserId>,
    pub friend_requests_received: Vec<UserId>,
    /// 乐观并发控制版本号，每次持久化递增
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn register(id: UserId, nickname: Nickname, icon: Icon, now: Timestamp) -> Self {
        Self {
            id,
            nickname,
            icon,
            friends: Vec::new(),
            friend_requests_sent: Vec::new(),
            friend_requests_received: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_friend(&self, other: UserId) -> bool {
        self.friends.contains(&other)
    }

    pub fn has_sent_request_to(&self, other: UserId) -> bool {
        self.friend_requests_sent.contains(&other)
    }

    pub fn has_request_from(&self, other: UserId) -> bool {
        self.friend_requests_received.contains(&other)
    }

    pub fn update_profile(&mut self, nickname: Option<Nickname>, icon: Option<Icon>, now: Timestamp) {
        if let Some(nickname) = nickname {
            self.nickname = nickname;
        }
        if let Some(icon) = icon {
            self.icon = icon;
        }
        self.updated_at = now;
    }

    /// 从 `self` 向 `target` 发送好友申请，同时更新双方。
    pub fn send_friend_request(
        &mut self,
        target: &mut User,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        if self.id == target.id {
            return Err(DomainError::SelfTarget);
        }
        if self.is_friend(target.id) {
            return Err(DomainError::AlreadyFriends);
        }
        if self.has_sent_request_to(target.id) {
            return Err(DomainError::AlreadyRequested);
        }

        self.friend_requests_sent.push(target.id);
        if !target.has_request_from(self.id) {
            target.friend_requests_received.push(self.id);
        }
        self.updated_at = now;
        target.updated_at = now;
        Ok(())
    }

    /// `self` 处理来自 `requester` 的申请。
    ///
    /// 任意一侧残留的申请记录都会被清除；双方都没有记录时返回
    /// [`RequestResolution::NoSuchRequest`] 且不修改任何状态。
    pub fn respond_to_request(
        &mut self,
        requester: &mut User,
        accept: bool,
        now: Timestamp,
    ) -> RequestResolution {
        let pending = self.has_request_from(requester.id) || requester.has_sent_request_to(self.id);
        if !pending || self.id == requester.id {
            return RequestResolution::NoSuchRequest;
        }

        self.friend_requests_received.retain(|id| *id != requester.id);
        requester.friend_requests_sent.retain(|id| *id != self.id);
        self.updated_at = now;
        requester.updated_at = now;

        if !accept {
            return RequestResolution::Declined;
        }

        // 成为好友后反向的申请也失效
        self.friend_requests_sent.retain(|id| *id != requester.id);
        requester.friend_requests_received.retain(|id| *id != self.id);
        if !self.is_friend(requester.id) {
            self.friends.push(requester.id);
        }
        if !requester.is_friend(self.id) {
            requester.friends.push(self.id);
        }
        RequestResolution::Accepted
    }

    /// 剔除对端没有镜像记录的申请和单向好友关系，返回是否有修改。
    ///
    /// `peers` 是修复开始前所有档案的快照；快照中不存在的用户视为已删除。
    pub fn retain_mirrored(&mut self, peers: &HashMap<UserId, User>, now: Timestamp) -> bool {
        let id = self.id;
        let before = (
            self.friends.len(),
            self.friend_requests_sent.len(),
            self.friend_requests_received.len(),
        );

        self.friends
            .retain(|other| peers.get(other).is_some_and(|peer| peer.is_friend(id)));
        self.friend_requests_sent.retain(|other| {
            peers
                .get(other)
                .is_some_and(|peer| peer.has_request_from(id) && !peer.is_friend(id))
        });
        self.friend_requests_received.retain(|other| {
            peers
                .get(other)
                .is_some_and(|peer| peer.has_sent_request_to(id) && !peer.is_friend(id))
        });

        let after = (
            self.friends.len(),
            self.friend_requests_sent.len(),
            self.friend_requests_received.len(),
        );
        let changed = before != after;
        if changed {
            self.updated_at = now;
        }
        changed
    }
}
