//! 实时通知事件
//!
//! 定义派对与好友系统推送给客户端的固定事件词汇，以及附带收件人的通知包。

use serde::{Deserialize, Serialize};

use crate::value_objects::{PartyId, UserId};

/// 推送给客户端的状态变更事件
///
/// 序列化为 `{"event": "<name>", "data": {...}}`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum SocialEvent {
    #[serde(rename_all = "camelCase")]
    FriendRequestReceived {
        from_uid: UserId,
        from_nickname: String,
        to_uid: UserId,
    },

    /// `from_uid` 接受了 `to_uid` 发出的申请
    #[serde(rename_all = "camelCase")]
    FriendRequestAccepted { from_uid: UserId, to_uid: UserId },

    #[serde(rename_all = "camelCase")]
    PartyInviteReceived {
        party_id: PartyId,
        from_uid: UserId,
        from_nickname: String,
        to_uid: UserId,
    },

    #[serde(rename_all = "camelCase")]
    PartyMemberJoined {
        party_id: PartyId,
        uid: UserId,
        nickname: String,
    },

    /// 成员离开；派对解散时 `leader_id` 为空
    #[serde(rename_all = "camelCase")]
    PartyMemberLeft {
        party_id: PartyId,
        uid: UserId,
        leader_id: Option<UserId>,
        dissolved: bool,
    },

    #[serde(rename_all = "camelCase")]
    FriendOnline { uid: UserId, friend_uid: UserId },

    #[serde(rename_all = "camelCase")]
    FriendOffline { uid: UserId, friend_uid: UserId },
}

impl SocialEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SocialEvent::FriendRequestReceived { .. } => "friendRequestReceived",
            SocialEvent::FriendRequestAccepted { .. } => "friendRequestAccepted",
            SocialEvent::PartyInviteReceived { .. } => "partyInviteReceived",
            SocialEvent::PartyMemberJoined { .. } => "partyMemberJoined",
            SocialEvent::PartyMemberLeft { .. } => "partyMemberLeft",
            SocialEvent::FriendOnline { .. } => "friendOnline",
            SocialEvent::FriendOffline { .. } => "friendOffline",
        }
    }
}

/// 带收件人列表的事件，收件人之外的连接不会收到
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipients: Vec<UserId>,
    pub event: SocialEvent,
}

impl Notification {
    pub fn to(recipient: UserId, event: SocialEvent) -> Self {
        Self {
            recipients: vec![recipient],
            event,
        }
    }

    pub fn to_many(recipients: impl IntoIterator<Item = UserId>, event: SocialEvent) -> Self {
        let mut unique: Vec<UserId> = Vec::new();
        for recipient in recipients {
            if !unique.contains(&recipient) {
                unique.push(recipient);
            }
        }
        Self {
            recipients: unique,
            event,
        }
    }
}
