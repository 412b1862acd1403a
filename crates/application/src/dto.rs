use domain::{Party, PartyState, Timestamp, User};
use serde::{Deserialize, Serialize};
use time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDto {
    pub uid: Uuid,
    pub nickname: String,
    pub icon: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

impl From<&User> for ProfileDto {
    fn from(user: &User) -> Self {
        Self {
            uid: Uuid::from(user.id),
            nickname: user.nickname.as_str().to_owned(),
            icon: user.icon.as_str().to_owned(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendDto {
    pub uid: Uuid,
    pub nickname: String,
    pub icon: String,
    pub online: bool,
}

impl FriendDto {
    pub fn new(user: &User, online: bool) -> Self {
        Self {
            uid: Uuid::from(user.id),
            nickname: user.nickname.as_str().to_owned(),
            icon: user.icon.as_str().to_owned(),
            online,
        }
    }
}

/// 收到的好友申请
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedRequestDto {
    pub from_uid: Uuid,
    pub nickname: String,
    pub icon: String,
}

impl From<&User> for ReceivedRequestDto {
    fn from(requester: &User) -> Self {
        Self {
            from_uid: Uuid::from(requester.id),
            nickname: requester.nickname.as_str().to_owned(),
            icon: requester.icon.as_str().to_owned(),
        }
    }
}

/// 发出的好友申请
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentRequestDto {
    pub to_uid: Uuid,
    pub nickname: String,
    pub icon: String,
}

impl From<&User> for SentRequestDto {
    fn from(target: &User) -> Self {
        Self {
            to_uid: Uuid::from(target.id),
            nickname: target.nickname.as_str().to_owned(),
            icon: target.icon.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyMemberDto {
    pub uid: Uuid,
    pub nickname: String,
    pub icon: String,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyDto {
    pub id: Uuid,
    pub leader_id: Uuid,
    pub state: PartyState,
    pub members: Vec<PartyMemberDto>,
    pub invites: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: Timestamp,
}

impl PartyDto {
    /// `members` 需与 `party.members` 顺序一致
    pub fn new(party: &Party, members: Vec<PartyMemberDto>, ttl: Duration) -> Self {
        Self {
            id: Uuid::from(party.id),
            leader_id: Uuid::from(party.leader_id),
            state: party.state(),
            members,
            invites: party.invites.iter().copied().map(Uuid::from).collect(),
            created_at: party.created_at,
            expires_at: party.expires_at(ttl),
        }
    }
}
