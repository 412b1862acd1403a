use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::{
    LeaveOutcome, Notification, Party, PartyId, RepositoryError, SocialEvent, User, UserId,
};
use uuid::Uuid;

use crate::{
    broadcaster::EventPublisher,
    clock::Clock,
    dto::{PartyDto, PartyMemberDto},
    error::ApplicationError,
    identity::{IdentityError, IdentityStore},
    locks::{AggregateLocks, LockKey},
    presence::PresenceDirectory,
    repository::{PartyRepository, ProfileRepository},
    retry::{retry_on_conflict, RetryPolicy},
    services::{bounded, deliver},
};

/// 成员已被写入其他派对：另一个写入者抢先了，重新读取后再判断
fn membership_taken(err: RepositoryError) -> ApplicationError {
    match err {
        RepositoryError::Duplicate { field } if field == "member" => ApplicationError::Conflict,
        err => err.into(),
    }
}

pub struct PartyServiceDependencies {
    pub parties: Arc<dyn PartyRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub identity: Arc<dyn IdentityStore>,
    pub presence: Arc<dyn PresenceDirectory>,
    pub publisher: Arc<dyn EventPublisher>,
    pub locks: Arc<AggregateLocks>,
    pub clock: Arc<dyn Clock>,
    pub retry: RetryPolicy,
    pub collaborator_timeout: Duration,
    /// 派对自创建起的存活时间
    pub ttl: time::Duration,
}

/// 派对注册表：邀请、加入、离开与查询。
///
/// 加锁顺序固定为先用户后派对；同一派对的事件在持有该派对锁时投递，
/// 因此观察者收到的顺序与状态提交顺序一致。
pub struct PartyService {
    deps: PartyServiceDependencies,
}

impl PartyService {
    pub fn new(deps: PartyServiceDependencies) -> Self {
        Self { deps }
    }

    async fn load_profile(&self, user_id: UserId) -> Result<User, ApplicationError> {
        self.deps
            .profiles
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("profile"))
    }

    /// 过期的派对视为不存在，顺手删除
    async fn discard_if_expired(&self, party: Party) -> Option<Party> {
        if !party.is_expired(self.deps.clock.now(), self.deps.ttl) {
            return Some(party);
        }
        match self.deps.parties.delete(party.id, party.version).await {
            Ok(()) => tracing::info!(party_id = %party.id, "expired party removed"),
            Err(RepositoryError::Conflict | RepositoryError::NotFound) => {}
            Err(err) => tracing::warn!(party_id = %party.id, error = %err, "failed to remove expired party"),
        }
        None
    }

    async fn live_party(&self, party_id: PartyId) -> Result<Option<Party>, ApplicationError> {
        match self.deps.parties.find_by_id(party_id).await? {
            Some(party) => Ok(self.discard_if_expired(party).await),
            None => Ok(None),
        }
    }

    /// 用户当前所在的未过期派对
    pub async fn active_party_of(&self, user_id: UserId) -> Result<Option<Party>, ApplicationError> {
        match self.deps.parties.find_by_member(user_id).await? {
            Some(party) => Ok(self.discard_if_expired(party).await),
            None => Ok(None),
        }
    }

    /// 组装带成员档案和在线状态的派对快照
    pub async fn snapshot(&self, party: &Party) -> Result<PartyDto, ApplicationError> {
        let profiles: HashMap<UserId, User> = self
            .deps
            .profiles
            .find_many(&party.members)
            .await?
            .into_iter()
            .map(|user| (user.id, user))
            .collect();
        let online = self.deps.presence.online_among(&party.members).await;

        let members = party
            .members
            .iter()
            .map(|uid| {
                let profile = profiles.get(uid);
                PartyMemberDto {
                    uid: Uuid::from(*uid),
                    nickname: profile
                        .map(|user| user.nickname.as_str().to_owned())
                        .unwrap_or_default(),
                    icon: profile
                        .map(|user| user.icon.as_str().to_owned())
                        .unwrap_or_default(),
                    online: online.contains(uid),
                }
            })
            .collect();
        Ok(PartyDto::new(party, members, self.deps.ttl))
    }

    async fn ensure_user_exists(&self, target: UserId) -> Result<(), ApplicationError> {
        let resolved = bounded(
            self.deps.collaborator_timeout,
            "identity store",
            self.deps.identity.resolve_user(&target.to_string()),
        )
        .await?;
        match resolved {
            Ok(profile) if profile.uid == target => Ok(()),
            Ok(_) | Err(IdentityError::NotFound) => Err(ApplicationError::not_found("user")),
            Err(IdentityError::Unavailable(message)) => {
                tracing::warn!(%message, "identity store unavailable");
                Err(ApplicationError::unavailable(message))
            }
        }
    }

    /// 邀请 `target` 加入邀请者的派对；邀请者没有派对时先创建一个。
    pub async fn invite(&self, inviter: UserId, target: UserId) -> Result<PartyId, ApplicationError> {
        if inviter == target {
            return Err(ApplicationError::SelfTarget);
        }
        self.ensure_user_exists(target).await?;

        retry_on_conflict(&self.deps.retry, "party_invite", || async {
            let mut locks = self.deps.locks.acquire([LockKey::User(inviter)]).await;
            let inviter_profile = self.load_profile(inviter).await?;
            let now = self.deps.clock.now();

            let party = match self.active_party_of(inviter).await? {
                None => {
                    let mut party = Party::form(PartyId::from(Uuid::new_v4()), inviter, now);
                    party.invite(target, now);
                    self.deps.locks.extend(&mut locks, LockKey::Party(party.id)).await;
                    let party = self.deps.parties.create(party).await.map_err(membership_taken)?;
                    tracing::info!(party_id = %party.id, leader_id = %inviter, "party formed");
                    party
                }
                Some(current) => {
                    self.deps.locks.extend(&mut locks, LockKey::Party(current.id)).await;
                    let mut party = match self.live_party(current.id).await? {
                        Some(party) if party.is_member(inviter) => party,
                        _ => return Err(ApplicationError::Conflict),
                    };
                    if party.is_member(target) {
                        return Ok(party.id);
                    }
                    if party.invite(target, now) {
                        party = self.deps.parties.update(party).await?;
                    }
                    party
                }
            };

            tracing::info!(party_id = %party.id, user_id = %inviter, target = %target, "party invite issued");
            deliver(
                self.deps.publisher.as_ref(),
                Notification::to(
                    target,
                    SocialEvent::PartyInviteReceived {
                        party_id: party.id,
                        from_uid: inviter,
                        from_nickname: inviter_profile.nickname.as_str().to_owned(),
                        to_uid: target,
                    },
                ),
            )
            .await;
            Ok(party.id)
        })
        .await
    }

    /// 接受邀请加入派对。已在另一个派对中的用户必须先离开。
    pub async fn join(&self, user_id: UserId, party_id: PartyId) -> Result<PartyDto, ApplicationError> {
        retry_on_conflict(&self.deps.retry, "party_join", || async {
            let _locks = self
                .deps
                .locks
                .acquire([LockKey::User(user_id), LockKey::Party(party_id)])
                .await;

            let mut party = self
                .live_party(party_id)
                .await?
                .ok_or_else(|| ApplicationError::not_found("party"))?;
            if party.is_member(user_id) {
                return self.snapshot(&party).await;
            }
            if !party.is_invited(user_id) {
                return Err(ApplicationError::NotInvited);
            }
            if let Some(current) = self.active_party_of(user_id).await? {
                if current.id != party_id {
                    return Err(ApplicationError::AlreadyInParty);
                }
            }

            let joiner = self.load_profile(user_id).await?;
            party.join(user_id, self.deps.clock.now())?;
            let party = self.deps.parties.update(party).await.map_err(membership_taken)?;

            tracing::info!(party_id = %party_id, user_id = %user_id, members = party.members.len(), "joined party");
            deliver(
                self.deps.publisher.as_ref(),
                Notification::to_many(
                    party.members.iter().copied(),
                    SocialEvent::PartyMemberJoined {
                        party_id,
                        uid: user_id,
                        nickname: joiner.nickname.as_str().to_owned(),
                    },
                ),
            )
            .await;
            self.snapshot(&party).await
        })
        .await
    }

    /// 离开当前派对；最后一名成员离开时派对解散，队长离开时由最早加入的成员接任。
    pub async fn leave(&self, user_id: UserId) -> Result<(), ApplicationError> {
        retry_on_conflict(&self.deps.retry, "party_leave", || async {
            let mut locks = self.deps.locks.acquire([LockKey::User(user_id)]).await;
            let current = self
                .active_party_of(user_id)
                .await?
                .ok_or(ApplicationError::NotInParty)?;
            self.deps.locks.extend(&mut locks, LockKey::Party(current.id)).await;
            let mut party = self
                .live_party(current.id)
                .await?
                .ok_or(ApplicationError::NotInParty)?;

            let outcome = party.leave(user_id, self.deps.clock.now())?;
            let event = match outcome {
                LeaveOutcome::Dissolved => {
                    self.deps.parties.delete(party.id, party.version).await?;
                    tracing::info!(party_id = %party.id, user_id = %user_id, "party dissolved");
                    Notification::to(
                        user_id,
                        SocialEvent::PartyMemberLeft {
                            party_id: party.id,
                            uid: user_id,
                            leader_id: None,
                            dissolved: true,
                        },
                    )
                }
                LeaveOutcome::Remaining { new_leader } => {
                    let party = self.deps.parties.update(party).await?;
                    match new_leader {
                        Some(leader) => tracing::info!(party_id = %party.id, user_id = %user_id, leader_id = %leader, "leader left, leadership reassigned"),
                        None => tracing::info!(party_id = %party.id, user_id = %user_id, "left party"),
                    }
                    Notification::to_many(
                        party.members.iter().copied().chain([user_id]),
                        SocialEvent::PartyMemberLeft {
                            party_id: party.id,
                            uid: user_id,
                            leader_id: Some(party.leader_id),
                            dissolved: false,
                        },
                    )
                }
            };
            deliver(self.deps.publisher.as_ref(), event).await;
            Ok(())
        })
        .await
    }

    pub async fn info(&self, user_id: UserId) -> Result<Option<PartyDto>, ApplicationError> {
        match self.active_party_of(user_id).await? {
            Some(party) => Ok(Some(self.snapshot(&party).await?)),
            None => Ok(None),
        }
    }

    /// 删除超过存活时间的派对，返回删除数量
    pub async fn sweep_expired(&self) -> Result<u64, ApplicationError> {
        let cutoff = self.deps.clock.now() - self.deps.ttl;
        let removed = self.deps.parties.delete_created_before(cutoff).await?;
        let pruned = self.deps.locks.prune();
        if removed > 0 {
            tracing::info!(removed, pruned, "expired parties swept");
        }
        Ok(removed)
    }
}
