use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::{Notification, RequestResolution, SocialEvent, User, UserId};

use crate::{
    broadcaster::EventPublisher,
    clock::Clock,
    dto::{FriendDto, ReceivedRequestDto, SentRequestDto},
    error::ApplicationError,
    identity::{IdentityError, IdentityStore},
    locks::{AggregateLocks, LockKey},
    presence::PresenceDirectory,
    repository::ProfileRepository,
    retry::{retry_on_conflict, RetryPolicy},
    services::{bounded, deliver},
};

pub struct FriendServiceDependencies {
    pub profiles: Arc<dyn ProfileRepository>,
    pub identity: Arc<dyn IdentityStore>,
    pub presence: Arc<dyn PresenceDirectory>,
    pub publisher: Arc<dyn EventPublisher>,
    pub locks: Arc<AggregateLocks>,
    pub clock: Arc<dyn Clock>,
    pub retry: RetryPolicy,
    pub collaborator_timeout: Duration,
}

/// 好友关系图：申请、应答与列表。
///
/// 申请和应答总是同时修改双方档案，并通过 `save_pair` 在一次写入中持久化。
pub struct FriendService {
    deps: FriendServiceDependencies,
}

impl FriendService {
    pub fn new(deps: FriendServiceDependencies) -> Self {
        Self { deps }
    }

    async fn load(&self, user_id: UserId) -> Result<User, ApplicationError> {
        self.deps
            .profiles
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("profile"))
    }

    /// 按 uid 或昵称向目标用户发送好友申请
    pub async fn send_request(&self, from: UserId, query: &str) -> Result<(), ApplicationError> {
        let resolved = bounded(
            self.deps.collaborator_timeout,
            "identity store",
            self.deps.identity.resolve_user(query),
        )
        .await?;
        let target = match resolved {
            Ok(profile) => profile.uid,
            Err(IdentityError::NotFound) => return Err(ApplicationError::not_found("user")),
            Err(IdentityError::Unavailable(message)) => {
                tracing::warn!(%message, "identity store unavailable");
                return Err(ApplicationError::unavailable(message));
            }
        };
        if target == from {
            return Err(ApplicationError::SelfTarget);
        }

        let sender = retry_on_conflict(&self.deps.retry, "send_friend_request", || async {
            let _locks = self
                .deps
                .locks
                .acquire([LockKey::User(from), LockKey::User(target)])
                .await;
            let mut sender = self.load(from).await?;
            let mut recipient = self
                .deps
                .profiles
                .find_by_id(target)
                .await?
                .ok_or_else(|| ApplicationError::not_found("user"))?;

            sender.send_friend_request(&mut recipient, self.deps.clock.now())?;
            let (sender, _) = self.deps.profiles.save_pair(sender, recipient).await?;
            Ok(sender)
        })
        .await?;

        tracing::info!(user_id = %from, target = %target, "friend request sent");
        deliver(
            self.deps.publisher.as_ref(),
            Notification::to(
                target,
                SocialEvent::FriendRequestReceived {
                    from_uid: from,
                    from_nickname: sender.nickname.as_str().to_owned(),
                    to_uid: target,
                },
            ),
        )
        .await;
        Ok(())
    }

    /// 接受或拒绝来自 `from_uid` 的申请；申请不存在时直接成功
    pub async fn respond(&self, user_id: UserId, from_uid: UserId, accept: bool) -> Result<(), ApplicationError> {
        if user_id == from_uid {
            return Ok(());
        }

        let resolution = retry_on_conflict(&self.deps.retry, "respond_friend_request", || async {
            let _locks = self
                .deps
                .locks
                .acquire([LockKey::User(user_id), LockKey::User(from_uid)])
                .await;
            let mut responder = self.load(user_id).await?;
            let Some(mut requester) = self.deps.profiles.find_by_id(from_uid).await? else {
                return Ok(RequestResolution::NoSuchRequest);
            };

            let resolution = responder.respond_to_request(&mut requester, accept, self.deps.clock.now());
            if resolution != RequestResolution::NoSuchRequest {
                self.deps.profiles.save_pair(responder, requester).await?;
            }
            Ok(resolution)
        })
        .await?;

        match resolution {
            RequestResolution::NoSuchRequest => {
                tracing::debug!(user_id = %user_id, from_uid = %from_uid, "no pending friend request");
            }
            RequestResolution::Declined => {
                tracing::info!(user_id = %user_id, from_uid = %from_uid, "friend request declined");
            }
            RequestResolution::Accepted => {
                tracing::info!(user_id = %user_id, from_uid = %from_uid, "friend request accepted");
                deliver(
                    self.deps.publisher.as_ref(),
                    Notification::to(
                        from_uid,
                        SocialEvent::FriendRequestAccepted {
                            from_uid: user_id,
                            to_uid: from_uid,
                        },
                    ),
                )
                .await;
            }
        }
        Ok(())
    }

    pub async fn list_friends(&self, user_id: UserId) -> Result<Vec<FriendDto>, ApplicationError> {
        let user = self.load(user_id).await?;
        let friends = self.deps.profiles.find_many(&user.friends).await?;
        let online = self.deps.presence.online_among(&user.friends).await;
        Ok(friends
            .iter()
            .map(|friend| FriendDto::new(friend, online.contains(&friend.id)))
            .collect())
    }

    pub async fn list_received_requests(&self, user_id: UserId) -> Result<Vec<ReceivedRequestDto>, ApplicationError> {
        let user = self.load(user_id).await?;
        let requesters = self
            .deps
            .profiles
            .find_many(&user.friend_requests_received)
            .await?;
        Ok(requesters.iter().map(ReceivedRequestDto::from).collect())
    }

    pub async fn list_sent_requests(&self, user_id: UserId) -> Result<Vec<SentRequestDto>, ApplicationError> {
        let user = self.load(user_id).await?;
        let targets = self.deps.profiles.find_many(&user.friend_requests_sent).await?;
        Ok(targets.iter().map(SentRequestDto::from).collect())
    }

    /// 向每个好友推送上线或下线通知
    pub async fn announce_presence(&self, user_id: UserId, online: bool) -> Result<(), ApplicationError> {
        let Some(user) = self.deps.profiles.find_by_id(user_id).await? else {
            return Ok(());
        };
        for friend in &user.friends {
            let event = if online {
                SocialEvent::FriendOnline {
                    uid: user_id,
                    friend_uid: *friend,
                }
            } else {
                SocialEvent::FriendOffline {
                    uid: user_id,
                    friend_uid: *friend,
                }
            };
            deliver(self.deps.publisher.as_ref(), Notification::to(*friend, event)).await;
        }
        tracing::debug!(user_id = %user_id, online, friends = user.friends.len(), "presence announced");
        Ok(())
    }

    /// 修复半写入的好友关系：丢弃缺少镜像记录的申请和单向好友，返回修复的档案数。
    pub async fn reconcile(&self) -> Result<usize, ApplicationError> {
        let snapshot: HashMap<UserId, User> = self
            .deps
            .profiles
            .list_all()
            .await?
            .into_iter()
            .map(|user| (user.id, user))
            .collect();

        let now = self.deps.clock.now();
        let mut repaired = 0usize;
        for user in snapshot.values() {
            let mut candidate = user.clone();
            if !candidate.retain_mirrored(&snapshot, now) {
                continue;
            }
            match self.deps.profiles.update(candidate).await {
                Ok(_) => {
                    repaired += 1;
                    tracing::warn!(user_id = %user.id, "repaired asymmetric friend graph entries");
                }
                Err(err) => {
                    tracing::warn!(user_id = %user.id, error = %err, "failed to repair profile");
                }
            }
        }
        Ok(repaired)
    }
}
