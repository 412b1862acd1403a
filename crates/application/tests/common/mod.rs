//! 集成测试共用的内存装配

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use application::{
    AggregateLocks, EventFanout, FriendService, FriendServiceDependencies,
    InMemoryPartyRepository, InMemoryProfileRepository, PartyRepository, PartyService,
    PartyServiceDependencies, ProfileIdentityStore, ProfileRepository, ProfileService, ProfileServiceDependencies,
    RetryPolicy, SystemClock,
};
use domain::{Party, UserId};
use tokio::sync::mpsc;

pub struct Harness {
    pub profiles: Arc<InMemoryProfileRepository>,
    pub parties: Arc<InMemoryPartyRepository>,
    pub fanout: Arc<EventFanout>,
    pub profile_service: ProfileService,
    pub friend_service: FriendService,
    pub party_service: PartyService,
}

impl Harness {
    pub fn new() -> Self {
        let profiles = Arc::new(InMemoryProfileRepository::new());
        let parties = Arc::new(InMemoryPartyRepository::new());
        let fanout = Arc::new(EventFanout::new(64));
        let locks = Arc::new(AggregateLocks::new());
        let clock = Arc::new(SystemClock);
        let identity = Arc::new(ProfileIdentityStore::new(profiles.clone()));
        let retry = RetryPolicy::new(3, Duration::from_millis(1));
        let timeout = Duration::from_secs(1);

        let profile_service = ProfileService::new(ProfileServiceDependencies {
            profiles: profiles.clone(),
            locks: locks.clone(),
            clock: clock.clone(),
            retry: retry.clone(),
        });
        let friend_service = FriendService::new(FriendServiceDependencies {
            profiles: profiles.clone(),
            identity: identity.clone(),
            presence: fanout.clone(),
            publisher: fanout.clone(),
            locks: locks.clone(),
            clock: clock.clone(),
            retry: retry.clone(),
            collaborator_timeout: timeout,
        });
        let party_service = PartyService::new(PartyServiceDependencies {
            parties: parties.clone(),
            profiles: profiles.clone(),
            identity,
            presence: fanout.clone(),
            publisher: fanout.clone(),
            locks,
            clock,
            retry,
            collaborator_timeout: timeout,
            ttl: Party::DEFAULT_TTL,
        });

        Self {
            profiles,
            parties,
            fanout,
            profile_service,
            friend_service,
            party_service,
        }
    }

    /// 模拟另一个进程里的派对服务：共享存储和连接，但有独立的锁表
    pub fn party_node(&self, parties: Arc<dyn PartyRepository>) -> PartyService {
        PartyService::new(PartyServiceDependencies {
            parties,
            profiles: self.profiles.clone(),
            identity: Arc::new(ProfileIdentityStore::new(self.profiles.clone())),
            presence: self.fanout.clone(),
            publisher: self.fanout.clone(),
            locks: Arc::new(AggregateLocks::new()),
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            collaborator_timeout: Duration::from_secs(1),
            ttl: Party::DEFAULT_TTL,
        })
    }

    pub async fn register(&self, nickname: &str) -> UserId {
        let profile = self
            .profile_service
            .register(nickname.to_owned())
            .await
            .expect("register profile");
        UserId::from(profile.uid)
    }

    /// 为用户建立一个已认证的实时连接
    pub async fn connect(&self, uid: UserId) -> mpsc::Receiver<String> {
        let (id, rx) = self.fanout.connect().await;
        drop(self.fanout.authenticate(id, uid).await);
        rx
    }

    pub async fn profile(&self, uid: UserId) -> domain::User {
        self.profiles
            .find_by_id(uid)
            .await
            .expect("load profile")
            .expect("profile exists")
    }
}

/// 取出当前积压的所有事件帧
pub fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(&frame).expect("frame is json"));
    }
    frames
}

pub fn event_names(frames: &[serde_json::Value]) -> Vec<String> {
    frames
        .iter()
        .map(|frame| frame["event"].as_str().unwrap_or_default().to_owned())
        .collect()
}
