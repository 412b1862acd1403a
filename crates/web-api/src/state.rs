use std::sync::Arc;

use application::{
    AggregateLocks, EventFanout, FriendService, FriendServiceDependencies, LoggingMatchmakingHook,
    MatchmakingHook, PartyRepository, PartyService, PartyServiceDependencies, ProfileIdentityStore,
    ProfileRepository, ProfileService, ProfileServiceDependencies, RetryPolicy, SessionGuard,
    SystemClock,
};
use config::AppConfig;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub profile_service: Arc<ProfileService>,
    pub friend_service: Arc<FriendService>,
    pub party_service: Arc<PartyService>,
    pub sessions: Arc<SessionGuard>,
    pub fanout: Arc<EventFanout>,
    pub matchmaking: Arc<dyn MatchmakingHook>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    /// 按配置装配所有服务，连接注册表随状态创建、随服务器关闭释放
    pub fn build(
        config: &AppConfig,
        profiles: Arc<dyn ProfileRepository>,
        parties: Arc<dyn PartyRepository>,
    ) -> Self {
        let clock = Arc::new(SystemClock);
        let locks = Arc::new(AggregateLocks::new());
        let fanout = Arc::new(EventFanout::new(config.fanout.connection_buffer));
        let identity = Arc::new(ProfileIdentityStore::new(profiles.clone()));
        let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
        let retry = RetryPolicy::new(
            config.coordination.max_conflict_retries,
            config.coordination.retry_base_delay(),
        );
        let timeout = config.coordination.collaborator_timeout();

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
            parties,
            profiles,
            identity,
            presence: fanout.clone(),
            publisher: fanout.clone(),
            locks,
            clock,
            retry,
            collaborator_timeout: timeout,
            ttl: time::Duration::hours(i64::from(config.party.ttl_hours)),
        });

        Self {
            profile_service: Arc::new(profile_service),
            friend_service: Arc::new(friend_service),
            party_service: Arc::new(party_service),
            sessions: Arc::new(SessionGuard::new(jwt_service.clone(), timeout)),
            fanout,
            matchmaking: Arc::new(LoggingMatchmakingHook),
            jwt_service,
        }
    }
}
