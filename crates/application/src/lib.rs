//! 应用层实现。
//!
//! 围绕派对与好友关系图两个聚合提供用例服务，负责按聚合加锁、乐观并发重试、
//! 外部协作方（身份、会话、匹配队列）的抽象，以及实时事件分发。

pub mod broadcaster;
pub mod clock;
pub mod dto;
pub mod error;
pub mod fanout;
pub mod identity;
pub mod locks;
pub mod matchmaking;
pub mod memory;
pub mod presence;
pub mod repository;
pub mod retry;
pub mod services;

pub use broadcaster::{BroadcastError, EventPublisher};
pub use clock::{Clock, SystemClock};
pub use dto::{
    FriendDto, PartyDto, PartyMemberDto, ProfileDto, ReceivedRequestDto, SentRequestDto,
};
pub use error::ApplicationError;
pub use fanout::{ConnectionId, ControlFrame, EventFanout, PresenceChange, PresenceTransition};
pub use identity::{
    IdentityError, IdentityProfile, IdentityStore, ProfileIdentityStore, SessionAuthenticator,
    SessionError,
};
pub use locks::{AggregateLocks, LockKey};
pub use matchmaking::{LoggingMatchmakingHook, MatchmakingHook};
pub use memory::{InMemoryPartyRepository, InMemoryProfileRepository};
pub use presence::PresenceDirectory;
pub use repository::{PartyRepository, ProfileRepository};
pub use retry::{retry_on_conflict, RetryPolicy};
pub use services::{
    FriendService, FriendServiceDependencies, PartyService, PartyServiceDependencies,
    ProfileService, ProfileServiceDependencies, SessionGuard, UpdateProfileRequest,
};
