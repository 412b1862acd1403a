mod friend_service;
mod party_service;
mod profile_service;
mod session;

use std::future::Future;
use std::time::Duration;

use domain::Notification;

use crate::broadcaster::EventPublisher;
use crate::error::ApplicationError;

pub use friend_service::{FriendService, FriendServiceDependencies};
pub use party_service::{PartyService, PartyServiceDependencies};
pub use profile_service::{ProfileService, ProfileServiceDependencies, UpdateProfileRequest};
pub use session::SessionGuard;

/// 外部协作方调用加上超时，超时视为 `Unavailable`
pub(crate) async fn bounded<T>(
    limit: Duration,
    collaborator: &'static str,
    call: impl Future<Output = T>,
) -> Result<T, ApplicationError> {
    tokio::time::timeout(limit, call).await.map_err(|_| {
        tracing::warn!(collaborator, ?limit, "collaborator call timed out");
        ApplicationError::unavailable(format!("{collaborator} timed out"))
    })
}

/// 投递失败只记录日志，不影响已提交的操作
pub(crate) async fn deliver(publisher: &dyn EventPublisher, notification: Notification) {
    let event = notification.event.name();
    if let Err(err) = publisher.publish(notification).await {
        tracing::warn!(error = %err, event, "failed to publish event");
    }
}
