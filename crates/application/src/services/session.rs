use std::sync::Arc;
use std::time::Duration;

use domain::UserId;

use crate::error::ApplicationError;
use crate::identity::{SessionAuthenticator, SessionError};
use crate::services::bounded;

/// 校验调用方凭证，查询有时限
pub struct SessionGuard {
    authenticator: Arc<dyn SessionAuthenticator>,
    timeout: Duration,
}

impl SessionGuard {
    pub fn new(authenticator: Arc<dyn SessionAuthenticator>, timeout: Duration) -> Self {
        Self {
            authenticator,
            timeout,
        }
    }

    pub async fn authorize(&self, credential: &str) -> Result<UserId, ApplicationError> {
        if credential.trim().is_empty() {
            return Err(ApplicationError::Unauthenticated);
        }
        match bounded(self.timeout, "session service", self.authenticator.current_uid(credential))
            .await?
        {
            Ok(uid) => Ok(uid),
            Err(SessionError::Unauthenticated) => Err(ApplicationError::Unauthenticated),
            Err(SessionError::Unavailable(message)) => {
                tracing::warn!(%message, "session service unavailable");
                Err(ApplicationError::unavailable(message))
            }
        }
    }
}
