use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::ApplicationError;

/// 乐观并发冲突的重试策略（指数退避）
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// 首次执行之外的最大重试次数
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    fn delay_at(&self, attempt: u32) -> Duration {
        let exp = std::cmp::min(attempt.saturating_sub(1), 10);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(10))
    }
}

/// 只对 [`ApplicationError::Conflict`] 重试，每次重试都会重新读取聚合。
pub async fn retry_on_conflict<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T, ApplicationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApplicationError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Err(ApplicationError::Conflict) if attempt <= policy.max_retries => {
                let delay = policy.delay_at(attempt);
                tracing::warn!(operation, attempt, ?delay, "version conflict, retrying");
                sleep(delay).await;
            }
            Err(ApplicationError::Conflict) => {
                tracing::warn!(operation, attempt, "version conflict retries exhausted");
                return Err(ApplicationError::Conflict);
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        assert_eq!(policy.delay_at(1), Duration::from_millis(10));
        assert_eq!(policy.delay_at(2), Duration::from_millis(20));
        assert_eq!(policy.delay_at(3), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn conflict_is_retried_then_surfaced() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(5));
        let result: Result<(), _> = retry_on_conflict(&policy, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ApplicationError::Conflict)
        })
        .await;

        assert_eq!(result, Err(ApplicationError::Conflict));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_on_conflict(&RetryPolicy::default(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ApplicationError::NotInParty)
        })
        .await;

        assert_eq!(result, Err(ApplicationError::NotInParty));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_conflict() {
        let calls = AtomicU32::new(0);
        let result = retry_on_conflict(&RetryPolicy::default(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ApplicationError::Conflict)
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result, Ok(7));
    }
}
