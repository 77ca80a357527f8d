use crate::domain::ports::ConfigProvider;
use crate::utils::error::{ProviderError, Result};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(2),
        }
    }
}

impl PollPolicy {
    pub fn from_config<C: ConfigProvider>(config: &C) -> Self {
        Self {
            max_attempts: config.poll_max_attempts(),
            interval: config.poll_interval(),
        }
    }
}

/// 反覆呼叫 `fetch` 直到 `ready` 成立或超過嘗試次數
pub async fn wait_until<T, F, Fut, P>(
    what: &str,
    policy: PollPolicy,
    mut fetch: F,
    ready: P,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    for attempt in 1..=policy.max_attempts {
        let value = fetch().await?;
        if ready(&value) {
            tracing::debug!("✅ {} ready after {} attempt(s)", what, attempt);
            return Ok(value);
        }

        tracing::debug!(
            "⏳ Waiting for {} ({}/{})",
            what,
            attempt,
            policy.max_attempts
        );
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(ProviderError::TimeoutError {
        what: what.to_string(),
        attempts: policy.max_attempts,
    })
}
