//! Per-run access to the AI Capability: typed decoding, bounded retry,
//! and call accounting.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use openkeywords_shared::{AiCapability, AiError, AiRequest, RetryConfig};

/// Decode an AI response into the shape a stage expects.
///
/// This is the only place a response is interpreted; anything that does not
/// fit `T` becomes [`AiError::InvalidResponse`].
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, AiError> {
    serde_json::from_value(value).map_err(|e| AiError::InvalidResponse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// AiSession
// ---------------------------------------------------------------------------

/// The AI Capability as one pipeline run sees it.
///
/// Every attempt that reaches the capability is counted, retries included.
pub struct AiSession {
    capability: Arc<dyn AiCapability>,
    retry: RetryPolicy,
    calls: AtomicUsize,
}

impl AiSession {
    pub fn new(capability: Arc<dyn AiCapability>, retry: RetryPolicy) -> Self {
        Self {
            capability,
            retry,
            calls: AtomicUsize::new(0),
        }
    }

    /// Attempts sent so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Send a request, retrying timeouts and rate limits per the policy.
    pub async fn call(&self, request: AiRequest) -> Result<Value, AiError> {
        let mut attempt = 0;
        loop {
            self.calls.fetch_add(1, Ordering::Relaxed);
            match self.capability.generate(request.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        task = request.task.as_str(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient AI failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!(task = request.task.as_str(), error = %err, "AI call failed");
                    return Err(err);
                }
            }
        }
    }

    /// Send a request and decode the response into `T`.
    pub async fn call_typed<T: DeserializeOwned>(&self, request: AiRequest) -> Result<T, AiError> {
        decode(self.call(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAi;
    use openkeywords_shared::AiTask;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Shape {
        keywords: Vec<String>,
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let ok: Shape = decode(json!({"keywords": ["a b"]})).expect("decode");
        assert_eq!(ok.keywords, vec!["a b"]);

        let err = decode::<Shape>(json!({"items": []})).unwrap_err();
        assert!(matches!(err, AiError::InvalidResponse(_)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(30), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn retries_rate_limit_once_and_counts_both_attempts() {
        let ai = ScriptedAi::new();
        ai.push(AiTask::Scoring, Err(AiError::RateLimited));
        ai.push(AiTask::Scoring, Ok(json!({"keywords": ["x y"]})));

        let session = AiSession::new(ai.clone(), fast_retry(1));
        let shape: Shape = session
            .call_typed(AiRequest::new(AiTask::Scoring, "p"))
            .await
            .expect("second attempt succeeds");

        assert_eq!(shape.keywords, vec!["x y"]);
        assert_eq!(session.calls(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let ai = ScriptedAi::new();
        ai.push(AiTask::Clustering, Err(AiError::Timeout));
        ai.push(AiTask::Clustering, Err(AiError::Timeout));
        ai.push(AiTask::Clustering, Ok(json!({})));

        let session = AiSession::new(ai.clone(), fast_retry(1));
        let err = session
            .call(AiRequest::new(AiTask::Clustering, "p"))
            .await
            .unwrap_err();

        assert_eq!(err, AiError::Timeout);
        assert_eq!(session.calls(), 2);
    }

    #[tokio::test]
    async fn invalid_response_is_not_retried() {
        let ai = ScriptedAi::new();
        ai.push(AiTask::Generation, Err(AiError::InvalidResponse("bad".into())));

        let session = AiSession::new(ai.clone(), fast_retry(3));
        let err = session
            .call(AiRequest::new(AiTask::Generation, "p"))
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::InvalidResponse(_)));
        assert_eq!(session.calls(), 1);
    }
}
