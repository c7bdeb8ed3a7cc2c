//! Bounded exponential backoff for transient RPC failures

use std::{future::Future, time::Duration};

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use crate::{
    constants::{DEFAULT_RETRY_INITIAL_DELAY, DEFAULT_RETRY_MAX_DELAY, DEFAULT_RPC_MAX_RETRIES},
    errors::ClientError,
};

/// How transient RPC failures are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// The number of retries after the first attempt
    pub max_retries: usize,
    /// The delay before the first retry
    pub initial_delay: Duration,
    /// The cap on the delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RPC_MAX_RETRIES,
            initial_delay: DEFAULT_RETRY_INITIAL_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

impl RetryConfig {
    /// The backoff schedule
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }

    /// Run an RPC request, retrying transport failures.
    ///
    /// Errors the node answered with are returned immediately.
    pub async fn retry<T, F, Fut>(&self, request: &str, f: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        f.retry(self.backoff())
            .when(ClientError::is_retryable)
            .notify(|err: &ClientError, delay: Duration| {
                warn!(request, error = %err, ?delay, "retrying RPC request");
            })
            .await
    }
}
