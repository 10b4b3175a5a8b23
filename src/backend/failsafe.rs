//! Retry-wrapped document reads and writes.
//!
//! The only place with a retry policy. Each retry first resets the store
//! connection, then waits `min(base * 2^attempt + jitter, cap)`. Fatal
//! status codes stop the loop immediately; a missing document is an answer,
//! not a failure, and is never retried.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::connection::ConnectionController;
use super::{to_fields, StoreError, StoreErrorCode};

/// Attempts used by callers that do not pass their own bound.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const DOCUMENT_NOT_FOUND: &str = "Document not found";
const READ_EXHAUSTED: &str = "Failed to fetch document after multiple attempts";
const WRITE_EXHAUSTED: &str = "Failed to write document after multiple attempts";

/// Backoff parameters for the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay unit, doubled per attempt.
    pub base_delay: Duration,
    /// Cap applied after jitter.
    pub max_delay: Duration,
    /// Upper bound of the uniform random jitter added to each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Delay before the 0-based `attempt`. Attempt 0 never waits in the
    /// retry loop; this is only consulted for `attempt >= 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.base_delay
            .saturating_mul(factor)
            .saturating_add(jitter)
            .min(self.max_delay)
    }
}

/// Whether a store error is worth another attempt.
///
/// Permission, missing-target, conflict and validation errors are final.
/// Errors without a status code are treated as transient.
pub fn is_retryable(err: &StoreError) -> bool {
    match err.code {
        None => true,
        Some(
            StoreErrorCode::PermissionDenied
            | StoreErrorCode::NotFound
            | StoreErrorCode::AlreadyExists
            | StoreErrorCode::InvalidArgument,
        ) => false,
        Some(
            StoreErrorCode::Unavailable
            | StoreErrorCode::ResourceExhausted
            | StoreErrorCode::Internal
            | StoreErrorCode::DeadlineExceeded
            | StoreErrorCode::Aborted,
        ) => true,
    }
}

/// Errors reported by the retrying reader that point at connectivity
/// rather than at the data.
pub fn is_connection_message(message: &str) -> bool {
    message.contains("offline")
        || message.contains("unavailable")
        || message.contains("transport errored")
}

/// `attempts` counts the attempts actually made: 1 when the first error was
/// fatal, `max_retries` only when every attempt ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttemptMetadata {
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Outcome of a retried read.
#[derive(Debug, Clone)]
pub struct FailsafeResult<T> {
    pub data: Option<T>,
    pub error: Option<String>,
    pub metadata: AttemptMetadata,
}

/// Outcome of a retried write.
#[derive(Debug, Clone, Serialize)]
pub struct WriteResult {
    pub success: bool,
    pub error: Option<String>,
    pub metadata: AttemptMetadata,
}

/// Run `operation` up to `max_retries` times. Returns the value, or the
/// last error seen (`None` if no attempt ran), plus attempt metadata.
async fn run_with_retry<R, F>(
    connection: &ConnectionController,
    policy: &RetryPolicy,
    max_retries: u32,
    label: &str,
    mut operation: F,
) -> (Result<R, Option<StoreError>>, AttemptMetadata)
where
    F: FnMut() -> Result<R, StoreError>,
{
    let started = Instant::now();
    let mut last_error = None;
    let mut attempts = 0;

    for attempt in 0..max_retries {
        if attempt > 0 {
            tracing::warn!("{label} attempt {}: resetting document store connection", attempt + 1);
            connection.reset_connection().await;
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }

        attempts = attempt + 1;
        match operation() {
            Ok(value) => {
                let metadata = AttemptMetadata {
                    attempts,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                return (Ok(value), metadata);
            }
            Err(err) => {
                tracing::error!(code = ?err.code, "{label} attempt {attempts} failed: {err}");
                let retryable = is_retryable(&err);
                last_error = Some(err);
                if !retryable {
                    break;
                }
            }
        }
    }

    let metadata = AttemptMetadata {
        attempts,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    (Err(last_error), metadata)
}

/// Read `collection/id` with retries and connection resets.
pub async fn get_document_failsafe<T: DeserializeOwned>(
    connection: &ConnectionController,
    policy: &RetryPolicy,
    collection: &str,
    id: &str,
    max_retries: u32,
) -> FailsafeResult<T> {
    let store = connection.store();
    let (outcome, metadata) = run_with_retry(connection, policy, max_retries, "Read", || {
        store.get(collection, id)
    })
    .await;

    match outcome {
        Ok(Some(doc)) => match doc.decode::<T>() {
            Ok(data) => FailsafeResult {
                data: Some(data),
                error: None,
                metadata,
            },
            Err(err) => FailsafeResult {
                data: None,
                error: Some(err.message),
                metadata,
            },
        },
        Ok(None) => FailsafeResult {
            data: None,
            error: Some(DOCUMENT_NOT_FOUND.to_string()),
            metadata,
        },
        Err(last) => FailsafeResult {
            data: None,
            error: Some(exhausted_message(last, READ_EXHAUSTED)),
            metadata,
        },
    }
}

/// Write `collection/id` with retries and connection resets.
pub async fn set_document_failsafe<T: Serialize>(
    connection: &ConnectionController,
    policy: &RetryPolicy,
    collection: &str,
    id: &str,
    data: &T,
    max_retries: u32,
    merge: bool,
) -> WriteResult {
    let fields = match to_fields(data) {
        Ok(fields) => fields,
        Err(err) => {
            return WriteResult {
                success: false,
                error: Some(err.message),
                metadata: AttemptMetadata {
                    attempts: 0,
                    duration_ms: 0,
                },
            }
        }
    };

    let store = connection.store();
    let (outcome, metadata) = run_with_retry(connection, policy, max_retries, "Write", || {
        store.set(collection, id, fields.clone(), merge)
    })
    .await;

    match outcome {
        Ok(()) => WriteResult {
            success: true,
            error: None,
            metadata,
        },
        Err(last) => WriteResult {
            success: false,
            error: Some(exhausted_message(last, WRITE_EXHAUSTED)),
            metadata,
        },
    }
}

fn exhausted_message(last: Option<StoreError>, fallback: &str) -> String {
    match last {
        Some(err) if !err.message.is_empty() => err.message,
        _ => fallback.to_string(),
    }
}
