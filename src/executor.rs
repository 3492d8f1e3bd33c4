//! Reliable execution of a single remote call.
//!
//! [`RequestExecutor`] sends one [`ApiRequest`] through a classify/retry/backoff
//! loop and hands the outcome to a [`ResultHandler`]. Only transient failures
//! (transport errors and backend errors) are retried here; rate limiting is
//! surfaced to the caller, who owns the backoff for it.
//!
//! Classification uses the structured error body's first `reason` as the primary
//! key and the status as the fallback:
//!
//! | status    | reason                                    | outcome            |
//! |-----------|-------------------------------------------|--------------------|
//! | 403 / 429 | `rateLimitExceeded`, `userRateLimitExceeded` | `on_rate_limited` |
//! | 404       | `notFound`                                | `on_not_found`     |
//! | 409       | `duplicate`                               | `on_duplicate`     |
//! | 503       | `backendError`                            | retried            |
//! | other     |                                           | `on_error(Fatal)`  |

use crate::error::{ConnectorError, ConnectorResult};
use crate::transport::{ApiError, ApiRequest, ApiResponse, DirectoryTransport};
use async_trait::async_trait;
use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

static JITTER_RNG: LazyLock<Mutex<StdRng>> = LazyLock::new(|| Mutex::new(StdRng::from_entropy()));

fn jitter_ms(max_jitter_ms: u64) -> u64 {
    if max_jitter_ms == 0 {
        return 0;
    }
    // A poisoned RNG is still a usable RNG.
    let mut rng = JITTER_RNG
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    rng.gen_range(0..max_jitter_ms)
}

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial call.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// Exclusive upper bound of the random jitter added to each delay.
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
            max_jitter_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero based): `base * 2^attempt + jitter`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let base = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(base.saturating_add(jitter_ms(self.max_jitter_ms)))
    }
}

/// Suspends the calling task between retries.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Receives the classified outcome of a call.
///
/// Only [`handle`](Self::handle) is required; every other outcome defaults to the
/// matching [`ConnectorError`].
pub trait ResultHandler<R>: Send + Sync {
    /// Called with the body of a 2xx response (`None` for an empty body).
    fn handle(&self, body: Option<Value>) -> ConnectorResult<R>;

    fn on_not_found(&self, error: ApiError) -> ConnectorResult<R> {
        Err(ConnectorError::NotFound {
            message: error.message,
        })
    }

    fn on_duplicate(&self, error: ApiError) -> ConnectorResult<R> {
        Err(ConnectorError::AlreadyExists {
            message: error.message,
        })
    }

    fn on_rate_limited(&self, error: ApiError) -> ConnectorResult<R> {
        Err(ConnectorError::RateLimited {
            reason: error.reason().to_string(),
            message: error.message,
        })
    }

    /// Called with `Fatal` errors and with `Transient` once retries are exhausted.
    fn on_error(&self, error: ConnectorError) -> ConnectorResult<R> {
        Err(error)
    }
}

fn decode<T: DeserializeOwned>(body: Option<Value>) -> ConnectorResult<T> {
    Ok(serde_json::from_value(body.unwrap_or(Value::Null))?)
}

/// Deserializes the success body.
pub struct Decode<T>(PhantomData<fn() -> T>);

impl<T> Decode<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Decode<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> ResultHandler<T> for Decode<T> {
    fn handle(&self, body: Option<Value>) -> ConnectorResult<T> {
        decode(body)
    }
}

/// Result of a direct fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Found(T),
    NotFound,
}

impl<T> Fetched<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Fetched::Found(value) => Some(value),
            Fetched::NotFound => None,
        }
    }
}

/// Deserializes the success body and turns "not found" into [`Fetched::NotFound`].
pub struct Fetch<T>(PhantomData<fn() -> T>);

impl<T> Fetch<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Fetch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> ResultHandler<Fetched<T>> for Fetch<T> {
    fn handle(&self, body: Option<Value>) -> ConnectorResult<Fetched<T>> {
        decode(body).map(Fetched::Found)
    }

    fn on_not_found(&self, _error: ApiError) -> ConnectorResult<Fetched<T>> {
        Ok(Fetched::NotFound)
    }
}

/// Treats "already exists" and "not found" as the desired state being reached.
#[derive(Debug, Clone, Copy, Default)]
pub struct Converge;

impl ResultHandler<()> for Converge {
    fn handle(&self, _body: Option<Value>) -> ConnectorResult<()> {
        Ok(())
    }

    fn on_not_found(&self, error: ApiError) -> ConnectorResult<()> {
        debug!("Converged on not found: {}", error.message);
        Ok(())
    }

    fn on_duplicate(&self, error: ApiError) -> ConnectorResult<()> {
        debug!("Converged on duplicate: {}", error.message);
        Ok(())
    }
}

/// Ignores the success body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl ResultHandler<()> for Discard {
    fn handle(&self, _body: Option<Value>) -> ConnectorResult<()> {
        Ok(())
    }
}

enum Outcome {
    NotFound(ApiError),
    Duplicate(ApiError),
    RateLimited(ApiError),
    Transient(String),
    Fatal(ApiError),
}

fn classify(response: &ApiResponse) -> Outcome {
    let error = ApiError::from_response(response).unwrap_or_else(|| {
        ApiError::new(response.status, "", "unstructured error response")
    });
    match (response.status, error.reason()) {
        (_, "rateLimitExceeded" | "userRateLimitExceeded") | (429, _) => {
            Outcome::RateLimited(error)
        }
        (_, "notFound") | (404, _) => Outcome::NotFound(error),
        (_, "duplicate") | (409, _) => Outcome::Duplicate(error),
        (_, "backendError") | (503, _) => {
            Outcome::Transient(format!("{} {}", response.status, error.message))
        }
        _ => Outcome::Fatal(error),
    }
}

/// Runs remote calls with classification and backoff.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn DirectoryTransport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl RequestExecutor {
    /// Create an executor sleeping on the tokio timer.
    pub fn new(transport: Arc<dyn DirectoryTransport>, policy: RetryPolicy) -> Self {
        Self::with_sleeper(transport, policy, Arc::new(TokioSleeper))
    }

    /// Create an executor with a custom [`Sleeper`].
    pub fn with_sleeper(
        transport: Arc<dyn DirectoryTransport>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `request` immediately.
    pub async fn execute<R, H>(&self, request: &ApiRequest, handler: &H) -> ConnectorResult<R>
    where
        H: ResultHandler<R> + ?Sized,
    {
        self.execute_from(request, handler, None).await
    }

    /// Run `request` as retry number `attempt`, sleeping the backoff delay first.
    ///
    /// `None` runs immediately. Retries continue until `max_retries` retries have
    /// been made in total.
    pub async fn execute_from<R, H>(
        &self,
        request: &ApiRequest,
        handler: &H,
        attempt: Option<u32>,
    ) -> ConnectorResult<R>
    where
        H: ResultHandler<R> + ?Sized,
    {
        let mut attempt = attempt;
        let mut calls = 0u32;
        loop {
            if let Some(n) = attempt {
                let delay = self.policy.delay_for(n);
                debug!("Retry {} of {} after {:?}", n + 1, request, delay);
                self.sleeper.sleep(delay).await;
            }

            calls += 1;
            trace!("Sending {}", request);
            let failure = match self.transport.send(request.clone()).await {
                Ok(response) if response.is_success() => return handler.handle(response.body),
                Ok(response) => match classify(&response) {
                    Outcome::NotFound(error) => return handler.on_not_found(error),
                    Outcome::Duplicate(error) => return handler.on_duplicate(error),
                    Outcome::RateLimited(error) => {
                        warn!("Rate limited on {}: {}", request, error.message);
                        return handler.on_rate_limited(error);
                    }
                    Outcome::Fatal(error) => {
                        return handler.on_error(ConnectorError::Fatal {
                            status: response.status,
                            reason: error.reason().to_string(),
                            message: error.message,
                        });
                    }
                    Outcome::Transient(message) => message,
                },
                Err(error) => error.to_string(),
            };

            let next = attempt.map_or(0, |n| n + 1);
            if next >= self.policy.max_retries {
                warn!("Giving up on {} after {} calls: {}", request, calls, failure);
                return handler.on_error(ConnectorError::Transient {
                    attempts: calls,
                    message: failure,
                });
            }
            warn!("Transient failure on {}: {}", request, failure);
            attempt = Some(next);
        }
    }
}
