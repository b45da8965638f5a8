//! Rate Limiter - minimum-spacing throttle per data API endpoint class
//!
//! The data API is paced per endpoint category:
//! - Trades feed (address discovery): 200 requests per 10 seconds
//! - Positions, closed positions, activity: 150 requests per 10 seconds each
//!
//! Each class spaces requests at least `window / max_requests` apart. The
//! classes are independent; one class never delays another.

use super::api_errors::DataApiError;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Rate limit endpoint classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// Trades feed used to discover addresses
    Discovery,
    /// Open positions by address
    Positions,
    /// Closed positions by address
    ClosedPositions,
    /// Activity by address
    Activity,
}

impl EndpointClass {
    pub fn name(&self) -> &'static str {
        match self {
            EndpointClass::Discovery => "discovery",
            EndpointClass::Positions => "positions",
            EndpointClass::ClosedPositions => "closed_positions",
            EndpointClass::Activity => "activity",
        }
    }
}

/// Requests allowed per window for one endpoint class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }

    /// Minimum spacing between two granted requests
    pub fn min_interval(&self) -> Duration {
        if self.max_requests == 0 {
            return self.window;
        }
        self.window / self.max_requests
    }
}

/// Per-class limits
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    pub discovery: RateLimit,
    pub positions: RateLimit,
    pub closed_positions: RateLimit,
    pub activity: RateLimit,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        let window = Duration::from_secs(10);
        Self {
            discovery: RateLimit::new(200, window),
            positions: RateLimit::new(150, window),
            closed_positions: RateLimit::new(150, window),
            activity: RateLimit::new(150, window),
        }
    }
}

/// A single-category throttle.
///
/// `next_slot` is the earliest instant the next request may go out. Callers
/// reserve a slot under the lock and sleep outside it, so concurrent callers
/// are spaced by `min_interval` in lock order.
pub struct Throttle {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            min_interval: limit.min_interval(),
            next_slot: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Reserve the next send slot and return how long to wait for it
    async fn reserve(&self) -> Duration {
        let mut next = self.next_slot.lock().await;
        let now = Instant::now();
        let slot = match *next {
            Some(at) if at > now => at,
            _ => now,
        };
        *next = Some(slot + self.min_interval);
        slot.saturating_duration_since(now)
    }

    /// Wait until a request may be issued.
    /// Returns true if we had to wait (i.e., were throttled).
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<bool, DataApiError> {
        if cancel.is_cancelled() {
            return Err(DataApiError::Cancelled);
        }

        let wait = self.reserve().await;
        if wait.is_zero() {
            return Ok(false);
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(DataApiError::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(true),
        }
    }
}

/// Rate limiter with one throttle per endpoint class
pub struct RateLimiter {
    discovery: Arc<Throttle>,
    positions: Arc<Throttle>,
    closed_positions: Arc<Throttle>,
    activity: Arc<Throttle>,
}

impl RateLimiter {
    pub fn new(config: &ThrottleConfig) -> Self {
        Self {
            discovery: Arc::new(Throttle::new(config.discovery)),
            positions: Arc::new(Throttle::new(config.positions)),
            closed_positions: Arc::new(Throttle::new(config.closed_positions)),
            activity: Arc::new(Throttle::new(config.activity)),
        }
    }

    /// Acquire a slot for the given endpoint class, waiting if necessary.
    /// Returns true if we had to wait.
    pub async fn acquire(
        &self,
        class: EndpointClass,
        cancel: &CancellationToken,
    ) -> Result<bool, DataApiError> {
        let throttle = self.get_throttle(class);
        let waited = throttle.acquire(cancel).await?;
        if waited {
            debug!("[Throttle] waited for {} slot", class.name());
        }
        Ok(waited)
    }

    fn get_throttle(&self, class: EndpointClass) -> &Arc<Throttle> {
        match class {
            EndpointClass::Discovery => &self.discovery,
            EndpointClass::Positions => &self.positions,
            EndpointClass::ClosedPositions => &self.closed_positions,
            EndpointClass::Activity => &self.activity,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&ThrottleConfig::default())
    }
}
