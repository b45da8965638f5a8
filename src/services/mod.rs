//! Request plumbing shared by every data API call

pub mod api_errors;
pub mod metrics;
pub mod rate_limiter;
pub mod retry;

pub use api_errors::DataApiError;
pub use metrics::{CollectorMetrics, MetricsSnapshot};
pub use rate_limiter::{EndpointClass, RateLimit, RateLimiter, ThrottleConfig};
pub use retry::{with_retry, RetryConfig};
