//! Pacing of DBLP calls and classification of rate-limit responses.
//!
//! The driver never decides on its own how long to wait: it calls
//! [`Pacer::pause`] after each external call and the injected pacer decides.
//! No pacer retries or adapts; a 429 is surfaced as
//! [`DbQueryError::RateLimited`] and ends the batch like any other query error.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use thiserror::Error;

use crate::{CoreError, PacingMode};

/// Type alias for governor's direct rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Failure of a search or record fetch.
#[derive(Error, Debug, Clone)]
pub enum DbQueryError {
    /// DBLP answered 429 Too Many Requests.
    #[error("DBLP rate limit hit (HTTP 429){}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    /// Transport failure, unexpected status or undecodable body.
    #[error("{0}")]
    Other(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(", retry after {:.1}s", d.as_secs_f64()),
        None => String::new(),
    }
}

/// Turn a 429 response into [`DbQueryError::RateLimited`], carrying the
/// server's `Retry-After` hint when it sent one.
pub fn check_rate_limit_response(resp: &reqwest::Response) -> Result<(), DbQueryError> {
    if resp.status() != reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Ok(());
    }
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    tracing::warn!(?retry_after, "DBLP rate limit hit");
    Err(DbQueryError::RateLimited { retry_after })
}

/// Parse a Retry-After header value: delta-seconds, or an HTTP-date
/// turned into the time left until it. A date in the past means no wait.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let left = at.with_timezone(&Utc) - Utc::now();
    Some(left.to_std().unwrap_or(Duration::ZERO))
}

/// Spaces consecutive calls to the external service.
pub trait Pacer: Send + Sync {
    /// Wait until the next call may be made.
    fn pause<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Sleep the full interval on every pause, whatever happened before.
pub struct FixedDelay {
    interval: Duration,
}

impl FixedDelay {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Pacer for FixedDelay {
    fn pause<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            tracing::debug!(secs = self.interval.as_secs_f64(), "pausing");
            tokio::time::sleep(self.interval).await;
        })
    }
}

/// Fixed-interval gate backed by a governor limiter with a burst of one.
///
/// A pause returns as soon as at least one interval has passed since the
/// previous pause returned, so time spent on the request itself counts
/// towards the wait. The first pause waits a full interval from the moment
/// it is entered.
pub struct GovernorGate {
    limiter: DirectLimiter,
    interval: Duration,
    primed: AtomicBool,
}

impl GovernorGate {
    /// Returns `None` for a zero interval.
    pub fn new(interval: Duration) -> Option<Self> {
        let quota = Quota::with_period(interval)?;
        Some(Self {
            limiter: DirectLimiter::direct(quota),
            interval,
            primed: AtomicBool::new(false),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Pacer for GovernorGate {
    fn pause<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            // The limiter starts with one free permit; spend it here so the
            // call that preceded this pause is also an interval away.
            if !self.primed.swap(true, Ordering::SeqCst) {
                self.limiter.until_ready().await;
            }
            self.limiter.until_ready().await;
        })
    }
}

/// Never waits.
pub struct NoPacing;

impl Pacer for NoPacing {
    fn pause<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}

/// Build the pacer for `mode` with the given interval.
pub fn build_pacer(mode: PacingMode, interval: Duration) -> Result<Box<dyn Pacer>, CoreError> {
    match mode {
        PacingMode::Sleep => Ok(Box::new(FixedDelay::new(interval))),
        PacingMode::Gate => GovernorGate::new(interval)
            .map(|g| Box::new(g) as Box<dyn Pacer>)
            .ok_or_else(|| CoreError::Config("gate pacing needs a non-zero interval".into())),
        PacingMode::None => Ok(Box::new(NoPacing)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── parse_retry_after ──────────────────────────────────────────────

    #[test]
    fn parse_integer_seconds() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn parse_past_http_date_is_zero() {
        let val = "Wed, 21 Oct 2015 07:28:00 GMT";
        assert_eq!(parse_retry_after(val), Some(Duration::ZERO));
    }

    #[test]
    fn parse_future_http_date() {
        let at = Utc::now() + chrono::Duration::seconds(120);
        let wait = parse_retry_after(&at.to_rfc2822()).unwrap();
        assert!(wait <= Duration::from_secs(120), "{wait:?}");
        assert!(wait >= Duration::from_secs(110), "{wait:?}");
    }

    #[test]
    fn parse_garbage_none() {
        assert_eq!(parse_retry_after("xyz"), None);
    }

    // ── check_rate_limit_response ──────────────────────────────────────

    #[test]
    fn ok_on_200() {
        let http_resp = http::Response::builder().status(200).body("").unwrap();
        let resp = reqwest::Response::from(http_resp);
        assert!(check_rate_limit_response(&resp).is_ok());
    }

    #[test]
    fn ok_on_404() {
        let http_resp = http::Response::builder().status(404).body("").unwrap();
        let resp = reqwest::Response::from(http_resp);
        assert!(check_rate_limit_response(&resp).is_ok());
    }

    #[test]
    fn rate_limited_429_with_retry_after() {
        let http_resp = http::Response::builder()
            .status(429)
            .header("retry-after", "10")
            .body("")
            .unwrap();
        let resp = reqwest::Response::from(http_resp);
        let err = check_rate_limit_response(&resp).unwrap_err();
        match err {
            DbQueryError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(10)));
            }
            _ => panic!("expected RateLimited"),
        }
    }

    #[test]
    fn display_rate_limited() {
        let err = DbQueryError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(
            err.to_string(),
            "DBLP rate limit hit (HTTP 429), retry after 3.0s"
        );
        let bare = DbQueryError::RateLimited { retry_after: None };
        assert_eq!(bare.to_string(), "DBLP rate limit hit (HTTP 429)");
    }

    // ── pacers ─────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn fixed_delay_waits_every_time() {
        let pacer = FixedDelay::new(Duration::from_secs(5));
        let start = tokio::time::Instant::now();
        pacer.pause().await;
        pacer.pause().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(11), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn gate_first_pause_waits() {
        let gate = GovernorGate::new(Duration::from_secs(60)).unwrap();
        let first = tokio::time::timeout(Duration::from_millis(50), gate.pause()).await;
        assert!(first.is_err());
    }

    // Governor keeps its own clock, so allow a millisecond of skew against
    // std::time::Instant.
    const SKEW: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn gate_spaces_consecutive_pauses() {
        let interval = Duration::from_millis(150);
        let gate = GovernorGate::new(interval).unwrap();
        let start = std::time::Instant::now();
        gate.pause().await;
        let first = start.elapsed();
        gate.pause().await;
        let second = start.elapsed();
        assert!(first + SKEW >= interval, "first pause after {first:?}");
        assert!(second - first + SKEW >= interval, "gap {:?}", second - first);
    }

    #[test]
    fn gate_rejects_zero_interval() {
        assert!(GovernorGate::new(Duration::ZERO).is_none());
        assert!(build_pacer(PacingMode::Gate, Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn no_pacing_returns() {
        NoPacing.pause().await;
        let pacer = build_pacer(PacingMode::None, Duration::from_secs(5)).unwrap();
        pacer.pause().await;
    }
}
