use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, Method};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::InputError;

/// Header carrying the target URL of a deferred request.
pub const CALLBACK_URL_HEADER: &str = "callback-url";

/// Header carrying the delay, in whole seconds, before the request fires.
pub const CALLBACK_DELAY_HEADER: &str = "callback-delay";

/// Longest accepted delay: 365 days.
pub const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Unique identifier for a registered callback.
///
/// Allocated by the registry from a monotonically increasing counter,
/// starting at 1. Identifiers are never reused within one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallbackId(pub u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CallbackId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(CallbackId)
    }
}

/// A deferred request, validated and ready to be registered.
///
/// The headers are an owned copy with the control headers removed, so the
/// inbound request that produced this value can be dropped freely.
#[derive(Debug, Clone)]
pub struct NewCallback {
    /// Method used for the outbound request.
    pub method: Method,

    /// Target of the outbound request.
    pub url: Url,

    /// Time to wait before firing.
    pub delay: Duration,

    /// Headers forwarded verbatim to the target.
    pub headers: HeaderMap,

    /// Body forwarded verbatim to the target.
    pub body: Bytes,
}

impl NewCallback {
    /// Create a callback with no headers and an empty body.
    pub fn new(method: Method, url: Url, delay: Duration) -> Self {
        Self {
            method,
            url,
            delay,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Build a callback from the parts of an inbound registration request.
    ///
    /// Reads `Callback-Url` and `Callback-Delay`, copies every other header,
    /// and keeps the body as-is. Nothing is registered if this fails.
    pub fn from_request_parts(
        method: Method,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Self, InputError> {
        let raw_url = header_str(headers, CALLBACK_URL_HEADER)?;
        let raw_delay = header_str(headers, CALLBACK_DELAY_HEADER)?;
        let (Some(raw_url), Some(raw_delay)) = (raw_url, raw_delay) else {
            return Err(InputError::MissingControlHeaders);
        };

        let delay = parse_delay(raw_delay)?;
        let url = parse_target(raw_url)?;

        let mut forwarded = headers.clone();
        forwarded.remove(CALLBACK_URL_HEADER);
        forwarded.remove(CALLBACK_DELAY_HEADER);

        Ok(Self {
            method,
            url,
            delay,
            headers: forwarded,
            body,
        })
    }

    /// Add a header to forward with the request.
    pub fn with_header(mut self, name: HeaderName, value: http::HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the body forwarded with the request.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Empty values count as missing.
fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, InputError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| InputError::InvalidHeaderValue(name))?
                .trim();
            Ok((!value.is_empty()).then_some(value))
        }
    }
}

/// Parse a delay expressed in whole, non-negative seconds, at most [`MAX_DELAY`].
pub fn parse_delay(raw: &str) -> Result<Duration, InputError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .ok()
        .filter(|delay| *delay <= MAX_DELAY)
        .ok_or_else(|| InputError::InvalidDelay(raw.to_string()))
}

/// Parse an absolute `http` or `https` target URL.
pub fn parse_target(raw: &str) -> Result<Url, InputError> {
    let url = Url::parse(raw.trim()).map_err(|_| InputError::InvalidUrl(raw.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(InputError::InvalidUrl(raw.to_string())),
    }
}

/// Snapshot of a pending callback, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackStatus {
    pub request_id: CallbackId,

    /// `"<method> <url>"`.
    pub callback_info: String,

    /// Whole seconds until firing, truncated toward zero.
    /// Zero or negative when firing is imminent or overdue.
    pub time_remaining: i64,
}

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: CallbackId,
    pub method: Method,
    pub url: Url,
    pub delay: Duration,
    pub fire_at: tokio::time::Instant,
}

impl Registration {
    /// Status as reported at creation time: the full requested delay.
    pub fn status(&self) -> CallbackStatus {
        CallbackStatus {
            request_id: self.id,
            callback_info: format!("{} {}", self.method, self.url),
            time_remaining: i64::try_from(self.delay.as_secs()).unwrap_or(i64::MAX),
        }
    }
}

/// Outcome of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The timer was stopped before firing and the entry removed.
    Cancelled,

    /// Unknown id, or the callback already fired (or is firing).
    NotFound,
}
