// =============================================================================
// Rate-Limit Tracker — follows the exchange's remaining-request budget
// =============================================================================
//
// Every response carries a header of the form
//
//   Remaining-Req: group=default; min=1800; sec=29
//
// The tracker records the per-second budget of the last response. When it
// reaches zero, the next request waits out the rest of that second before
// going out.
// =============================================================================

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

const REMAINING_REQ_HEADER: &str = "remaining-req";

/// Length of the exchange's per-second window.
const WINDOW: Duration = Duration::from_secs(1);

/// Parsed form of one `Remaining-Req` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemainingReq {
    pub group: String,
    pub per_minute: Option<u32>,
    pub per_second: u32,
}

impl RemainingReq {
    /// Parse `group=...; min=...; sec=...`. The `min` field is optional.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut group = None;
        let mut per_minute = None;
        let mut per_second = None;

        for part in raw.split(';') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key.trim() {
                "group" => group = Some(value.trim().to_string()),
                "min" => per_minute = value.trim().parse().ok(),
                "sec" => per_second = value.trim().parse().ok(),
                _ => {}
            }
        }

        Some(Self {
            group: group?,
            per_minute,
            per_second: per_second?,
        })
    }
}

/// Tracks the most recent per-second budget reported by the exchange.
pub struct RateLimitTracker {
    remaining_sec: AtomicU32,
    last_update: Mutex<Option<Instant>>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self {
            remaining_sec: AtomicU32::new(u32::MAX),
            last_update: Mutex::new(None),
        }
    }

    /// Update internal counters from the HTTP response headers.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        let Some(parsed) = headers
            .get(REMAINING_REQ_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(RemainingReq::parse)
        else {
            return;
        };
        self.record(&parsed);
    }

    pub fn record(&self, remaining: &RemainingReq) {
        self.remaining_sec.store(remaining.per_second, Ordering::Relaxed);
        *self.last_update.lock() = Some(Instant::now());

        if remaining.per_second == 0 {
            warn!(group = %remaining.group, "per-second request budget exhausted");
        } else {
            debug!(
                group = %remaining.group,
                sec = remaining.per_second,
                min = ?remaining.per_minute,
                "rate-limit budget updated"
            );
        }
    }

    /// How long the next request must wait, if at all.
    pub fn required_delay(&self) -> Option<Duration> {
        if self.remaining_sec.load(Ordering::Relaxed) > 0 {
            return None;
        }
        let last = (*self.last_update.lock())?;
        WINDOW.checked_sub(last.elapsed()).filter(|d| !d.is_zero())
    }

    /// Sleep until the per-second window has rolled over when the budget is
    /// exhausted.
    pub async fn wait_if_needed(&self) {
        if let Some(delay) = self.required_delay() {
            debug!(delay_ms = delay.as_millis() as u64, "throttling request");
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitTracker")
            .field("remaining_sec", &self.remaining_sec.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn parses_full_header() {
        let parsed = RemainingReq::parse("group=default; min=1800; sec=29").unwrap();
        assert_eq!(parsed.group, "default");
        assert_eq!(parsed.per_minute, Some(1800));
        assert_eq!(parsed.per_second, 29);
    }

    #[test]
    fn parses_header_without_minute_budget() {
        let parsed = RemainingReq::parse("group=order; sec=7").unwrap();
        assert_eq!(parsed.group, "order");
        assert_eq!(parsed.per_minute, None);
        assert_eq!(parsed.per_second, 7);
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(RemainingReq::parse("garbage").is_none());
        assert!(RemainingReq::parse("group=default; sec=abc").is_none());
    }

    #[test]
    fn fresh_tracker_never_waits() {
        assert!(RateLimitTracker::new().required_delay().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_waits_out_the_second() {
        let tracker = RateLimitTracker::new();
        let mut headers = HeaderMap::new();
        headers.insert(
            REMAINING_REQ_HEADER,
            HeaderValue::from_static("group=default; min=1799; sec=0"),
        );
        tracker.update_from_headers(&headers);

        let delay = tracker.required_delay().unwrap();
        assert!(delay <= WINDOW);

        tokio::time::advance(WINDOW).await;
        assert!(tracker.required_delay().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_budget_does_not_wait() {
        let tracker = RateLimitTracker::new();
        tracker.record(&RemainingReq {
            group: "default".into(),
            per_minute: Some(100),
            per_second: 3,
        });
        assert!(tracker.required_delay().is_none());
    }
}
