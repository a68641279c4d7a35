use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{caller_key, param};
use crate::middleware::Middleware;
use crate::pipeline::Next;
use crate::request::Request;
use courier_core::{CoreResult, Response, ServiceError};

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

/// Fixed-window counters shared by every `throttle` instance of a registry.
///
/// Counters are keyed by caller and limit, so two callers never share a
/// budget and the same caller under different limits keeps separate counts.
#[derive(Debug, Clone, Default)]
pub struct ThrottleWindows {
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl ThrottleWindows {
    /// Counts a hit for `key`. Returns `false` when the window is exhausted.
    fn hit(&self, key: String, max: u32, window: Duration) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let entry = windows.entry(key).or_insert(Window {
            started: now,
            hits: 0,
        });

        if now.duration_since(entry.started) >= window {
            *entry = Window {
                started: now,
                hits: 0,
            };
        }

        if entry.hits >= max {
            return false;
        }
        entry.hits += 1;
        true
    }
}

/// Fixed-window rate limit per caller: `throttle:max,window_secs`.
#[derive(Debug, Clone)]
pub struct Throttle {
    max: u32,
    window: Duration,
    windows: ThrottleWindows,
}

impl Throttle {
    /// Default number of requests per window.
    pub const DEFAULT_MAX: u32 = 60;
    /// Default window length in seconds.
    pub const DEFAULT_WINDOW_SECS: u64 = 60;

    /// Creates a throttle allowing `max` requests per `window`.
    pub fn new(max: u32, window: Duration, windows: ThrottleWindows) -> Self {
        Self {
            max,
            window,
            windows,
        }
    }

    /// Builds a throttle from `[max, window_secs]`.
    pub fn from_params(params: &[String], windows: &ThrottleWindows) -> CoreResult<Self> {
        let max = param("throttle", params, 0, Self::DEFAULT_MAX)?;
        let secs = param("throttle", params, 1, Self::DEFAULT_WINDOW_SECS)?;
        Ok(Self::new(max, Duration::from_secs(secs), windows.clone()))
    }
}

#[async_trait]
impl Middleware for Throttle {
    async fn handle(&self, request: &mut Request, next: Next<'_>) -> CoreResult<Response> {
        let call = caller_key(request);
        let key = format!("{call}|{}/{}", self.max, self.window.as_secs());

        if !self.windows.hit(key, self.max, self.window) {
            debug!(call = %call, max = self.max, "Throttled request");
            return Err(ServiceError::too_many_requests(format!(
                "too many requests for '{call}', retry later"
            ))
            .into());
        }

        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{builtin_pipeline, run_once};
    use super::*;
    use courier_core::StatusCode;

    #[tokio::test]
    async fn test_rejects_past_limit() {
        let pipeline = builtin_pipeline();

        assert!(run_once(&pipeline, "throttle:2,3600", "ping").await.is_ok());
        assert!(run_once(&pipeline, "throttle:2,3600", "ping").await.is_ok());
        let err = run_once(&pipeline, "throttle:2,3600", "ping")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);

        // Budgets are per caller.
        assert!(run_once(&pipeline, "throttle:2,3600", "pong").await.is_ok());
    }

    #[test]
    fn test_window_resets() {
        let windows = ThrottleWindows::default();
        assert!(windows.hit("k".into(), 1, Duration::ZERO));
        assert!(windows.hit("k".into(), 1, Duration::ZERO));

        assert!(windows.hit("j".into(), 1, Duration::from_secs(3600)));
        assert!(!windows.hit("j".into(), 1, Duration::from_secs(3600)));
    }

    #[test]
    fn test_params() {
        let windows = ThrottleWindows::default();
        let throttle = Throttle::from_params(&[], &windows).unwrap();
        assert_eq!(throttle.max, Throttle::DEFAULT_MAX);
        assert_eq!(throttle.window, Duration::from_secs(60));

        assert!(Throttle::from_params(&["x".into()], &windows).is_err());
    }
}
