use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{caller_key, param};
use crate::middleware::Middleware;
use crate::pipeline::Next;
use crate::request::Request;
use courier_core::{CoreResult, Response, ServiceError};

/// In-flight counters per caller, shared by every `concurrency` instance of
/// a registry.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencySlots {
    slots: Arc<Mutex<HashMap<String, Arc<AtomicUsize>>>>,
}

impl ConcurrencySlots {
    fn counter(&self, call: &str) -> Arc<AtomicUsize> {
        self.slots
            .lock()
            .entry(call.to_string())
            .or_default()
            .clone()
    }

    /// Returns the number of in-flight requests holding a slot for `call`.
    pub fn in_flight(&self, call: &str) -> usize {
        self.slots
            .lock()
            .get(call)
            .map_or(0, |counter| counter.load(Ordering::Acquire))
    }
}

/// Caps in-flight requests per caller: `concurrency:limit`.
///
/// The slot is taken in the forward pass and given back in the termination
/// pass. An instance that is dropped while still holding its slot gives it
/// back then.
#[derive(Debug)]
pub struct ConcurrencyLimit {
    limit: usize,
    slots: ConcurrencySlots,
    held: Mutex<Option<Arc<AtomicUsize>>>,
}

impl ConcurrencyLimit {
    /// Creates a limiter admitting `limit` concurrent requests per caller.
    pub fn new(limit: usize, slots: ConcurrencySlots) -> Self {
        Self {
            limit,
            slots,
            held: Mutex::new(None),
        }
    }

    /// Builds a limiter from `[limit]`.
    pub fn from_params(params: &[String], slots: &ConcurrencySlots) -> CoreResult<Self> {
        let limit = param("concurrency", params, 0, 1usize)?;
        Ok(Self::new(limit, slots.clone()))
    }

    fn release(&self) {
        if let Some(counter) = self.held.lock().take() {
            counter.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

#[async_trait]
impl Middleware for ConcurrencyLimit {
    async fn handle(&self, request: &mut Request, next: Next<'_>) -> CoreResult<Response> {
        let call = caller_key(request);
        let counter = self.slots.counter(&call);

        let acquired = counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.limit).then_some(current + 1)
            })
            .is_ok();
        if !acquired {
            debug!(call = %call, limit = self.limit, "Concurrency limit reached");
            return Err(ServiceError::too_many_requests(format!(
                "'{call}' is busy, retry later"
            ))
            .into());
        }
        *self.held.lock() = Some(counter);

        next.run(request).await
    }

    async fn terminate(&self, _request: &Request, _response: &Response) -> CoreResult<()> {
        self.release();
        Ok(())
    }
}

impl Drop for ConcurrencyLimit {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{builtin_pipeline, forward, request};
    use super::*;
    use courier_core::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_slot_held_until_terminate() {
        let pipeline = builtin_pipeline();

        let mut first = request("report", json!({}));
        forward(&pipeline, &mut first, "concurrency:1").await.unwrap();

        let mut second = request("report", json!({}));
        let err = forward(&pipeline, &mut second, "concurrency:1")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);

        // Other callers are unaffected.
        let mut other = request("ping", json!({}));
        assert!(forward(&pipeline, &mut other, "concurrency:1").await.is_ok());

        pipeline.terminate(&first, &Response::new(), &[]).await;
        pipeline.terminate(&second, &Response::new(), &[]).await;

        let mut third = request("report", json!({}));
        assert!(forward(&pipeline, &mut third, "concurrency:1").await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let slots = ConcurrencySlots::default();
        let limiter = ConcurrencyLimit::new(1, slots.clone());
        *limiter.held.lock() = Some(slots.counter("x"));
        slots.counter("x").fetch_add(1, Ordering::AcqRel);
        assert_eq!(slots.in_flight("x"), 1);

        drop(limiter);
        assert_eq!(slots.in_flight("x"), 0);
    }
}
