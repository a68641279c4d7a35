//! Tower integration.
//!
//! [`KernelService`] exposes a [`Kernel`] as a
//! `tower::Service<Vec<u8>, Response = WireResponse>` so a transport can drive
//! it and stack ordinary tower layers (timeouts, concurrency limits, load
//! shedding) on top:
//!
//! ```rust,ignore
//! use tower::{ServiceBuilder, ServiceExt};
//!
//! let service = ServiceBuilder::new()
//!     .timeout(Duration::from_secs(5))
//!     .service(KernelService::new(kernel));
//!
//! let wire = service.oneshot(raw_bytes).await?;
//! ```
//!
//! The response is returned as soon as it is final. The termination pass
//! then runs on a spawned task when a tokio runtime is available, and inline
//! otherwise. Spawned passes keep the kernel `Handling` until they finish, and
//! [`Kernel::drain`] waits for them.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::Service;
use tracing::Instrument;

use crate::kernel::Kernel;
use courier_core::WireResponse;
use courier_framework::Request;

/// A cloneable tower service handling raw messages with a shared kernel.
#[derive(Debug, Clone)]
pub struct KernelService {
    kernel: Arc<Kernel>,
}

impl KernelService {
    /// Wraps a kernel.
    pub fn new(kernel: impl Into<Arc<Kernel>>) -> Self {
        Self {
            kernel: kernel.into(),
        }
    }

    /// Returns the kernel.
    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }
}

impl Service<Vec<u8>> for KernelService {
    type Response = WireResponse;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<WireResponse, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, raw: Vec<u8>) -> Self::Future {
        let kernel = Arc::clone(&self.kernel);

        Box::pin(async move {
            let in_flight = kernel.in_flight_token();
            let mut request = Request::new(raw);
            let response = kernel.handle(&mut request).await;
            let wire = response.to_wire();

            let termination = async move {
                kernel.terminate(&request, &response).await;
                drop(in_flight);
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(termination.in_current_span());
                }
                Err(_) => termination.await,
            }

            Ok(wire)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelState;
    use courier_core::{CoreResult, Packer, Response, StatusCode};
    use courier_framework::{Matcher, Middleware, Next};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::oneshot;
    use tower::ServiceExt;

    struct CountTerminations(Arc<AtomicU32>);

    #[async_trait::async_trait]
    impl Middleware for CountTerminations {
        async fn handle(&self, request: &mut Request, next: Next<'_>) -> CoreResult<Response> {
            next.run(request).await
        }

        async fn terminate(&self, _request: &Request, _response: &Response) -> CoreResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_service_answers_and_terminates() {
        let terminated = Arc::new(AtomicU32::new(0));
        let kernel = Kernel::builder()
            .register_middleware("count", CountTerminations(terminated.clone()))
            .middleware("count")
            .caller(Matcher::new("ping").handler(|| async { json!({"ok": true}) }))
            .build()
            .unwrap();
        let service = KernelService::new(kernel);

        let raw = Packer::plain()
            .pack_value(&json!({"call": "ping"}))
            .map(|packed| courier_core::wire_body(Some(packed.as_slice())))
            .unwrap();
        let wire = service.clone().oneshot(raw).await.unwrap();
        assert_eq!(wire.status, StatusCode::OK);

        let body: serde_json::Value = serde_json::from_slice(&wire.body).unwrap();
        assert_eq!(body, json!({"data": "{\"ok\":true}"}));

        // Termination runs on a spawned task.
        for _ in 0..50 {
            if terminated.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(terminated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_service_without_runtime_terminates_inline() {
        let terminated = Arc::new(AtomicU32::new(0));
        let kernel = Kernel::builder()
            .register_middleware("count", CountTerminations(terminated.clone()))
            .middleware("count")
            .build()
            .unwrap();

        let wire = futures::executor::block_on(
            KernelService::new(kernel).oneshot(b"not json".to_vec()),
        )
        .unwrap();
        assert_eq!(wire.status, StatusCode::BAD_REQUEST);
        assert_eq!(terminated.load(Ordering::SeqCst), 1);
    }

    /// Holds its termination hook open until released.
    struct SlowTermination {
        entered: Mutex<Option<oneshot::Sender<()>>>,
        release: Mutex<Option<oneshot::Receiver<()>>>,
        finished: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl Middleware for SlowTermination {
        async fn handle(&self, request: &mut Request, next: Next<'_>) -> CoreResult<Response> {
            next.run(request).await
        }

        async fn terminate(&self, _request: &Request, _response: &Response) -> CoreResult<()> {
            let entered = self.entered.lock().take();
            let release = self.release.lock().take();
            if let Some(tx) = entered {
                let _ = tx.send(());
            }
            if let Some(rx) = release {
                let _ = rx.await;
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_spawned_termination_is_tracked() {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let finished = Arc::new(AtomicU32::new(0));
        let kernel = Arc::new(
            Kernel::builder()
                .register_middleware(
                    "slow",
                    SlowTermination {
                        entered: Mutex::new(Some(entered_tx)),
                        release: Mutex::new(Some(release_rx)),
                        finished: finished.clone(),
                    },
                )
                .middleware("slow")
                .build()
                .unwrap(),
        );
        kernel.bootstrap().unwrap();

        let wire = KernelService::new(kernel.clone())
            .oneshot(b"not json".to_vec())
            .await
            .unwrap();
        assert_eq!(wire.status, StatusCode::BAD_REQUEST);
        assert_eq!(kernel.state(), KernelState::Handling);

        entered_rx.await.unwrap();
        let drain = tokio::spawn({
            let kernel = kernel.clone();
            async move { kernel.drain().await }
        });
        tokio::task::yield_now().await;
        assert!(!drain.is_finished());
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        release_tx.send(()).unwrap();
        drain.await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
