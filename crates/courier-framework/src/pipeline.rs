//! The onion-style middleware pipeline.
//!
//! # Forward pass
//!
//! [`Pipeline::run`] walks a middleware list in order by continuation
//! passing: each middleware receives a [`Next`] that, when run, resolves and
//! enters the following middleware, and after the last one calls the
//! [`Endpoint`]. A middleware that returns without running `next`
//! short-circuits everything after it.
//!
//! ```text
//!   ┌─ A ──────────────────────────────────┐
//!   │   ┌─ B ──────────────────────────┐   │
//!   │   │   ┌─ C ──────────────────┐   │   │
//!   │   │   │      endpoint        │   │   │
//!   │   │   └──────────────────────┘   │   │
//!   │   └──────────────────────────────┘   │
//!   └──────────────────────────────────────┘
//! ```
//!
//! Every middleware is resolved from the registry lazily, when the chain
//! reaches it, and recorded on the request as entered.
//!
//! # Termination pass
//!
//! [`Pipeline::terminate`] visits the recorded instances in list order
//! (A, B, C, not reversed). A failing or panicking hook is logged and
//! returned to the caller; the remaining hooks still run.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{trace, warn};

use crate::middleware::{MiddlewareRegistry, MiddlewareSpec, ResolvedMiddleware};
use crate::request::Request;
use courier_core::{CoreError, CoreResult, Response};

/// The innermost step of the pipeline, reached when no middleware
/// short-circuits.
pub trait Endpoint: Send + Sync {
    /// Produces the response for `request`.
    fn call<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, CoreResult<Response>>;
}

/// The rest of the chain, handed to each middleware.
pub struct Next<'a> {
    registry: &'a MiddlewareRegistry,
    remaining: &'a [MiddlewareSpec],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        registry: &'a MiddlewareRegistry,
        remaining: &'a [MiddlewareSpec],
        endpoint: &'a dyn Endpoint,
    ) -> Self {
        Self {
            registry,
            remaining,
            endpoint,
        }
    }

    /// Returns the number of middleware still ahead in the chain.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Runs the remainder of the chain.
    pub fn run<'r>(self, request: &'r mut Request) -> BoxFuture<'r, CoreResult<Response>>
    where
        'a: 'r,
    {
        Box::pin(async move {
            let Some((spec, rest)) = self.remaining.split_first() else {
                trace!("Reached endpoint");
                return self.endpoint.call(request).await;
            };

            let middleware = self.registry.resolve(spec)?;
            request.record_entered(middleware.clone());
            trace!(middleware = %spec, "Entering middleware");

            let next = Next::new(self.registry, rest, self.endpoint);
            middleware.instance().handle(request, next).await
        })
    }
}

/// A hook that failed during the termination pass.
#[derive(Debug, Clone)]
pub struct TerminationFailure {
    /// Spec of the middleware whose hook failed.
    pub middleware: MiddlewareSpec,
    /// The error it returned.
    pub error: CoreError,
}

/// Drives middleware lists against a shared registry.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<MiddlewareRegistry>,
}

impl Pipeline {
    /// Creates a pipeline over `registry`.
    pub fn new(registry: Arc<MiddlewareRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry.
    pub fn registry(&self) -> &MiddlewareRegistry {
        &self.registry
    }

    /// Runs the forward pass of `middleware` around `endpoint`.
    pub async fn run(
        &self,
        request: &mut Request,
        middleware: &[MiddlewareSpec],
        endpoint: &dyn Endpoint,
    ) -> CoreResult<Response> {
        request.mark_pipeline_started();
        Next::new(&self.registry, middleware, endpoint)
            .run(request)
            .await
    }

    /// Runs the termination hooks.
    ///
    /// Visits the middleware entered during the forward pass. When the forward
    /// pass never started, `fallback` is resolved and visited instead; specs
    /// that fail to resolve are reported like failing hooks.
    pub async fn terminate(
        &self,
        request: &Request,
        response: &Response,
        fallback: &[MiddlewareSpec],
    ) -> Vec<TerminationFailure> {
        let mut failures = Vec::new();

        let resolved: Vec<ResolvedMiddleware> = if request.pipeline_started() {
            request.entered_middleware().to_vec()
        } else {
            let mut resolved = Vec::with_capacity(fallback.len());
            for spec in fallback {
                match self.registry.resolve(spec) {
                    Ok(middleware) => resolved.push(middleware),
                    Err(error) => failures.push(TerminationFailure {
                        middleware: spec.clone(),
                        error,
                    }),
                }
            }
            resolved
        };

        for middleware in &resolved {
            trace!(middleware = %middleware.spec(), "Terminating middleware");
            let outcome = AssertUnwindSafe(middleware.instance().terminate(request, response))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(CoreError::from_panic(panic)));
            if let Err(error) = outcome {
                warn!(middleware = %middleware.spec(), %error, "Termination hook failed");
                failures.push(TerminationFailure {
                    middleware: middleware.spec().clone(),
                    error,
                });
            }
        }

        failures
    }
}
