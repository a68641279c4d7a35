//! Matcher: one caller and everything needed to run it.
//!
//! A [`Matcher`] pairs a normalized call identifier with its handler and the
//! ordered list of call-specific middleware. It is immutable once registered
//! and shared by every request that resolves to it.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_framework::{Data, Json, Matcher};
//!
//! let matcher = Matcher::new("user/show")   // normalized to "user.show"
//!     .middleware("throttle:10,1")
//!     .middleware("require:id")
//!     .handler(show_user);
//! ```

use std::sync::Arc;

use tracing::trace;

use crate::handler::{BoxedHandler, Handler, Reply, into_handler};
use crate::middleware::MiddlewareSpec;
use crate::request::Request;
use courier_core::{CoreError, CoreResult};

/// Internal data for a Matcher.
///
/// Wrapped in an `Arc` for cheap cloning; `Clone` backs `Arc::make_mut`
/// while the builder is still mutating it.
#[derive(Clone)]
struct MatcherInner {
    call: String,
    handler: Option<BoxedHandler>,
    middleware: Vec<MiddlewareSpec>,
}

/// A caller: normalized call identifier, handler and middleware list.
#[derive(Clone)]
pub struct Matcher {
    inner: Arc<MatcherInner>,
}

impl Matcher {
    /// Creates a matcher for `call` with no handler and no middleware.
    pub fn new(call: impl AsRef<str>) -> Self {
        Self {
            inner: Arc::new(MatcherInner {
                call: normalize_call(call.as_ref()),
                handler: None,
                middleware: Vec::new(),
            }),
        }
    }

    fn inner_mut(&mut self) -> &mut MatcherInner {
        Arc::make_mut(&mut self.inner)
    }

    /// Appends a call-specific middleware, e.g. `"throttle:10,1"`.
    pub fn middleware(mut self, spec: impl Into<MiddlewareSpec>) -> Self {
        self.inner_mut().middleware.push(spec.into());
        self
    }

    /// Appends several call-specific middleware in order.
    pub fn middlewares<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<MiddlewareSpec>,
    {
        self.inner_mut()
            .middleware
            .extend(specs.into_iter().map(Into::into));
        self
    }

    /// Sets the handler, replacing any previous one.
    pub fn handler<H, T>(self, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.handler_boxed(into_handler(handler))
    }

    /// Sets an already boxed handler.
    pub fn handler_boxed(mut self, handler: BoxedHandler) -> Self {
        self.inner_mut().handler = Some(handler);
        self
    }

    /// Returns the normalized call identifier.
    pub fn call(&self) -> &str {
        &self.inner.call
    }

    /// Returns the call-specific middleware in declaration order.
    pub fn middleware_specs(&self) -> &[MiddlewareSpec] {
        &self.inner.middleware
    }

    /// Returns whether a handler has been set.
    pub fn has_handler(&self) -> bool {
        self.inner.handler.is_some()
    }

    /// Runs the handler for `request`.
    pub async fn invoke(&self, request: &Request) -> CoreResult<Reply> {
        let handler = self.inner.handler.as_ref().ok_or_else(|| {
            CoreError::internal(format!("caller '{}' has no handler", self.call()))
        })?;

        trace!(call = %self.call(), "Invoking handler");
        handler.call(request).await
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("call", &self.inner.call)
            .field("has_handler", &self.has_handler())
            .field("middleware", &self.inner.middleware)
            .finish()
    }
}

/// Normalizes a call identifier.
///
/// `/` is accepted as a separator and rewritten to `.`; leading and trailing
/// separators and surrounding whitespace are dropped.
pub fn normalize_call(call: &str) -> String {
    call.trim()
        .replace('/', ".")
        .trim_matches('.')
        .to_string()
}
