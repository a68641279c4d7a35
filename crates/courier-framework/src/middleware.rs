//! Middleware: named, parameterized interceptors around the handler.
//!
//! Middleware are referenced by string in global and per-caller lists. A
//! string `"name:arg1,arg2"` parses into a [`MiddlewareSpec`]; the
//! [`MiddlewareRegistry`] turns the spec into a live instance on demand.
//!
//! ```rust,ignore
//! use courier_framework::{Middleware, MiddlewareRegistry, Next, Request};
//!
//! struct Audit;
//!
//! #[async_trait]
//! impl Middleware for Audit {
//!     async fn handle(&self, request: &mut Request, next: Next<'_>) -> CoreResult<Response> {
//!         let response = next.run(request).await?;
//!         tracing::info!(status = %response.status_code(), "audited");
//!         Ok(response)
//!     }
//! }
//!
//! let mut registry = MiddlewareRegistry::with_builtins();
//! registry.register_instance("audit", Audit);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::builtin::{ConcurrencyLimit, ConcurrencySlots, RequireKeys, Throttle, ThrottleWindows};
use crate::pipeline::Next;
use crate::request::Request;
use courier_core::{CoreError, CoreResult, Response};

// ============================================================================
// MiddlewareSpec
// ============================================================================

/// A parsed middleware reference: a name and its ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MiddlewareSpec {
    name: String,
    params: Vec<String>,
}

impl MiddlewareSpec {
    /// Creates a spec from its parts.
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Parses `"name:arg1,arg2"`.
    ///
    /// The string is split once on `:`; the remainder is split on `,`.
    /// `"name"` and `"name:"` both yield no parameters.
    pub fn parse(spec: &str) -> Self {
        match spec.split_once(':') {
            Some((name, "")) => Self::new(name.trim(), Vec::new()),
            Some((name, params)) => Self::new(
                name.trim(),
                params.split(',').map(|p| p.trim().to_string()).collect(),
            ),
            None => Self::new(spec.trim(), Vec::new()),
        }
    }

    /// Returns the middleware name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameters.
    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl From<&str> for MiddlewareSpec {
    fn from(spec: &str) -> Self {
        Self::parse(spec)
    }
}

impl From<String> for MiddlewareSpec {
    fn from(spec: String) -> Self {
        Self::parse(&spec)
    }
}

impl From<&String> for MiddlewareSpec {
    fn from(spec: &String) -> Self {
        Self::parse(spec)
    }
}

impl fmt::Display for MiddlewareSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.name, self.params.join(","))
        }
    }
}

// ============================================================================
// Middleware trait
// ============================================================================

/// An interceptor in the request pipeline.
///
/// `handle` wraps everything after it: call `next.run(request)` to continue,
/// or return a response without calling it to short-circuit the rest of the
/// chain and the handler. `terminate` runs after the response is final, for
/// every middleware whose `handle` was entered.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Forward pass.
    async fn handle(&self, request: &mut Request, next: Next<'_>) -> CoreResult<Response>;

    /// Termination pass. Does nothing by default.
    async fn terminate(&self, _request: &Request, _response: &Response) -> CoreResult<()> {
        Ok(())
    }
}

/// A middleware instance together with the spec it was resolved from.
#[derive(Clone)]
pub struct ResolvedMiddleware {
    spec: MiddlewareSpec,
    instance: Arc<dyn Middleware>,
}

impl ResolvedMiddleware {
    /// Returns the spec this instance was resolved from.
    pub fn spec(&self) -> &MiddlewareSpec {
        &self.spec
    }

    /// Returns the middleware name.
    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// Returns the instance.
    pub fn instance(&self) -> &Arc<dyn Middleware> {
        &self.instance
    }
}

impl fmt::Debug for ResolvedMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResolvedMiddleware")
            .field(&self.spec.to_string())
            .finish()
    }
}

// ============================================================================
// MiddlewareRegistry
// ============================================================================

/// Builds a middleware instance from the spec parameters.
pub type MiddlewareFactory =
    Arc<dyn Fn(&[String]) -> CoreResult<Arc<dyn Middleware>> + Send + Sync>;

/// Name to factory mapping used to resolve middleware specs.
#[derive(Default, Clone)]
pub struct MiddlewareRegistry {
    factories: HashMap<String, MiddlewareFactory>,
}

impl MiddlewareRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in middleware:
    /// `throttle`, `concurrency` and `require`.
    pub fn with_builtins() -> Self {
        let windows = ThrottleWindows::default();
        let slots = ConcurrencySlots::default();

        let mut registry = Self::new();
        registry
            .register_fn("throttle", move |params: &[String]| {
                Throttle::from_params(params, &windows)
            })
            .register_fn("concurrency", move |params: &[String]| {
                ConcurrencyLimit::from_params(params, &slots)
            })
            .register_fn("require", RequireKeys::from_params);
        registry
    }

    /// Registers a factory called with the spec parameters on every
    /// resolution.
    pub fn register_fn<F, M>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&[String]) -> CoreResult<M> + Send + Sync + 'static,
        M: Middleware + 'static,
    {
        let factory: MiddlewareFactory = Arc::new(move |params: &[String]| {
            factory(params).map(|m| Arc::new(m) as Arc<dyn Middleware>)
        });
        self.factories.insert(name.into(), factory);
        self
    }

    /// Registers a shared instance. Parameters are ignored.
    pub fn register_instance<M>(&mut self, name: impl Into<String>, middleware: M) -> &mut Self
    where
        M: Middleware + 'static,
    {
        let instance: Arc<dyn Middleware> = Arc::new(middleware);
        let factory: MiddlewareFactory = Arc::new(move |_: &[String]| Ok(instance.clone()));
        self.factories.insert(name.into(), factory);
        self
    }

    /// Returns whether a middleware is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolves a spec into a live instance.
    ///
    /// Fails with [`CoreError::MiddlewareResolution`] when the name is not
    /// registered or the factory rejects the parameters.
    pub fn resolve(&self, spec: &MiddlewareSpec) -> CoreResult<ResolvedMiddleware> {
        let factory = self
            .factories
            .get(spec.name())
            .ok_or_else(|| CoreError::middleware_resolution(spec.name(), "not registered"))?;

        let instance = factory(spec.params()).map_err(|e| match e {
            CoreError::MiddlewareResolution { .. } => e,
            other => CoreError::middleware_resolution(spec.name(), other.to_string()),
        })?;

        Ok(ResolvedMiddleware {
            spec: spec.clone(),
            instance,
        })
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passthrough;

    #[async_trait]
    impl Middleware for Passthrough {
        async fn handle(&self, request: &mut Request, next: Next<'_>) -> CoreResult<Response> {
            next.run(request).await
        }
    }

    #[test]
    fn test_spec_parse() {
        let spec = MiddlewareSpec::parse("throttle:10,60");
        assert_eq!(spec.name(), "throttle");
        assert_eq!(spec.params(), ["10", "60"]);

        assert!(MiddlewareSpec::parse("auth").params().is_empty());
        assert!(MiddlewareSpec::parse("auth:").params().is_empty());

        // Only the first colon separates the name.
        let spec = MiddlewareSpec::parse("cache:a:b,c");
        assert_eq!(spec.params(), ["a:b", "c"]);
    }

    #[test]
    fn test_spec_display() {
        assert_eq!(MiddlewareSpec::parse("auth:").to_string(), "auth");
        assert_eq!(MiddlewareSpec::parse("t:1, 2").to_string(), "t:1,2");
    }

    #[test]
    fn test_resolve_unknown() {
        let err = MiddlewareRegistry::new()
            .resolve(&"missing".into())
            .unwrap_err();
        match err {
            CoreError::MiddlewareResolution { name, .. } => assert_eq!(name, "missing"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_instance_is_shared() {
        let mut registry = MiddlewareRegistry::new();
        registry.register_instance("pass", Passthrough);

        let a = registry.resolve(&"pass".into()).unwrap();
        let b = registry.resolve(&"pass:ignored".into()).unwrap();
        assert!(Arc::ptr_eq(a.instance(), b.instance()));
        assert_eq!(b.spec().params(), ["ignored"]);
    }

    #[test]
    fn test_factory_errors_are_wrapped() {
        let mut registry = MiddlewareRegistry::new();
        registry.register_fn("strict", |params: &[String]| {
            if params.is_empty() {
                Err(CoreError::internal("needs a parameter"))
            } else {
                Ok(Passthrough)
            }
        });

        assert!(registry.resolve(&"strict:x".into()).is_ok());
        let err = registry.resolve(&"strict".into()).unwrap_err();
        assert!(err.to_string().contains("needs a parameter"));
        assert!(matches!(err, CoreError::MiddlewareResolution { .. }));
    }

    #[test]
    fn test_builtins_registered() {
        let registry = MiddlewareRegistry::with_builtins();
        assert_eq!(registry.names(), ["concurrency", "require", "throttle"]);
    }
}
