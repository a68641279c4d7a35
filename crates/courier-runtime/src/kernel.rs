//! The request kernel.
//!
//! [`Kernel::handle`] turns one inbound message into exactly one
//! [`Response`] and never fails; [`Kernel::terminate`] runs the termination
//! hooks afterwards.
//!
//! ```text
//! handle:
//!   notify received
//!   ├─ unpack wire body ─▶ envelope ─▶ resolve caller ─▶ bind
//!   ├─ pipeline(global ++ caller middleware, handler) ─▶ to_response
//!   └─ on failure or panic: report ─▶ render ─▶ to_response   (500 if that fails too)
//!   notify handled
//!
//! terminate:
//!   termination hooks of the entered middleware ─▶ app terminator
//! ```
//!
//! # State
//!
//! ```text
//! Unbootstrapped ──bootstrap──▶ Bootstrapped ◀──▶ Handling
//!        │                            │               │
//!        └──────────── shutdown ──────┴───────────────┴──▶ Terminated
//! ```
//!
//! `handle` bootstraps on first use. The kernel counts as `Handling` while a
//! request or a termination pass is running, including termination passes
//! spawned by [`KernelService`](crate::KernelService). After
//! [`Kernel::shutdown`] every request is answered with `503`;
//! [`Kernel::drain`] also waits for the work still running.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{Instrument, Span, debug, error, info, info_span};

use crate::collaborators::{
    AppTerminator, Bootstrapper, ErrorRenderer, ErrorReporter, EventNotifier, JsonErrorRenderer,
    NoopTerminator, TracingNotifier, TracingReporter,
};
use crate::config::{ConfigLoader, CourierConfig};
use crate::error::{RuntimeError, RuntimeResult};
use courier_core::{
    CoreError, CoreResult, Envelope, Packer, PackerConfig, Payload, Response, StatusCode,
    WireResponse, value_kind,
};
use courier_framework::{
    Dispatcher, Endpoint, Matcher, Middleware, MiddlewareRegistry, MiddlewareSpec, Pipeline,
    Reply, Request,
};

/// Lifecycle state of a [`Kernel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    /// No bootstrapper has run yet.
    Unbootstrapped,
    /// Ready and idle.
    Bootstrapped,
    /// At least one request or termination pass is running.
    Handling,
    /// Shut down; requests are refused.
    Terminated,
}

/// The request kernel.
///
/// Share it behind an `Arc`; every method takes `&self` and requests are
/// handled concurrently.
pub struct Kernel {
    dispatcher: Arc<Dispatcher>,
    pipeline: Pipeline,
    packer: Packer,
    global: Vec<MiddlewareSpec>,
    notifier: Arc<dyn EventNotifier>,
    reporter: Arc<dyn ErrorReporter>,
    renderer: Arc<dyn ErrorRenderer>,
    terminator: Arc<dyn AppTerminator>,
    bootstrappers: Vec<Arc<dyn Bootstrapper>>,
    bootstrapped: Mutex<bool>,
    in_flight: TaskTracker,
    shut_down: AtomicBool,
}

impl Kernel {
    /// Starts building a kernel.
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> KernelState {
        if self.shut_down.load(Ordering::Acquire) {
            KernelState::Terminated
        } else if !self.in_flight.is_empty() {
            KernelState::Handling
        } else if *self.bootstrapped.lock() {
            KernelState::Bootstrapped
        } else {
            KernelState::Unbootstrapped
        }
    }

    /// Returns the dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns the packer.
    pub fn packer(&self) -> &Packer {
        &self.packer
    }

    /// Returns the global middleware list.
    pub fn global_middleware(&self) -> &[MiddlewareSpec] {
        &self.global
    }

    /// Runs the bootstrappers, once.
    ///
    /// Later calls return immediately. A failing bootstrapper leaves the
    /// kernel unbootstrapped, so the next call retries from the start.
    pub fn bootstrap(&self) -> CoreResult<()> {
        let mut bootstrapped = self.bootstrapped.lock();
        if *bootstrapped {
            return Ok(());
        }

        for bootstrapper in &self.bootstrappers {
            debug!(bootstrapper = bootstrapper.name(), "Running bootstrapper");
            bootstrapper.bootstrap().map_err(|e| {
                CoreError::Bootstrap(format!("{}: {e}", bootstrapper.name()))
            })?;
        }

        *bootstrapped = true;
        info!(bootstrappers = self.bootstrappers.len(), "Kernel bootstrapped");
        Ok(())
    }

    /// Stops accepting requests. In-flight requests finish normally.
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            self.in_flight.close();
            info!("Kernel shut down");
        }
    }

    /// Shuts down and waits until every in-flight request and pending
    /// termination pass has finished.
    pub async fn drain(&self) {
        self.shutdown();
        self.in_flight.wait().await;
        debug!("Kernel drained");
    }

    /// Returns a token that keeps the kernel in the `Handling` state until it
    /// is dropped.
    ///
    /// Take one before handing a termination pass to another task, so the
    /// pass is accounted for from the moment the response is returned.
    pub fn in_flight_token(&self) -> TaskTrackerToken {
        self.in_flight.token()
    }

    /// Handles one request and returns its response.
    ///
    /// Every failure is reported, rendered and normalized; this method itself
    /// cannot fail. A panic in a handler or middleware is handled like an
    /// internal error.
    pub async fn handle(&self, request: &mut Request) -> Response {
        let span = info_span!("request", id = %request.id(), call = tracing::field::Empty);

        async move {
            let _in_flight = self.in_flight.token();
            self.notifier.request_received(request);

            let outcome = AssertUnwindSafe(self.send_request(request))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(CoreError::from_panic(panic)));
            let response = match outcome {
                Ok(response) => response,
                Err(error) => self.render_failure(request, error),
            };

            self.notifier.request_handled(request, &response);
            response
        }
        .instrument(span)
        .await
    }

    async fn send_request(&self, request: &mut Request) -> CoreResult<Response> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(CoreError::ShuttingDown);
        }
        self.bootstrap()?;

        let matcher = self.bind_request_matcher(request)?;
        let middleware: Vec<MiddlewareSpec> = self
            .global
            .iter()
            .chain(matcher.middleware_specs())
            .cloned()
            .collect();

        let endpoint = CallerEndpoint {
            matcher: &matcher,
            packer: &self.packer,
        };
        let response = self.pipeline.run(request, &middleware, &endpoint).await?;

        // A middleware may answer without reaching the handler.
        to_response(Reply::Response(response), &self.packer)
    }

    fn bind_request_matcher(&self, request: &mut Request) -> CoreResult<Matcher> {
        let payload = self.packer.unpack_wire(request.raw_data())?;
        let envelope = Envelope::from_payload(payload)?;
        Span::current().record("call", envelope.call.as_str());

        let call = envelope.call.clone();
        request.apply_envelope(envelope);

        let matcher = self.dispatcher.resolve(&call)?;
        request.bind(matcher.clone())?;
        Ok(matcher)
    }

    fn render_failure(&self, request: &Request, error: CoreError) -> Response {
        if catch_unwind(AssertUnwindSafe(|| self.reporter.report(request, &error))).is_err() {
            error!(%error, "Error reporter panicked");
        }

        let rendered = catch_unwind(AssertUnwindSafe(|| self.renderer.render(request, &error)))
            .unwrap_or_else(|panic| Err(CoreError::from_panic(panic)));

        match rendered.and_then(|reply| to_response(reply, &self.packer)) {
            Ok(response) => response,
            Err(render_error) => {
                error!(%error, %render_error, "Failed to render error response");
                fallback_response(&self.packer)
            }
        }
    }

    /// Runs the termination pass for a handled request.
    ///
    /// Visits the middleware entered during the forward pass in list order.
    /// When the request failed before reaching the pipeline, the global list
    /// (plus the caller's list, if one was bound) is resolved and visited
    /// instead. Hook failures and panics are reported and skipped. The
    /// application terminator runs last. The response is never altered.
    pub async fn terminate(&self, request: &Request, response: &Response) {
        let span = info_span!("terminate", id = %request.id());

        async move {
            let _in_flight = self.in_flight.token();
            let fallback: Vec<MiddlewareSpec> = match request.matcher() {
                Some(matcher) => self
                    .global
                    .iter()
                    .chain(matcher.middleware_specs())
                    .cloned()
                    .collect(),
                None => self.global.clone(),
            };

            let failures = self.pipeline.terminate(request, response, &fallback).await;
            for failure in &failures {
                self.reporter.report(request, &failure.error);
            }

            let terminated = AssertUnwindSafe(self.terminator.terminate(request, response))
                .catch_unwind()
                .await;
            if terminated.is_err() {
                error!("Application terminator panicked");
            }
            debug!(failed_hooks = failures.len(), "Request terminated");
        }
        .instrument(span)
        .await
    }

    /// Handles raw bytes end to end: handle, convert to wire form, terminate.
    pub async fn process(&self, raw: impl Into<Vec<u8>>) -> WireResponse {
        let mut request = Request::new(raw);
        let response = self.handle(&mut request).await;
        let wire = response.to_wire();
        self.terminate(&request, &response).await;
        wire
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("state", &self.state())
            .field("dispatcher", &self.dispatcher)
            .field("global", &self.global)
            .field("packer", &self.packer)
            .finish_non_exhaustive()
    }
}

/// Normalizes a handler result into a response.
///
/// - a [`Response`] is kept, status included, and packed if it carries data
/// - a non-empty mapping becomes a `200` response with the mapping packed
/// - an empty mapping, `null` or [`Reply::Empty`] becomes a `200` response
///   with no data
/// - any other value fails with [`CoreError::UnsupportedResponseType`]
pub fn to_response(reply: Reply, packer: &Packer) -> CoreResult<Response> {
    match reply {
        Reply::Response(mut response) => {
            let packed = match response.data() {
                Some(data) if !data.is_empty() && !response.is_packed() => {
                    Some(packer.pack(data)?)
                }
                _ => None,
            };
            if let Some(packed) = packed {
                response.set_packed(packed);
            }
            Ok(response)
        }
        Reply::Value(Value::Object(data)) => packed_response(data, StatusCode::OK, packer),
        Reply::Value(Value::Null) | Reply::Empty => Ok(Response::new()),
        Reply::Value(other) => Err(CoreError::UnsupportedResponseType {
            kind: value_kind(&other),
        }),
    }
}

fn packed_response(data: Payload, status: StatusCode, packer: &Packer) -> CoreResult<Response> {
    if data.is_empty() {
        return Ok(Response::new().status(status));
    }
    let packed = packer.pack(&data)?;
    let mut response = Response::with_data(data).status(status);
    response.set_packed(packed);
    Ok(response)
}

/// A bare 500 used when rendering the error itself failed.
fn fallback_response(packer: &Packer) -> Response {
    let mut data = Payload::new();
    data.insert("code".into(), Value::from("INTERNAL_ERROR"));
    data.insert("message".into(), Value::from("internal server error"));

    packed_response(data, StatusCode::INTERNAL_SERVER_ERROR, packer)
        .unwrap_or_else(|_| Response::new().status(StatusCode::INTERNAL_SERVER_ERROR))
}

/// Calls the bound handler and normalizes its result.
struct CallerEndpoint<'k> {
    matcher: &'k Matcher,
    packer: &'k Packer,
}

impl Endpoint for CallerEndpoint<'_> {
    fn call<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, CoreResult<Response>> {
        Box::pin(async move {
            let reply = self.matcher.invoke(request).await?;
            to_response(reply, self.packer)
        })
    }
}

// ============================================================================
// KernelBuilder
// ============================================================================

/// Builder for [`Kernel`].
///
/// ```rust,ignore
/// let kernel = Kernel::builder()
///     .config(&config)
///     .caller(Matcher::new("ping").handler(ping))
///     .register_middleware("audit", Audit)
///     .build()?;
/// ```
pub struct KernelBuilder {
    dispatcher: Dispatcher,
    registry: MiddlewareRegistry,
    packer: PackerConfig,
    global: Vec<MiddlewareSpec>,
    notifier: Arc<dyn EventNotifier>,
    reporter: Arc<dyn ErrorReporter>,
    renderer: Arc<dyn ErrorRenderer>,
    terminator: Arc<dyn AppTerminator>,
    bootstrappers: Vec<Arc<dyn Bootstrapper>>,
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelBuilder {
    /// Creates a builder with the built-in middleware registered, a plain
    /// packer and the default collaborators.
    pub fn new() -> Self {
        Self {
            dispatcher: Dispatcher::new(),
            registry: MiddlewareRegistry::with_builtins(),
            packer: PackerConfig::plain(),
            global: Vec::new(),
            notifier: Arc::new(TracingNotifier),
            reporter: Arc::new(TracingReporter),
            renderer: Arc::new(JsonErrorRenderer),
            terminator: Arc::new(NoopTerminator),
            bootstrappers: Vec::new(),
        }
    }

    /// Applies the packer settings and global middleware from `config`.
    pub fn config(mut self, config: &CourierConfig) -> Self {
        self.packer = config.app.packer_config();
        self.global = config.kernel.middleware_specs();
        self
    }

    /// Loads configuration through `loader` and applies it like [`config`].
    ///
    /// [`config`]: KernelBuilder::config
    pub fn load_config(self, loader: ConfigLoader) -> RuntimeResult<Self> {
        let config = loader.load()?;
        Ok(self.config(&config))
    }

    /// Replaces the dispatcher.
    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Registers a caller.
    pub fn caller(mut self, matcher: Matcher) -> Self {
        self.dispatcher.add(matcher);
        self
    }

    /// Replaces the middleware registry.
    pub fn registry(mut self, registry: MiddlewareRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Registers a shared middleware instance.
    pub fn register_middleware<M: Middleware + 'static>(
        mut self,
        name: impl Into<String>,
        middleware: M,
    ) -> Self {
        self.registry.register_instance(name, middleware);
        self
    }

    /// Registers a middleware factory called with the spec parameters.
    pub fn register_middleware_fn<F, M>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&[String]) -> CoreResult<M> + Send + Sync + 'static,
        M: Middleware + 'static,
    {
        self.registry.register_fn(name, factory);
        self
    }

    /// Appends a global middleware.
    pub fn middleware(mut self, spec: impl Into<MiddlewareSpec>) -> Self {
        self.global.push(spec.into());
        self
    }

    /// Sets the packer configuration.
    pub fn packer(mut self, config: PackerConfig) -> Self {
        self.packer = config;
        self
    }

    /// Sets the event notifier.
    pub fn notifier(mut self, notifier: impl EventNotifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Sets the error reporter.
    pub fn reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Sets the error renderer.
    pub fn renderer(mut self, renderer: impl ErrorRenderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    /// Sets the application terminator.
    pub fn terminator(mut self, terminator: impl AppTerminator + 'static) -> Self {
        self.terminator = Arc::new(terminator);
        self
    }

    /// Appends a bootstrapper.
    pub fn bootstrapper(mut self, bootstrapper: impl Bootstrapper + 'static) -> Self {
        self.bootstrappers.push(Arc::new(bootstrapper));
        self
    }

    /// Builds the kernel.
    ///
    /// Fails when the packer configuration is invalid or a global middleware
    /// is not registered.
    pub fn build(self) -> RuntimeResult<Kernel> {
        let packer = Packer::new(&self.packer).map_err(RuntimeError::Packer)?;

        if let Some(spec) = self
            .global
            .iter()
            .find(|spec| !self.registry.contains(spec.name()))
        {
            return Err(RuntimeError::UnknownMiddleware(spec.name().to_string()));
        }

        debug!(
            callers = self.dispatcher.matcher_count(),
            global_middleware = self.global.len(),
            secret_status = ?packer.secret_status(),
            "Kernel built"
        );

        Ok(Kernel {
            dispatcher: Arc::new(self.dispatcher),
            pipeline: Pipeline::new(Arc::new(self.registry)),
            packer,
            global: self.global,
            notifier: self.notifier,
            reporter: self.reporter,
            renderer: self.renderer,
            terminator: self.terminator,
            bootstrappers: self.bootstrappers,
            bootstrapped: Mutex::new(false),
            in_flight: TaskTracker::new(),
            shut_down: AtomicBool::new(false),
        })
    }
}
