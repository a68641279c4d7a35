//! The per-request carrier handed through the pipeline.
//!
//! A [`Request`] is created once per inbound message and owned by whoever
//! drives the kernel for that message. It starts out holding only the raw
//! bytes; the kernel fills in the decoded data and call identifier, binds the
//! resolved [`Matcher`], and the pipeline records every middleware instance it
//! enters so that the termination pass can visit exactly those.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use uuid::Uuid;

use crate::matcher::Matcher;
use crate::middleware::ResolvedMiddleware;
use courier_core::{CoreError, CoreResult, Envelope, Payload};

/// One inbound message and everything learned about it while handling it.
pub struct Request {
    id: Uuid,
    raw: Vec<u8>,
    call: Option<String>,
    data: Payload,
    matcher: Option<Matcher>,
    pipeline_started: bool,
    entered: Vec<ResolvedMiddleware>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Request {
    /// Creates a request from raw inbound bytes.
    pub fn new(raw: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            raw: raw.into(),
            call: None,
            data: Payload::new(),
            matcher: None,
            pipeline_started: false,
            entered: Vec::new(),
            extensions: HashMap::new(),
        }
    }

    /// Returns the per-request identifier used for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the raw inbound bytes.
    pub fn raw_data(&self) -> &[u8] {
        &self.raw
    }

    /// Returns the call identifier, once decoded.
    pub fn call(&self) -> Option<&str> {
        self.call.as_deref()
    }

    /// Sets the call identifier.
    pub fn set_call(&mut self, call: impl Into<String>) {
        self.call = Some(call.into());
    }

    /// Returns the decoded data.
    pub fn data(&self) -> &Payload {
        &self.data
    }

    /// Returns the decoded data for mutation by middleware.
    pub fn data_mut(&mut self) -> &mut Payload {
        &mut self.data
    }

    /// Replaces the decoded data.
    pub fn set_data(&mut self, data: Payload) {
        self.data = data;
    }

    /// Applies a decoded envelope: sets the call identifier and the data.
    pub fn apply_envelope(&mut self, envelope: Envelope) {
        self.call = Some(envelope.call);
        self.data = envelope.data;
    }

    /// Binds the resolved matcher.
    ///
    /// Binding the same caller twice is a no-op. Rebinding a request to a
    /// different caller is refused.
    pub fn bind(&mut self, matcher: Matcher) -> CoreResult<()> {
        match &self.matcher {
            Some(bound) if bound.call() == matcher.call() => Ok(()),
            Some(bound) => Err(CoreError::internal(format!(
                "request already bound to caller '{}'",
                bound.call()
            ))),
            None => {
                self.matcher = Some(matcher);
                Ok(())
            }
        }
    }

    /// Returns the bound matcher.
    pub fn matcher(&self) -> Option<&Matcher> {
        self.matcher.as_ref()
    }

    /// Returns whether a matcher has been bound.
    pub fn is_bound(&self) -> bool {
        self.matcher.is_some()
    }

    /// Returns whether the forward pass of the pipeline was started.
    pub fn pipeline_started(&self) -> bool {
        self.pipeline_started
    }

    pub(crate) fn mark_pipeline_started(&mut self) {
        self.pipeline_started = true;
    }

    /// Returns the middleware instances entered during the forward pass, in
    /// the order they were entered.
    pub fn entered_middleware(&self) -> &[ResolvedMiddleware] {
        &self.entered
    }

    pub(crate) fn record_entered(&mut self, middleware: ResolvedMiddleware) {
        self.entered.push(middleware);
    }

    /// Stores a typed extension, replacing any previous value of that type.
    pub fn insert_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns the typed extension, if present.
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Removes and returns the typed extension, if present.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("raw_len", &self.raw.len())
            .field("call", &self.call)
            .field("data", &self.data)
            .field("bound", &self.is_bound())
            .field("entered", &self.entered.len())
            .finish_non_exhaustive()
    }
}
