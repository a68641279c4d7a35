//! # Courier Framework
//!
//! Dispatching, handlers and the middleware pipeline.
//!
//! - **[`Dispatcher`]** maps call identifiers to [`Matcher`]s
//! - **[`Matcher`]** pairs a call identifier with its handler and middleware
//! - **[`Handler`]** adapts async functions whose parameters implement
//!   [`FromRequest`] and whose return value implements [`IntoReply`]
//! - **[`Middleware`]** and the [`MiddlewareRegistry`] resolve named
//!   middleware specs into instances
//! - **[`Pipeline`]** runs the onion-style forward pass and the separate
//!   termination pass
//!
//! ```rust,ignore
//! use courier_framework::*;
//!
//! async fn ping() -> Json<serde_json::Value> {
//!     Json(serde_json::json!({ "ok": true }))
//! }
//!
//! let dispatcher = Dispatcher::new()
//!     .with(Matcher::new("ping").middleware("throttle:10,1").handler(ping));
//! ```

pub mod builtin;
pub mod dispatcher;
pub mod extractor;
pub mod handler;
pub mod matcher;
pub mod middleware;
pub mod pipeline;
pub mod request;

pub use dispatcher::Dispatcher;
pub use extractor::{CallId, Data, Extension, FromRequest, RequestId};
pub use handler::{BoxedHandler, ErasedHandler, Handler, IntoReply, Json, Reply, into_handler};
pub use matcher::{Matcher, normalize_call};
pub use middleware::{
    Middleware, MiddlewareFactory, MiddlewareRegistry, MiddlewareSpec, ResolvedMiddleware,
};
pub use pipeline::{Endpoint, Next, Pipeline, TerminationFailure};
pub use request::Request;

pub use async_trait::async_trait;
