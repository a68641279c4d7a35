//! Narrow interfaces the kernel calls out to, each with a default.
//!
//! | trait | called | default |
//! |---|---|---|
//! | [`EventNotifier`] | when a request arrives and when its response is final | [`TracingNotifier`] |
//! | [`ErrorReporter`] | once per failure, before rendering | [`TracingReporter`] |
//! | [`ErrorRenderer`] | to turn a failure into a reply | [`JsonErrorRenderer`] |
//! | [`AppTerminator`] | last, after the termination hooks | [`NoopTerminator`] |
//! | [`Bootstrapper`] | once, before the first request | none |

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error, info, warn};

use courier_core::{CoreError, CoreResult, Response};
use courier_framework::{Reply, Request};

/// Observes the request lifecycle.
pub trait EventNotifier: Send + Sync {
    /// A request entered the kernel.
    fn request_received(&self, request: &Request);

    /// The response for `request` is final.
    fn request_handled(&self, request: &Request, response: &Response);
}

/// Records failures.
pub trait ErrorReporter: Send + Sync {
    /// Reports a failure raised while handling `request`.
    fn report(&self, request: &Request, error: &CoreError);
}

/// Turns failures into replies.
///
/// The reply goes through the same normalization as handler results, so a
/// renderer may return any [`Reply`] the kernel accepts.
pub trait ErrorRenderer: Send + Sync {
    /// Renders `error` for `request`.
    fn render(&self, request: &Request, error: &CoreError) -> CoreResult<Reply>;
}

/// Application-level teardown run after every request.
#[async_trait]
pub trait AppTerminator: Send + Sync {
    async fn terminate(&self, request: &Request, response: &Response);
}

/// One-time initialization run before the first request.
pub trait Bootstrapper: Send + Sync {
    /// Name used in logs and bootstrap errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Performs the initialization.
    fn bootstrap(&self) -> CoreResult<()>;
}

impl<F> Bootstrapper for F
where
    F: Fn() -> CoreResult<()> + Send + Sync,
{
    fn bootstrap(&self) -> CoreResult<()> {
        self()
    }
}

// ============================================================================
// Defaults
// ============================================================================

/// Logs lifecycle events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl EventNotifier for TracingNotifier {
    fn request_received(&self, request: &Request) {
        debug!(bytes = request.raw_data().len(), "Request received");
    }

    fn request_handled(&self, _request: &Request, response: &Response) {
        info!(status = %response.status_code(), "Request handled");
    }
}

/// Logs failures: client-class at `warn`, the rest at `error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, _request: &Request, error: &CoreError) {
        if error.is_client_error() {
            warn!(code = %error.error_code(), %error, "Request rejected");
        } else {
            error!(code = %error.error_code(), %error, "Request failed");
        }
    }
}

/// Renders `{"code": "<ERROR_CODE>", "message": "..."}` with the error's
/// status. Server-class errors get a generic message.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonErrorRenderer;

impl ErrorRenderer for JsonErrorRenderer {
    fn render(&self, _request: &Request, error: &CoreError) -> CoreResult<Reply> {
        let serde_json::Value::Object(body) = json!({
            "code": error.error_code().as_str(),
            "message": error.public_message(),
        }) else {
            return Err(CoreError::internal("error body is not a mapping"));
        };

        Ok(Reply::Response(
            Response::with_data(body).status(error.status()),
        ))
    }
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTerminator;

#[async_trait]
impl AppTerminator for NoopTerminator {
    async fn terminate(&self, _request: &Request, _response: &Response) {}
}
