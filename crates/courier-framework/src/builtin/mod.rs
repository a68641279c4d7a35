//! Built-in middleware.
//!
//! | name | params | rejects with |
//! |---|---|---|
//! | `throttle` | `max,window_secs` (defaults `60,60`) | 429 once `max` requests hit a caller within the window |
//! | `concurrency` | `limit` (default `1`) | 429 while `limit` requests for a caller are in flight |
//! | `require` | `key1,key2,...` | 422 when a key is missing or `null` in the request data |
//!
//! All three are registered by
//! [`MiddlewareRegistry::with_builtins`](crate::MiddlewareRegistry::with_builtins).

mod concurrency;
mod require;
mod throttle;

pub use concurrency::{ConcurrencyLimit, ConcurrencySlots};
pub use require::RequireKeys;
pub use throttle::{Throttle, ThrottleWindows};

use std::str::FromStr;

use courier_core::{CoreError, CoreResult};

/// Parses the parameter at `index`, falling back to `default` when absent or
/// empty.
fn param<T: FromStr>(name: &str, params: &[String], index: usize, default: T) -> CoreResult<T>
where
    T::Err: std::fmt::Display,
{
    match params.get(index).map(|p| p.trim()) {
        None | Some("") => Ok(default),
        Some(raw) => raw.parse().map_err(|e| {
            CoreError::middleware_resolution(name, format!("invalid parameter '{raw}': {e}"))
        }),
    }
}

/// Call identifier used to key per-caller state.
fn caller_key(request: &crate::Request) -> String {
    request.call().unwrap_or_default().to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use futures::future::BoxFuture;
    use serde_json::Value;

    use crate::middleware::{MiddlewareRegistry, MiddlewareSpec};
    use crate::pipeline::{Endpoint, Pipeline};
    use crate::request::Request;
    use courier_core::{CoreResult, Envelope, Response};

    struct Ok200;

    impl Endpoint for Ok200 {
        fn call<'a>(&'a self, _request: &'a mut Request) -> BoxFuture<'a, CoreResult<Response>> {
            Box::pin(async { Ok(Response::new()) })
        }
    }

    pub(crate) fn builtin_pipeline() -> Pipeline {
        Pipeline::new(Arc::new(MiddlewareRegistry::with_builtins()))
    }

    pub(crate) fn request(call: &str, data: Value) -> Request {
        let mut request = Request::new(Vec::new());
        let Value::Object(map) = data else {
            unreachable!()
        };
        request.apply_envelope(Envelope::new(call, map));
        request
    }

    /// Runs both passes for one request through `spec`.
    pub(crate) async fn run_once(pipeline: &Pipeline, spec: &str, call: &str) -> CoreResult<Response> {
        let mut request = request(call, serde_json::json!({}));
        let result = forward(pipeline, &mut request, spec).await;
        pipeline.terminate(&request, &Response::new(), &[]).await;
        result
    }

    pub(crate) async fn forward(
        pipeline: &Pipeline,
        request: &mut Request,
        spec: &str,
    ) -> CoreResult<Response> {
        pipeline
            .run(request, &[MiddlewareSpec::parse(spec)], &Ok200)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_defaults_and_errors() {
        let params = vec!["5".to_string(), String::new()];
        assert_eq!(param("t", &params, 0, 1u32).unwrap(), 5);
        assert_eq!(param("t", &params, 1, 7u32).unwrap(), 7);
        assert_eq!(param("t", &params, 2, 9u32).unwrap(), 9);

        let bad = vec!["many".to_string()];
        assert!(matches!(
            param("t", &bad, 0, 1u32),
            Err(CoreError::MiddlewareResolution { .. })
        ));
    }
}
