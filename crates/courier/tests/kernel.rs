//! End-to-end tests driving the kernel with raw messages.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use courier::core::{Packer, wire_body};
use courier::prelude::*;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_test::assert_ok;

/// Builds a plain `{"data": "<packed envelope>"}` message.
fn envelope(call: &str, data: Value) -> Vec<u8> {
    let message = json!({ "call": call, "data": data });
    wire_body(Some(message.to_string().as_bytes()))
}

/// Unwraps `{"data": "<packed>"}` and unpacks it.
fn body(wire: &WireResponse, packer: &Packer) -> Payload {
    let outer: Payload = serde_json::from_slice(&wire.body).unwrap();
    match outer.get("data") {
        Some(Value::String(packed)) => packer.unpack(packed.as_bytes()).unwrap(),
        _ => Payload::new(),
    }
}

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Records its forward and termination passes; answers `403` itself when
/// `stop` is set.
struct Recorder {
    name: &'static str,
    stop: bool,
    journal: Journal,
}

#[async_trait]
impl Middleware for Recorder {
    async fn handle(&self, request: &mut Request, next: Next<'_>) -> CoreResult<Response> {
        self.journal.push(format!("handle:{}", self.name));
        if self.stop {
            return Ok(Response::new().status(403u16));
        }
        next.run(request).await
    }

    async fn terminate(&self, _request: &Request, _response: &Response) -> CoreResult<()> {
        self.journal.push(format!("terminate:{}", self.name));
        Ok(())
    }
}

#[derive(Clone, Default)]
struct CountingReporter(Arc<AtomicU32>);

impl ErrorReporter for CountingReporter {
    fn report(&self, _request: &Request, _error: &CoreError) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn recording_kernel(journal: &Journal, stop_at: Option<&'static str>) -> Kernel {
    let mut builder = Kernel::builder();
    for name in ["a", "b", "c"] {
        builder = builder.register_middleware(
            name,
            Recorder {
                name,
                stop: stop_at == Some(name),
                journal: journal.clone(),
            },
        );
    }

    let handler_journal = journal.clone();
    builder
        .middleware("a")
        .caller(
            Matcher::new("order.place")
                .middlewares(["b", "c"])
                .handler(move || {
                    let journal = handler_journal.clone();
                    async move {
                        journal.push("handler");
                        Json(json!({ "placed": true }))
                    }
                }),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_ping_round_trip() {
    let kernel = Kernel::builder()
        .caller(Matcher::new("ping").handler(|| async { json!({ "ok": true }) }))
        .build()
        .unwrap();

    let wire = kernel.process(envelope("ping", json!({}))).await;
    assert_eq!(wire.status, StatusCode::OK);
    assert_eq!(body(&wire, kernel.packer()), json_map(json!({ "ok": true })));
}

#[tokio::test]
async fn test_truncated_message_is_reported_once() {
    let reports = CountingReporter::default();
    let kernel = Kernel::builder()
        .reporter(reports.clone())
        .caller(Matcher::new("ping").handler(|| async {}))
        .build()
        .unwrap();

    let wire = kernel
        .process(wire_body(Some(&br#"{"call":"ping","da"#[..])))
        .await;
    assert_eq!(wire.status, StatusCode::BAD_REQUEST);
    assert_eq!(body(&wire, kernel.packer())["code"], "MALFORMED_PAYLOAD");
    assert_eq!(reports.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_call_is_not_found() {
    let invoked = Arc::new(AtomicU32::new(0));
    let counter = invoked.clone();
    let kernel = Kernel::builder()
        .caller(Matcher::new("ping").handler(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {}
        }))
        .build()
        .unwrap();

    let wire = kernel.process(envelope("pong", json!({}))).await;
    assert_eq!(wire.status, StatusCode::NOT_FOUND);
    assert_eq!(body(&wire, kernel.packer())["code"], "NOT_FOUND");
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unsupported_reply_is_server_error() {
    let kernel = Kernel::builder()
        .caller(Matcher::new("list").handler(|| async { json!([1, 2, 3]) }))
        .build()
        .unwrap();

    let wire = kernel.process(envelope("list", json!({}))).await;
    assert_eq!(wire.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body(&wire, kernel.packer())["code"],
        "UNSUPPORTED_RESPONSE_TYPE"
    );
}

#[tokio::test]
async fn test_bootstrap_runs_once_across_requests() {
    let runs = Arc::new(AtomicU32::new(0));
    let counter = runs.clone();
    let kernel = Kernel::builder()
        .bootstrapper(move || -> CoreResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .caller(Matcher::new("ping").handler(|| async {}))
        .build()
        .unwrap();

    for _ in 0..3 {
        let wire = kernel.process(envelope("ping", json!({}))).await;
        assert_eq!(wire.status, StatusCode::OK);
    }
    assert_ok!(kernel.bootstrap());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_middleware_order_and_termination() {
    let journal = Journal::default();
    let kernel = recording_kernel(&journal, None);

    let wire = kernel.process(envelope("order.place", json!({}))).await;
    assert_eq!(wire.status, StatusCode::OK);
    assert_eq!(
        journal.entries(),
        [
            "handle:a",
            "handle:b",
            "handle:c",
            "handler",
            "terminate:a",
            "terminate:b",
            "terminate:c",
        ]
    );
}

#[tokio::test]
async fn test_short_circuit_limits_termination() {
    let journal = Journal::default();
    let kernel = recording_kernel(&journal, Some("b"));

    let wire = kernel.process(envelope("order.place", json!({}))).await;
    assert_eq!(wire.status.as_u16(), 403);
    assert_eq!(
        journal.entries(),
        ["handle:a", "handle:b", "terminate:a", "terminate:b"]
    );
}

#[tokio::test]
async fn test_message_must_be_wrapped() {
    let kernel = Kernel::builder()
        .caller(Matcher::new("ping").handler(|| async { json!({ "ok": true }) }))
        .build()
        .unwrap();

    for raw in [
        br#"{"call":"ping","data":{}}"#.to_vec(),
        br#"{"data":{"call":"ping"}}"#.to_vec(),
        br#"{"data":"{\"call\":\"ping\"}""#.to_vec(),
    ] {
        let wire = kernel.process(raw).await;
        assert_eq!(wire.status, StatusCode::BAD_REQUEST);
        assert_eq!(body(&wire, kernel.packer())["code"], "MALFORMED_PAYLOAD");
    }

    let wire = kernel
        .process(br#"{"data":"{\"call\":\"ping\"}"}"#.to_vec())
        .await;
    assert_eq!(wire.status, StatusCode::OK);
    assert_eq!(
        String::from_utf8(wire.body).unwrap(),
        r#"{"data":"{\"ok\":true}"}"#
    );
}

/// Answers every request from a fixed payload without reaching the handler.
struct Cached;

#[async_trait]
impl Middleware for Cached {
    async fn handle(&self, _request: &mut Request, _next: Next<'_>) -> CoreResult<Response> {
        Ok(Response::with_data(json_map(json!({ "cached": true }))))
    }
}

#[tokio::test]
async fn test_short_circuit_data_is_packed() {
    let kernel = Kernel::builder()
        .packer(PackerConfig::encrypted("s3cret"))
        .register_middleware("cached", Cached)
        .caller(
            Matcher::new("price.quote")
                .middleware("cached")
                .handler(|| async { json!({ "cached": false }) }),
        )
        .build()
        .unwrap();
    let client = Packer::new(&PackerConfig::encrypted("s3cret")).unwrap();

    let raw = client
        .pack_wire(&json_map(json!({ "call": "price.quote" })))
        .unwrap();
    let wire = kernel.process(raw).await;
    assert_eq!(wire.status, StatusCode::OK);
    assert_eq!(body(&wire, &client), json_map(json!({ "cached": true })));
}

#[tokio::test]
async fn test_panics_are_reported_once() {
    let reports = CountingReporter::default();
    let kernel = Kernel::builder()
        .reporter(reports.clone())
        .caller(Matcher::new("crash").handler(|| async {
            if true {
                panic!("handler exploded");
            }
        }))
        .build()
        .unwrap();

    let wire = kernel.process(envelope("crash", json!({}))).await;
    assert_eq!(wire.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body(&wire, kernel.packer())["code"], "INTERNAL_ERROR");
    assert_eq!(reports.0.load(Ordering::SeqCst), 1);
}

/// Fails its termination hook.
struct FailingHook;

#[async_trait]
impl Middleware for FailingHook {
    async fn handle(&self, request: &mut Request, next: Next<'_>) -> CoreResult<Response> {
        next.run(request).await
    }

    async fn terminate(&self, _request: &Request, _response: &Response) -> CoreResult<()> {
        Err(CoreError::internal("audit sink offline"))
    }
}

#[tokio::test]
async fn test_failing_termination_hook_is_reported() {
    let journal = Journal::default();
    let reports = CountingReporter::default();
    let kernel = Kernel::builder()
        .reporter(reports.clone())
        .register_middleware("audit", FailingHook)
        .register_middleware(
            "after",
            Recorder {
                name: "after",
                stop: false,
                journal: journal.clone(),
            },
        )
        .middleware("audit")
        .middleware("after")
        .caller(Matcher::new("ping").handler(|| async { json!({ "ok": true }) }))
        .build()
        .unwrap();

    let wire = kernel.process(envelope("ping", json!({}))).await;
    assert_eq!(wire.status, StatusCode::OK);
    assert_eq!(body(&wire, kernel.packer()), json_map(json!({ "ok": true })));
    assert_eq!(reports.0.load(Ordering::SeqCst), 1);
    assert_eq!(journal.entries(), ["handle:after", "terminate:after"]);
}

#[tokio::test]
async fn test_encrypted_round_trip() {
    let kernel = Kernel::builder()
        .packer(PackerConfig::encrypted("s3cret"))
        .caller(Matcher::new("echo").handler(|data: Payload| async move { Value::Object(data) }))
        .build()
        .unwrap();
    let client = Packer::new(&PackerConfig::encrypted("s3cret")).unwrap();

    let sealed = client
        .pack_wire(&json_map(json!({ "call": "echo", "data": { "n": 42 } })))
        .unwrap();
    let wire = kernel.process(sealed).await;
    assert_eq!(wire.status, StatusCode::OK);
    assert_eq!(body(&wire, &client), json_map(json!({ "n": 42 })));

    // Plain JSON is not a valid sealed message.
    let wire = kernel.process(envelope("echo", json!({}))).await;
    assert_eq!(wire.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_builtin_middleware_through_kernel() {
    let kernel = Kernel::builder()
        .caller(
            Matcher::new("user.create")
                .middleware("throttle:2,60")
                .middleware("require:name")
                .handler(|| async { json!({ "created": true }) }),
        )
        .build()
        .unwrap();

    let wire = kernel.process(envelope("user.create", json!({}))).await;
    assert_eq!(wire.status, StatusCode::UNPROCESSABLE_ENTITY);

    let wire = kernel
        .process(envelope("user.create", json!({ "name": "ada" })))
        .await;
    assert_eq!(wire.status, StatusCode::OK);

    let wire = kernel
        .process(envelope("user.create", json!({ "name": "bob" })))
        .await;
    assert_eq!(wire.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body(&wire, kernel.packer())["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_kernel_from_config() {
    let config: CourierConfig = serde_json::from_value(json!({
        "app": { "name": "orders", "secret_status": false },
        "kernel": { "middleware": ["throttle:1,60"] },
    }))
    .unwrap();

    let kernel = Kernel::builder()
        .config(&config)
        .caller(Matcher::new("ping").handler(|| async {}))
        .build()
        .unwrap();
    assert_eq!(kernel.global_middleware().len(), 1);
    assert_eq!(kernel.global_middleware()[0].name(), "throttle");

    assert_eq!(
        kernel.process(envelope("ping", json!({}))).await.status,
        StatusCode::OK
    );
    assert_eq!(
        kernel.process(envelope("ping", json!({}))).await.status,
        StatusCode::TOO_MANY_REQUESTS
    );
}

fn json_map(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("not a mapping: {other}"),
    }
}
