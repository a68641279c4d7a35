//! # Courier
//!
//! A request kernel for JSON microservices.
//!
//! ## Overview
//!
//! A raw message goes in, exactly one response comes out. In between the
//! kernel decodes the message, picks the caller registered for its `call`
//! identifier, runs the caller through an onion of middleware and packs the
//! result. Once the response is final, a separate termination pass visits
//! every middleware that was entered.
//!
//! ## Architecture
//!
//! ```text
//! {"data": packed} ─▶ Packer::unpack_wire ─▶ Envelope{call, data} ─▶ Dispatcher ─▶ Matcher
//!                                                                                │
//!          ┌─────────────────────────── Pipeline ───────────────────────────────┘
//!          │  global middleware ─▶ caller middleware ─▶ handler
//!          ▼
//!   to_response ─▶ Packer::pack ─▶ WireResponse {"data": packed}
//!          │
//!          └─▶ terminate: entered middleware, in order ─▶ app terminator
//! ```
//!
//! - **Core** ([`core`]): payloads, responses, the packer and the error taxonomy
//! - **Framework** ([`framework`]): matchers, handlers, extractors, middleware
//! - **Runtime** ([`runtime`]): the kernel, collaborators, config and logging
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[derive(serde::Deserialize)]
//! struct ShowUser {
//!     id: u64,
//! }
//!
//! async fn show(Data(params): Data<ShowUser>) -> Result<Json<serde_json::Value>, ServiceError> {
//!     let id = params.id;
//!     if id == 0 {
//!         return Err(ServiceError::not_found("no such user"));
//!     }
//!     Ok(Json(serde_json::json!({ "id": id })))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config()?;
//!     init_from_config(&config.logging);
//!
//!     let kernel = Kernel::builder()
//!         .config(&config)
//!         .caller(Matcher::new("user.show").middleware("throttle:30,60").handler(show))
//!         .build()?;
//!
//!     let message = serde_json::json!({ "call": "user.show", "data": { "id": 7 } });
//!     let raw = kernel.packer().pack_wire(&message.as_object().cloned().unwrap_or_default())?;
//!     let wire = kernel.process(raw).await;
//!     println!("{} {}", wire.status, String::from_utf8_lossy(&wire.body));
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: read `courier.toml` (default)
//! - `yaml-config`: read `courier.yaml`
//! - `json-log`: JSON log output

pub use courier_core as core;
pub use courier_framework as framework;
pub use courier_runtime as runtime;

/// Commonly used types.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    // Kernel - main entry point
    pub use courier_runtime::{Kernel, KernelBuilder, KernelService, KernelState};

    // Collaborators
    pub use courier_runtime::{
        AppTerminator, Bootstrapper, ErrorRenderer, ErrorReporter, EventNotifier,
    };

    // Configuration and logging
    pub use courier_runtime::config::{CourierConfig, load_config, load_config_from_file};
    pub use courier_runtime::logging::init_from_config;

    // Callers and handlers
    pub use courier_framework::{
        CallId, Data, Dispatcher, Extension, FromRequest, IntoReply, Json, Matcher, Reply,
        Request, RequestId,
    };

    // Middleware
    pub use courier_framework::{Middleware, MiddlewareRegistry, MiddlewareSpec, Next, async_trait};

    // Messages and errors
    pub use courier_core::{
        CoreError, CoreResult, Payload, PackerConfig, Response, ServiceError, StatusCode,
        WireResponse,
    };
}
