//! Courier Runtime - the kernel and its surroundings.
//!
//! This crate provides:
//! - The request [`Kernel`] and its [`KernelBuilder`]
//! - Collaborator traits with tracing-based defaults ([`collaborators`])
//! - Layered configuration loading ([`config`])
//! - Logging setup ([`logging`])
//! - A tower [`Service`](tower::Service) adapter ([`KernelService`])
//!
//! ```ignore
//! use courier_runtime::{Kernel, KernelService, config::load_config, logging};
//! use courier_framework::Matcher;
//!
//! let config = load_config()?;
//! logging::init_from_config(&config.logging);
//!
//! let kernel = Kernel::builder()
//!     .config(&config)
//!     .caller(Matcher::new("ping").handler(|| async { serde_json::json!({ "ok": true }) }))
//!     .build()?;
//!
//! let service = KernelService::new(kernel);
//! ```

pub mod collaborators;
pub mod config;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod service;

pub use collaborators::{
    AppTerminator, Bootstrapper, ErrorRenderer, ErrorReporter, EventNotifier, JsonErrorRenderer,
    NoopTerminator, TracingNotifier, TracingReporter,
};
pub use config::{ConfigError, ConfigLoader, ConfigResult, CourierConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use kernel::{Kernel, KernelBuilder, KernelState, to_response};
pub use logging::{LoggingBuilder, SpanEvents};
pub use service::KernelService;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports of the logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
