//! # Courier Core
//!
//! The leaf layer of the Courier request kernel.
//!
//! This crate provides the types every other layer builds on:
//! - **Payloads and envelopes**: the decoded `{call, data}` shape ([`Payload`], [`Envelope`])
//! - **Responses**: status + data + packed bytes ([`Response`], [`WireResponse`])
//! - **Error taxonomy**: every failure the kernel can render ([`CoreError`], [`ServiceError`])
//! - **Packer**: JSON encoding with optional AES-256-GCM sealing ([`Packer`])
//!
//! ```text
//! wire body ──Packer::unpack_wire──▶ Payload ──Envelope::from_payload──▶ {call, data}
//!                                                                      │
//!            WireResponse ◀──Response::to_wire── Response ◀──handler───┘
//! ```

pub mod error;
pub mod message;
pub mod packer;
pub mod status;

pub use error::{CoreError, CoreResult, ErrorCode, ServiceError};
pub use message::{
    Envelope, Payload, Response, WIRE_DATA_KEY, WireResponse, value_kind, wire_body, wire_packed,
};
pub use packer::{Packer, PackerConfig, SecretStatus};
pub use status::StatusCode;
