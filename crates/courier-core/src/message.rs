//! Data carriers: payloads, the inbound envelope, responses and wire bodies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::status::StatusCode;

/// A decoded payload: string keys mapped to arbitrary JSON values.
pub type Payload = Map<String, Value>;

// =============================================================================
// Envelope
// =============================================================================

/// The inbound message once unpacked from its wire body: `{ "call": ..., "data": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Identifier of the caller that should service the request.
    pub call: String,
    /// Caller arguments; an absent or `null` field decodes to an empty map.
    #[serde(default)]
    pub data: Payload,
}

impl Envelope {
    /// Creates an envelope.
    pub fn new(call: impl Into<String>, data: Payload) -> Self {
        Self {
            call: call.into(),
            data,
        }
    }

    /// Extracts the envelope from an unpacked payload.
    ///
    /// Fails with [`CoreError::MalformedPayload`] when `call` is missing or not
    /// a string, or when `data` is present but not a mapping.
    pub fn from_payload(mut payload: Payload) -> CoreResult<Self> {
        let call = match payload.remove("call") {
            Some(Value::String(call)) => call,
            Some(other) => {
                return Err(CoreError::malformed(format!(
                    "field 'call' must be a string, got {}",
                    value_kind(&other)
                )));
            }
            None => return Err(CoreError::malformed("missing field 'call'")),
        };

        let data = match payload.remove("data") {
            None | Some(Value::Null) => Payload::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(CoreError::malformed(format!(
                    "field 'data' must be a mapping, got {}",
                    value_kind(&other)
                )));
            }
        };

        Ok(Self { call, data })
    }

    /// Converts the envelope back into a payload.
    pub fn into_payload(self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("call".to_string(), Value::String(self.call));
        payload.insert("data".to_string(), Value::Object(self.data));
        payload
    }
}

/// Returns a short name for the shape of a JSON value.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}

// =============================================================================
// Response
// =============================================================================

/// The normalized result of one request.
///
/// A response is built exactly once per request. Once it has been packed the
/// packed bytes are authoritative and the data can no longer be replaced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    status: StatusCode,
    data: Option<Payload>,
    packed: Option<Vec<u8>>,
}

impl Response {
    /// Creates an empty success response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a success response carrying `data`.
    pub fn with_data(data: Payload) -> Self {
        Self {
            status: StatusCode::OK,
            data: Some(data),
            packed: None,
        }
    }

    /// Sets the status code (builder pattern).
    pub fn status(mut self, status: impl Into<StatusCode>) -> Self {
        self.status = status.into();
        self
    }

    /// Returns the status code.
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Replaces the status code.
    pub fn set_status(&mut self, status: impl Into<StatusCode>) {
        self.status = status.into();
    }

    /// Returns the data payload, if any.
    pub fn data(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    /// Returns whether the response carries a non-empty payload.
    pub fn has_data(&self) -> bool {
        self.data.as_ref().is_some_and(|data| !data.is_empty())
    }

    /// Replaces the data payload.
    ///
    /// Fails once the response has been packed.
    pub fn set_data(&mut self, data: Payload) -> CoreResult<()> {
        if self.packed.is_some() {
            return Err(CoreError::internal("response is already packed"));
        }
        self.data = Some(data);
        Ok(())
    }

    /// Returns the packed representation, if the response has been packed.
    pub fn packed(&self) -> Option<&[u8]> {
        self.packed.as_deref()
    }

    /// Returns whether the response has been packed.
    pub fn is_packed(&self) -> bool {
        self.packed.is_some()
    }

    /// Stores the packed representation, freezing the data.
    pub fn set_packed(&mut self, packed: Vec<u8>) {
        self.packed = Some(packed);
    }

    /// Converts the response into its wire form.
    ///
    /// The body is `{"data": "<packed>"}` for packed responses and `{}`
    /// otherwise.
    pub fn to_wire(&self) -> WireResponse {
        WireResponse {
            status: self.status,
            body: wire_body(self.packed.as_deref()),
        }
    }
}

// =============================================================================
// Wire bodies
// =============================================================================

/// Key holding the packed payload in wire bodies, in both directions.
pub const WIRE_DATA_KEY: &str = "data";

/// Wraps packed bytes as `{"data": "<packed>"}`, or `{}` when there are none.
pub fn wire_body(packed: Option<&[u8]>) -> Vec<u8> {
    let mut body = Payload::new();
    if let Some(packed) = packed {
        body.insert(
            WIRE_DATA_KEY.to_string(),
            Value::String(String::from_utf8_lossy(packed).into_owned()),
        );
    }
    Value::Object(body).to_string().into_bytes()
}

/// Extracts the packed string from a `{"data": "<packed>"}` wire body.
///
/// Anything else fails with [`CoreError::MalformedPayload`].
pub fn wire_packed(body: &[u8]) -> CoreResult<String> {
    let outer = match serde_json::from_slice::<Value>(body).map_err(CoreError::malformed)? {
        Value::Object(outer) => outer,
        other => {
            return Err(CoreError::malformed(format!(
                "expected a mapping at the top level, got {}",
                value_kind(&other)
            )));
        }
    };

    match outer.get(WIRE_DATA_KEY) {
        Some(Value::String(packed)) => Ok(packed.clone()),
        Some(other) => Err(CoreError::malformed(format!(
            "field '{WIRE_DATA_KEY}' must hold the packed string, got {}",
            value_kind(other)
        ))),
        None => Err(CoreError::malformed(format!(
            "missing field '{WIRE_DATA_KEY}'"
        ))),
    }
}

/// Raw bytes plus a status code, handed back to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    /// Status carried alongside the body.
    pub status: StatusCode,
    /// Encoded body.
    pub body: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test payloads are objects"),
        }
    }

    #[test]
    fn test_envelope_from_payload() {
        let envelope =
            Envelope::from_payload(payload(json!({"call": "ping", "data": {"a": 1}}))).unwrap();
        assert_eq!(envelope.call, "ping");
        assert_eq!(envelope.data.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_envelope_absent_or_null_data_is_empty() {
        let envelope = Envelope::from_payload(payload(json!({"call": "ping"}))).unwrap();
        assert!(envelope.data.is_empty());

        let envelope =
            Envelope::from_payload(payload(json!({"call": "ping", "data": null}))).unwrap();
        assert!(envelope.data.is_empty());
    }

    #[test]
    fn test_envelope_rejects_bad_shapes() {
        let err = Envelope::from_payload(payload(json!({"data": {}}))).unwrap_err();
        assert!(matches!(err, CoreError::MalformedPayload { .. }));

        let err = Envelope::from_payload(payload(json!({"call": 7}))).unwrap_err();
        assert!(err.to_string().contains("number"));

        let err =
            Envelope::from_payload(payload(json!({"call": "ping", "data": [1, 2]}))).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_wire_packed() {
        assert_eq!(wire_packed(br#"{"data":"abc"}"#).unwrap(), "abc");
        assert_eq!(wire_packed(&wire_body(Some(&b"{}"[..]))).unwrap(), "{}");

        let bodies: [&[u8]; 4] = [b"{}", br#"{"data":{"call":"ping"}}"#, b"[]", br#"{"data":"#];
        for body in bodies {
            assert!(matches!(wire_packed(body), Err(CoreError::MalformedPayload { .. })));
        }
    }

    #[test]
    fn test_response_defaults() {
        let response = Response::new();
        assert_eq!(response.status_code(), StatusCode::OK);
        assert!(!response.has_data());
        assert!(!response.is_packed());
    }

    #[test]
    fn test_packed_response_is_frozen() {
        let mut response = Response::with_data(payload(json!({"ok": true})));
        response.set_packed(b"{\"ok\":true}".to_vec());
        assert!(response.set_data(Payload::new()).is_err());
        assert_eq!(response.data().unwrap().get("ok"), Some(&json!(true)));
    }

    #[test]
    fn test_wire_shape() {
        let mut response = Response::with_data(payload(json!({"ok": true}))).status(201u16);
        response.set_packed(b"{\"ok\":true}".to_vec());
        let wire = response.to_wire();
        assert_eq!(wire.status.as_u16(), 201);

        let body: Value = serde_json::from_slice(&wire.body).unwrap();
        assert_eq!(body, json!({"data": "{\"ok\":true}"}));

        let wire = Response::new().to_wire();
        assert_eq!(wire.body, b"{}");
    }
}
