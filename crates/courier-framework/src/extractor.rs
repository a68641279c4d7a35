//! Extractor system for handler parameters.
//!
//! This module provides the [`FromRequest`] trait, which defines how types
//! can be extracted from a [`Request`] for use as handler parameters.

use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::request::Request;
use courier_core::{CoreError, CoreResult, Payload, ServiceError};

/// A trait for types that can be extracted from a [`Request`].
///
/// Extraction happens before the handler runs. A failed extraction fails the
/// request with the returned error, which the kernel renders like any other.
///
/// # Example
///
/// ```rust,ignore
/// use courier_framework::{FromRequest, Request};
/// use courier_core::CoreResult;
///
/// struct Locale(String);
///
/// impl FromRequest for Locale {
///     fn from_request(request: &Request) -> CoreResult<Self> {
///         let locale = request.data().get("locale").and_then(|v| v.as_str()).unwrap_or("en");
///         Ok(Locale(locale.to_string()))
///     }
/// }
/// ```
pub trait FromRequest: Sized {
    /// Attempts to extract this type from the given request.
    fn from_request(request: &Request) -> CoreResult<Self>;
}

/// The request data deserialized into `T`.
///
/// A payload that does not match `T` fails with `422 Unprocessable Entity`.
///
/// ```rust,ignore
/// #[derive(Deserialize)]
/// struct ShowUser { id: u64 }
///
/// async fn show(Data(params): Data<ShowUser>) -> Json<User> { ... }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Data<T>(pub T);

impl<T: DeserializeOwned> FromRequest for Data<T> {
    fn from_request(request: &Request) -> CoreResult<Self> {
        serde_json::from_value(Value::Object(request.data().clone()))
            .map(Data)
            .map_err(|e| ServiceError::unprocessable_entity(format!("invalid data: {e}")).into())
    }
}

/// The raw data mapping.
impl FromRequest for Payload {
    fn from_request(request: &Request) -> CoreResult<Self> {
        Ok(request.data().clone())
    }
}

/// The call identifier the request was dispatched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallId(pub String);

impl FromRequest for CallId {
    fn from_request(request: &Request) -> CoreResult<Self> {
        request
            .call()
            .map(|call| CallId(call.to_string()))
            .ok_or_else(|| CoreError::internal("request has no call identifier"))
    }
}

/// The per-request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

impl FromRequest for RequestId {
    fn from_request(request: &Request) -> CoreResult<Self> {
        Ok(RequestId(request.id()))
    }
}

/// A typed value a middleware stored with
/// [`Request::insert_extension`](crate::Request::insert_extension).
#[derive(Debug, Clone)]
pub struct Extension<T>(pub T);

impl<T: Clone + Send + Sync + 'static> FromRequest for Extension<T> {
    fn from_request(request: &Request) -> CoreResult<Self> {
        request
            .extension::<T>()
            .cloned()
            .map(Extension)
            .ok_or_else(|| {
                CoreError::internal(format!(
                    "missing request extension '{}'",
                    std::any::type_name::<T>()
                ))
            })
    }
}

/// Optional parameters never fail extraction.
impl<T: FromRequest> FromRequest for Option<T> {
    fn from_request(request: &Request) -> CoreResult<Self> {
        Ok(T::from_request(request).ok())
    }
}
