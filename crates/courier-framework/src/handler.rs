//! Handler system for the Courier framework.
//!
//! This module defines the [`Handler`] trait that adapts plain async functions
//! into callers. Handlers are implemented via blanket implementations for
//! functions with different arities, similar to Axum's handler system: every
//! parameter is extracted from the [`Request`] through [`FromRequest`], and the
//! return value is normalized through [`IntoReply`].
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_framework::{CallId, Data, Json};
//!
//! // No parameters, no data in the reply
//! async fn ping() {}
//!
//! // Typed data in, mapping out
//! async fn show(Data(params): Data<ShowUser>) -> Json<User> {
//!     Json(load(params.id))
//! }
//!
//! // Fallible handlers return `Result<T, E>` where `E: Into<CoreError>`
//! async fn delete(call: CallId, Data(params): Data<DeleteUser>) -> Result<(), ServiceError> {
//!     // ...
//!     Ok(())
//! }
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::extractor::FromRequest;
use crate::request::Request;
use courier_core::{CoreError, CoreResult, Payload, Response};

// ============================================================================
// Reply - normalized handler results
// ============================================================================

/// The closed set of shapes a handler result can take.
///
/// The kernel turns a `Reply` into a [`Response`]: responses pass through,
/// mapping values are packed, empty results carry no data, and every other
/// value shape is rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A fully formed response.
    Response(Response),
    /// An arbitrary JSON value.
    Value(Value),
    /// Nothing to send back.
    Empty,
}

/// A trait for types that can be returned from handlers.
pub trait IntoReply {
    /// Converts this value into a reply.
    fn into_reply(self) -> CoreResult<Reply>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> CoreResult<Reply> {
        Ok(self)
    }
}

impl IntoReply for () {
    fn into_reply(self) -> CoreResult<Reply> {
        Ok(Reply::Empty)
    }
}

impl IntoReply for Response {
    fn into_reply(self) -> CoreResult<Reply> {
        Ok(Reply::Response(self))
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> CoreResult<Reply> {
        Ok(Reply::Value(self))
    }
}

impl IntoReply for Payload {
    fn into_reply(self) -> CoreResult<Reply> {
        Ok(Reply::Value(Value::Object(self)))
    }
}

/// Serializes `T` into a JSON value.
///
/// Whether the value is acceptable as response data is decided by the kernel,
/// so `Json(vec![1, 2])` compiles but is rejected at run time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> CoreResult<Reply> {
        Ok(Reply::Value(serde_json::to_value(self.0)?))
    }
}

/// `None` becomes an empty reply.
impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> CoreResult<Reply> {
        match self {
            Some(value) => value.into_reply(),
            None => Ok(Reply::Empty),
        }
    }
}

/// `Err` fails the request with the converted error.
impl<T: IntoReply, E: Into<CoreError>> IntoReply for Result<T, E> {
    fn into_reply(self) -> CoreResult<Reply> {
        match self {
            Ok(value) => value.into_reply(),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// The core trait for callers in the Courier framework.
///
/// # Blanket Implementation
///
/// This trait is automatically implemented for async functions that:
/// - Take 0-8 parameters that implement [`FromRequest`]
/// - Return a type that implements [`IntoReply`]
///
/// Parameters are extracted in declaration order; the first failed extraction
/// fails the request without running the function body.
#[async_trait]
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// Calls the handler for the given request.
    async fn call(self, request: &Request) -> CoreResult<Reply>;
}

macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case)]
        #[async_trait]
        impl<F, Fut, Res, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: IntoReply + 'static,
            $( $ty: FromRequest + Send + 'static, )*
        {
            #[allow(unused_variables)]
            async fn call(self, request: &Request) -> CoreResult<Reply> {
                $(
                    let $ty = $ty::from_request(request)?;
                )*

                (self)($($ty,)*).await.into_reply()
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);

// ============================================================================
// BoxedHandler - Type-erased handler stored in matchers
// ============================================================================

/// Object-safe form of [`Handler`].
pub trait ErasedHandler: Send + Sync {
    /// Calls the handler with a fresh clone of the underlying function.
    fn call<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, CoreResult<Reply>>;
}

struct HandlerFn<H, T> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<H, T> ErasedHandler for HandlerFn<H, T>
where
    H: Handler<T>,
    T: 'static,
{
    fn call<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, CoreResult<Reply>> {
        self.handler.clone().call(request)
    }
}

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

/// Converts a handler function into a boxed handler.
pub fn into_handler<H, T>(handler: H) -> BoxedHandler
where
    H: Handler<T>,
    T: 'static,
{
    Arc::new(HandlerFn {
        handler,
        _marker: PhantomData,
    })
}
