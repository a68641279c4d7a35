use async_trait::async_trait;
use serde_json::Value;

use crate::middleware::Middleware;
use crate::pipeline::Next;
use crate::request::Request;
use courier_core::{CoreResult, Response, ServiceError};

/// Rejects requests whose data lacks any of the listed keys:
/// `require:key1,key2`.
///
/// A key mapped to `null` counts as missing.
#[derive(Debug, Clone, Default)]
pub struct RequireKeys {
    keys: Vec<String>,
}

impl RequireKeys {
    /// Creates a validator for `keys`.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(Into::into)
                .filter(|key: &String| !key.is_empty())
                .collect(),
        }
    }

    /// Builds a validator from the spec parameters.
    pub fn from_params(params: &[String]) -> CoreResult<Self> {
        Ok(Self::new(params.iter().cloned()))
    }
}

#[async_trait]
impl Middleware for RequireKeys {
    async fn handle(&self, request: &mut Request, next: Next<'_>) -> CoreResult<Response> {
        let missing: Vec<&str> = self
            .keys
            .iter()
            .filter(|key| matches!(request.data().get(key.as_str()), None | Some(Value::Null)))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return Err(ServiceError::unprocessable_entity(format!(
                "missing required field(s): {}",
                missing.join(", ")
            ))
            .into());
        }

        next.run(request).await
    }
}
