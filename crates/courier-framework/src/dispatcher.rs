//! Call dispatcher for the Courier framework.
//!
//! The [`Dispatcher`] maps normalized call identifiers to their [`Matcher`]s.
//! Resolution is a pure lookup: no handler runs and no middleware is touched.
//!
//! ```rust,ignore
//! use courier_framework::{Dispatcher, Matcher};
//!
//! let dispatcher = Dispatcher::new()
//!     .with(Matcher::new("ping").handler(ping))
//!     .with(Matcher::new("user/show").middleware("require:id").handler(show_user));
//!
//! let matcher = dispatcher.resolve("user.show")?;
//! ```

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::matcher::{Matcher, normalize_call};
use courier_core::{CoreError, CoreResult};

/// Registry of callers keyed by call identifier.
///
/// # Thread Safety
///
/// `Dispatcher` is `Send + Sync`. The kernel freezes it behind an `Arc` once
/// built, after which it is only read.
#[derive(Default, Clone)]
pub struct Dispatcher {
    matchers: HashMap<String, Matcher>,
}

impl Dispatcher {
    /// Creates a new, empty dispatcher.
    pub fn new() -> Self {
        Self {
            matchers: HashMap::new(),
        }
    }

    /// Registers a matcher.
    ///
    /// Registering the same call identifier again replaces the previous
    /// matcher.
    pub fn add(&mut self, matcher: Matcher) {
        let call = matcher.call().to_string();
        if self.matchers.insert(call.clone(), matcher).is_some() {
            warn!(call = %call, "Caller registered twice, replacing previous matcher");
        }
    }

    /// Registers a matcher (builder pattern).
    pub fn with(mut self, matcher: Matcher) -> Self {
        self.add(matcher);
        self
    }

    /// Returns the number of registered matchers.
    pub fn matcher_count(&self) -> usize {
        self.matchers.len()
    }

    /// Returns whether `call` is registered.
    pub fn contains(&self, call: &str) -> bool {
        self.matchers.contains_key(&normalize_call(call))
    }

    /// Returns every registered call identifier, sorted.
    pub fn calls(&self) -> Vec<&str> {
        let mut calls: Vec<&str> = self.matchers.keys().map(String::as_str).collect();
        calls.sort_unstable();
        calls
    }

    /// Resolves a call identifier to its matcher.
    ///
    /// Fails with [`CoreError::UnknownCaller`] when nothing is registered
    /// under `call`.
    pub fn resolve(&self, call: &str) -> CoreResult<Matcher> {
        let normalized = normalize_call(call);
        match self.matchers.get(&normalized) {
            Some(matcher) => {
                debug!(call = %normalized, "Resolved caller");
                Ok(matcher.clone())
            }
            None => {
                debug!(call = %normalized, "No caller registered");
                Err(CoreError::UnknownCaller { call: normalized })
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("calls", &self.calls())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new()
            .with(Matcher::new("ping").handler(|| async {}))
            .with(Matcher::new("user/show").middleware("a").handler(|| async {}))
    }

    #[test]
    fn test_resolve_normalizes() {
        let dispatcher = dispatcher();
        assert_eq!(dispatcher.resolve("user.show").unwrap().call(), "user.show");
        assert_eq!(dispatcher.resolve("/user/show").unwrap().call(), "user.show");
        assert!(dispatcher.contains("user/show"));
    }

    #[test]
    fn test_unknown_caller() {
        let err = dispatcher().resolve("nope").unwrap_err();
        match err {
            CoreError::UnknownCaller { call } => assert_eq!(call, "nope"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_reregistering_replaces() {
        let mut dispatcher = dispatcher();
        dispatcher.add(Matcher::new("ping").middleware("b").handler(|| async {}));

        assert_eq!(dispatcher.matcher_count(), 2);
        let ping = dispatcher.resolve("ping").unwrap();
        assert_eq!(ping.middleware_specs()[0].name(), "b");
    }

    #[test]
    fn test_calls_sorted() {
        assert_eq!(dispatcher().calls(), ["ping", "user.show"]);
    }
}
