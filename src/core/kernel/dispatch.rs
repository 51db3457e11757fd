use crate::core::types::{DataPush, RoutingKey};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, trace, warn};

/// Callback invoked for every data push routed to its key
///
/// Handlers run on the connection's read task, in socket-arrival order, and
/// must not block; hand work off to a channel when it is not trivial.
pub type Handler = Arc<dyn Fn(&DataPush) -> anyhow::Result<()> + Send + Sync>;

/// Outcome of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
}

/// Routes data pushes to handlers bound by channel or by (channel, instrument)
///
/// A push for `(channel, inst)` reaches the handlers bound to that exact key
/// first and then those bound to the channel alone, each list in
/// registration order. A handler bound under both keys runs twice.
#[derive(Default)]
pub struct CallbackDispatcher {
    bindings: RwLock<HashMap<RoutingKey, Vec<Handler>>>,
}

impl std::fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<String, usize> = bindings
            .iter()
            .map(|(key, handlers)| (key.to_string(), handlers.len()))
            .collect();
        f.debug_struct("CallbackDispatcher")
            .field("bindings", &counts)
            .finish()
    }
}

impl CallbackDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the list bound to `key`
    pub fn register<F>(&self, key: RoutingKey, handler: F)
    where
        F: Fn(&DataPush) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_handler(key, Arc::new(handler));
    }

    pub fn register_handler(&self, key: RoutingKey, handler: Handler) {
        let mut bindings = self
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        bindings.entry(key).or_default().push(handler);
    }

    /// Drop every handler bound to exactly `key`; returns how many were removed
    pub fn remove(&self, key: &RoutingKey) -> usize {
        let mut bindings = self
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        bindings.remove(key).map_or(0, |handlers| handlers.len())
    }

    pub fn handler_count(&self, key: &RoutingKey) -> usize {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        bindings.get(key).map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Invoke every handler the push routes to
    ///
    /// Handler errors and panics are logged and counted; delivery to the
    /// remaining handlers continues.
    pub fn dispatch(&self, push: &DataPush) -> DispatchReport {
        let exact = push.routing_key();
        let targets = self.targets(&exact);

        let mut report = DispatchReport::default();
        for handler in targets {
            report.invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| handler(push))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(key = %exact, error = %e, "handler failed");
                }
                Err(_) => {
                    report.failed += 1;
                    error!(key = %exact, "handler panicked");
                }
            }
        }

        trace!(key = %exact, invoked = report.invoked, "dispatched push");
        report
    }

    // Snapshot under the read lock so handlers may register or remove bindings
    fn targets(&self, exact: &RoutingKey) -> Vec<Handler> {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        let mut targets = Vec::new();

        if !exact.is_channel_only() {
            if let Some(handlers) = bindings.get(exact) {
                targets.extend(handlers.iter().cloned());
            }
        }
        if let Some(handlers) = bindings.get(&exact.channel_only()) {
            targets.extend(handlers.iter().cloned());
        }

        targets
    }
}
