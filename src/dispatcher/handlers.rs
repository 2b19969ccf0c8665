//! Observer registry for state-transition and port-allocation callbacks.

use std::collections::HashMap;

use crate::models::process::{ProcessState, RunState};

/// Callback invoked with the applied update after a run-state transition.
pub type TransitionHandler = Box<dyn FnMut(&ProcessState)>;

/// Callback invoked with `(port_name, port)` after a new port allocation.
pub type PortHandler = Box<dyn FnMut(&str, u16)>;

/// Ordered observer lists, invoked synchronously by the dispatcher.
///
/// Registration order is preserved per list. On a transition, every
/// universal handler fires before any state-specific handler. A handler
/// that panics is not caught; the panic propagates to the `apply` caller.
#[derive(Default)]
pub struct HandlerRegistry {
    state_handlers: HashMap<RunState, Vec<TransitionHandler>>,
    universal_handlers: Vec<TransitionHandler>,
    port_handlers: Vec<PortHandler>,
}

impl HandlerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for transitions into one specific run state.
    pub fn on_state(&mut self, run_state: RunState, handler: impl FnMut(&ProcessState) + 'static) {
        self.state_handlers
            .entry(run_state)
            .or_default()
            .push(Box::new(handler));
    }

    /// Register a callback for every run-state transition.
    pub fn on_any(&mut self, handler: impl FnMut(&ProcessState) + 'static) {
        self.universal_handlers.push(Box::new(handler));
    }

    /// Register a callback for port allocations.
    pub fn on_port(&mut self, handler: impl FnMut(&str, u16) + 'static) {
        self.port_handlers.push(Box::new(handler));
    }

    /// Fire transition callbacks: universal first, then the ones registered
    /// for `run_state`, each list in registration order.
    pub(crate) fn dispatch_transition(&mut self, run_state: RunState, update: &ProcessState) {
        for handler in &mut self.universal_handlers {
            handler(update);
        }
        if let Some(handlers) = self.state_handlers.get_mut(&run_state) {
            for handler in handlers {
                handler(update);
            }
        }
    }

    /// Fire port callbacks in registration order.
    pub(crate) fn dispatch_port(&mut self, port_name: &str, port: u16) {
        for handler in &mut self.port_handlers {
            handler(port_name, port);
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("state_handlers", &self.state_handlers.len())
            .field("universal_handlers", &self.universal_handlers.len())
            .field("port_handlers", &self.port_handlers.len())
            .finish()
    }
}
