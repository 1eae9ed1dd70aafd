//! Interpreter configuration
//!
//! Builder-style configuration handed to the interpreter at construction.
//! The base-activation handler is how embedders inject extra declarations
//! (host objects, convenience functions) into the builtin scope for a
//! given code location without threading dependencies through the AST.

use crate::activation::Activation;
use std::rc::Rc;
use tally_core::location::Location;

/// Hook injecting declarations into the base activation for a location
pub type BaseActivationHandler = Rc<dyn Fn(&Location, &mut Activation)>;

/// Host hook polled once per statement; `true` cancels evaluation
pub type InterruptHook = Rc<dyn Fn() -> bool>;

#[derive(Clone)]
pub struct InterpreterConfig {
    /// Maximum interpreted call depth before the run is aborted
    pub max_call_depth: usize,
    pub interrupt: Option<InterruptHook>,
    pub base_activation_handler: Option<BaseActivationHandler>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_call_depth: 256,
            interrupt: None,
            base_activation_handler: None,
        }
    }
}

impl InterpreterConfig {
    pub fn new() -> Self {
        InterpreterConfig::default()
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_interrupt(mut self, hook: InterruptHook) -> Self {
        self.interrupt = Some(hook);
        self
    }

    pub fn with_base_activation_handler(mut self, handler: BaseActivationHandler) -> Self {
        self.base_activation_handler = Some(handler);
        self
    }
}

// Debug cannot derive over the closure fields; render what is renderable
impl std::fmt::Debug for InterpreterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterConfig")
            .field("max_call_depth", &self.max_call_depth)
            .field("interrupt", &self.interrupt.is_some())
            .field(
                "base_activation_handler",
                &self.base_activation_handler.is_some(),
            )
            .finish()
    }
}
