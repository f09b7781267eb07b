//! What an event does when it fires.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::EventResult;
use crate::simulator::Simulator;
use crate::simulator::time::SimTime;

/// Receiver of [`Action::MethodCall`] events.
///
/// Implementors match on `selector` and decode `args` themselves. An
/// unrecognised selector should be reported with
/// [`SimulatorError::UnknownSelector`](crate::error::SimulatorError::UnknownSelector).
pub trait EventTarget<T: SimTime>: Send + Sync {
    fn invoke(&self, simulator: &Simulator<T>, selector: &str, args: &[Value]) -> EventResult;
}

type Closure<T> = Box<dyn FnOnce(&Simulator<T>) -> EventResult + Send + 'static>;

/// The invocable part of an event.
pub enum Action<T: SimTime> {
    Closure(Closure<T>),
    MethodCall {
        target: Arc<dyn EventTarget<T>>,
        selector: String,
        args: Vec<Value>,
    },
}

impl<T: SimTime> Action<T> {
    pub fn closure<F>(f: F) -> Self
    where
        F: FnOnce(&Simulator<T>) -> EventResult + Send + 'static,
    {
        Action::Closure(Box::new(f))
    }

    pub fn method_call(
        target: Arc<dyn EventTarget<T>>,
        selector: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Action::MethodCall {
            target,
            selector: selector.into(),
            args,
        }
    }

    pub(crate) fn execute(self, simulator: &Simulator<T>) -> EventResult {
        match self {
            Action::Closure(f) => f(simulator),
            Action::MethodCall {
                target,
                selector,
                args,
            } => target.invoke(simulator, &selector, &args),
        }
    }
}

impl<T: SimTime> fmt::Debug for Action<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Closure(_) => write!(f, "Closure"),
            Action::MethodCall { selector, args, .. } => {
                write!(f, "MethodCall({}, {} args)", selector, args.len())
            }
        }
    }
}
