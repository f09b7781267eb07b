//! Error types for the simulation kernel.
//!
//! Two families live here. State-machine and scheduling violations are
//! caller bugs and are returned synchronously from the API call that
//! caused them. Failures raised by an event's action never reach the
//! scheduling caller; the run loop hands them to the configured
//! [`ErrorStrategy`](crate::simulator::ErrorStrategy) instead.

use thiserror::Error;

/// Error produced by an event action or a model constructor.
pub type EventError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result returned by every event action.
pub type EventResult = Result<(), EventError>;

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("cannot schedule event at {requested} when current time is {current}")]
    ScheduleInPast { requested: String, current: String },
    #[error("{0} is not a valid simulation time")]
    InvalidEventTime(String),
    #[error("event list is empty")]
    EmptyEventList,
    #[error("invalid time step {0}: must be positive and finite")]
    InvalidTimeStep(String),
    #[error("priority {value} outside [{min}, {max}]")]
    InvalidPriority { value: i8, min: i8, max: i8 },
    #[error("invalid speed factor {0}: must be positive and finite")]
    InvalidSpeedFactor(f64),
    #[error("invalid real-time clock: {0}")]
    InvalidRealTimeClock(String),
    #[error("invalid replication: {0}")]
    InvalidReplication(String),
    #[error("illegal simulator state: {0}")]
    IllegalState(String),
    #[error("model construction failed: {0}")]
    ModelConstruction(#[source] EventError),
    #[error("event {event} at {time} failed: {source}")]
    EventFailed {
        event: String,
        time: String,
        #[source]
        source: EventError,
    },
    #[error("target does not understand selector '{0}'")]
    UnknownSelector(String),
    #[error("worker thread error: {0}")]
    Worker(String),
}

impl SimulatorError {
    pub(crate) fn illegal_state(msg: impl Into<String>) -> Self {
        SimulatorError::IllegalState(msg.into())
    }
}

pub type SimulatorResult<T> = Result<T, SimulatorError>;
