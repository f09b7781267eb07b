//! What the run loop does when an event's action fails.
//!
//! This is the only place where event-execution failures are recovered
//! from. State-transition errors (start, stop, initialize) are returned to
//! their caller and never pass through here.

use serde::{Deserialize, Serialize};

use crate::error::{EventError, SimulatorError};
use crate::simulator::Simulator;
use crate::simulator::time::SimTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Log and keep running.
    LogAndContinue,
    /// Log at a higher severity and keep running.
    WarnAndContinue,
    /// Log and stop the run loop. The event list and clock are left as they
    /// were when the failing event began, so `start` resumes from there.
    #[default]
    WarnAndPause,
    /// Log and clean the simulator up completely.
    WarnAndEnd,
    /// Log and terminate the process.
    WarnAndExit,
    /// Log, stop, and hand the failure back: to the caller of `step`, or to
    /// `take_event_error` when the worker thread was running.
    WarnAndThrow,
}

impl ErrorStrategy {
    pub fn default_log_level(self) -> LogLevel {
        match self {
            ErrorStrategy::LogAndContinue => LogLevel::Info,
            ErrorStrategy::WarnAndContinue => LogLevel::Warn,
            ErrorStrategy::WarnAndPause
            | ErrorStrategy::WarnAndEnd
            | ErrorStrategy::WarnAndExit
            | ErrorStrategy::WarnAndThrow => LogLevel::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// How the run loop proceeds after an event.
#[derive(Debug)]
pub(crate) enum Flow {
    Continue,
    Halt,
    Throw(SimulatorError),
}

pub(crate) fn recover<T: SimTime>(
    simulator: &Simulator<T>,
    event: String,
    time: T,
    error: EventError,
) -> Flow {
    let (strategy, level) = simulator.error_policy();
    log_failure(level, strategy, &event, time, &error);
    match strategy {
        ErrorStrategy::LogAndContinue | ErrorStrategy::WarnAndContinue => Flow::Continue,
        ErrorStrategy::WarnAndPause => {
            simulator.pause_after_failure();
            Flow::Halt
        }
        ErrorStrategy::WarnAndEnd => {
            simulator.clean_up();
            Flow::Halt
        }
        ErrorStrategy::WarnAndExit => {
            tracing::error!("Terminating process after failure of {}", event);
            std::process::exit(-1);
        }
        ErrorStrategy::WarnAndThrow => {
            simulator.pause_after_failure();
            Flow::Throw(SimulatorError::EventFailed {
                event,
                time: format!("{:?}", time),
                source: error,
            })
        }
    }
}

fn log_failure<T: SimTime>(
    level: LogLevel,
    strategy: ErrorStrategy,
    event: &str,
    time: T,
    error: &EventError,
) {
    let msg = format!(
        "Event {} failed at t={:?} ({:?}): {}",
        event, time, strategy, error
    );
    match level {
        LogLevel::Trace => tracing::trace!("{}", msg),
        LogLevel::Debug => tracing::debug!("{}", msg),
        LogLevel::Info => tracing::info!("{}", msg),
        LogLevel::Warn => tracing::warn!("{}", msg),
        LogLevel::Error => tracing::error!("{}", msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_strategy_and_level() {
        let strategy = ErrorStrategy::default();
        assert_eq!(strategy, ErrorStrategy::WarnAndPause);
        assert_eq!(strategy.default_log_level(), LogLevel::Error);
    }

    #[test]
    fn test_continue_strategies_log_lower() {
        assert_eq!(ErrorStrategy::LogAndContinue.default_log_level(), LogLevel::Info);
        assert_eq!(ErrorStrategy::WarnAndContinue.default_log_level(), LogLevel::Warn);
    }

    #[test]
    fn test_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            strategy: ErrorStrategy,
            level: LogLevel,
        }
        let w: Wrapper = toml::from_str("strategy = 'warn_and_end'\nlevel = 'debug'").unwrap();
        assert_eq!(w.strategy, ErrorStrategy::WarnAndEnd);
        assert_eq!(w.level.as_tracing(), tracing::Level::DEBUG);
    }
}
