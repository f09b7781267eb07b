//! Run and replication state machines.
//!
//! The two are independent: `RunState` says whether the run loop is (or is
//! about to be) active, `ReplicationState` says how far the lifecycle of
//! the attached replication has progressed.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    NotInitialized,
    Initialized,
    Starting,
    Started,
    Stopping,
    Stopped,
    Ended,
}

impl RunState {
    pub fn is_starting_or_running(self) -> bool {
        matches!(self, RunState::Starting | RunState::Started)
    }

    pub fn is_stopping_or_stopped(self) -> bool {
        matches!(self, RunState::Stopping | RunState::Stopped)
    }

    /// A replication is attached and the simulator may be started.
    pub fn is_initialized(self) -> bool {
        !matches!(self, RunState::NotInitialized | RunState::Ended)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::NotInitialized => "NOT_INITIALIZED",
            RunState::Initialized => "INITIALIZED",
            RunState::Starting => "STARTING",
            RunState::Started => "STARTED",
            RunState::Stopping => "STOPPING",
            RunState::Stopped => "STOPPED",
            RunState::Ended => "ENDED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationState {
    NotInitialized,
    Initialized,
    Started,
    Ending,
    Ended,
}

impl ReplicationState {
    /// The replication can still be started, stepped or ended.
    pub fn is_active(self) -> bool {
        matches!(self, ReplicationState::Initialized | ReplicationState::Started)
    }
}

impl fmt::Display for ReplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplicationState::NotInitialized => "NOT_INITIALIZED",
            ReplicationState::Initialized => "INITIALIZED",
            ReplicationState::Started => "STARTED",
            ReplicationState::Ending => "ENDING",
            ReplicationState::Ended => "ENDED",
        };
        f.write_str(name)
    }
}
