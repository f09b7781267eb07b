//! Run-loop strategies.
//!
//! Every simulator flavor shares the lifecycle in the parent module and
//! differs only in how the clock advances while the loop runs:
//!
//! - `Devs` jumps from event to event.
//! - `Dess` adds a fixed time step and has no event list.
//! - `Hybrid` executes every event inside a time-step window, then moves
//!   the clock to the window boundary.
//! - `RealTime` jumps from event to event, but never ahead of the wall
//!   clock scaled by a speed factor.
//!
//! All loops re-check the run state at every safe point (between events,
//! between steps, while waiting) and exit as soon as it is no longer
//! STARTED.

pub(crate) mod animation;
mod dess;
mod devs;
mod hybrid;
mod real_time;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{SimulatorError, SimulatorResult};
use crate::simulator::error_strategy::{self, Flow};
use crate::simulator::event_queue::SimEvent;
use crate::simulator::state::RunState;
use crate::simulator::time::SimTime;
use crate::simulator::Simulator;

/// Wall-clock pacing of a real-time simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealTimeClock {
    /// Simulation time units per wall-clock unit. 2.0 runs twice as fast
    /// as the wall clock.
    pub speed_factor: f64,
    /// When behind the wall clock, run the overdue events back to back
    /// (`true`) or accept the lag and pace from the current position.
    pub catchup: bool,
    /// Interval at which a waiting loop advances the clock, in ms.
    pub update_msec: u64,
    /// Wall-clock milliseconds per simulation time unit at speed 1.0.
    pub wall_ms_per_unit: f64,
}

impl Default for RealTimeClock {
    fn default() -> Self {
        Self {
            speed_factor: 1.0,
            catchup: true,
            update_msec: 10,
            wall_ms_per_unit: 1000.0,
        }
    }
}

impl RealTimeClock {
    pub fn validate(&self) -> SimulatorResult<()> {
        if !(self.speed_factor.is_finite() && self.speed_factor > 0.0) {
            return Err(SimulatorError::InvalidSpeedFactor(self.speed_factor));
        }
        if !(self.wall_ms_per_unit.is_finite() && self.wall_ms_per_unit > 0.0) {
            return Err(SimulatorError::InvalidRealTimeClock(format!(
                "{} wall ms per unit must be positive and finite",
                self.wall_ms_per_unit
            )));
        }
        if self.update_msec == 0 {
            return Err(SimulatorError::InvalidRealTimeClock(
                "update interval must be at least 1 ms".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum RunLoop<T: SimTime> {
    Devs,
    Dess { time_step: T::Relative },
    Hybrid { time_step: T::Relative, animated: bool },
    RealTime(RealTimeClock),
}

impl<T: SimTime> RunLoop<T> {
    pub fn name(&self) -> &'static str {
        match self {
            RunLoop::Devs => "DEVS",
            RunLoop::Dess { .. } => "DESS",
            RunLoop::Hybrid { animated: false, .. } => "hybrid",
            RunLoop::Hybrid { animated: true, .. } => "animated hybrid",
            RunLoop::RealTime(_) => "real-time",
        }
    }

    pub fn time_step(&self) -> Option<T::Relative> {
        match self {
            RunLoop::Dess { time_step } | RunLoop::Hybrid { time_step, .. } => Some(*time_step),
            RunLoop::Devs | RunLoop::RealTime(_) => None,
        }
    }

    /// Time-stepped simulators without events get no warmup or
    /// end-of-replication markers.
    pub fn uses_event_list(&self) -> bool {
        !matches!(self, RunLoop::Dess { .. })
    }

    /// Fires UPDATE_ANIMATION notifications while running.
    pub fn is_animated(&self) -> bool {
        matches!(
            self,
            RunLoop::Hybrid { animated: true, .. } | RunLoop::RealTime(_)
        )
    }

    pub fn is_real_time(&self) -> bool {
        matches!(self, RunLoop::RealTime(_))
    }

    pub(crate) fn validate(&self) -> SimulatorResult<()> {
        match self {
            RunLoop::Devs => Ok(()),
            RunLoop::Dess { time_step } | RunLoop::Hybrid { time_step, .. } => {
                validate_time_step::<T>(*time_step)
            }
            RunLoop::RealTime(clock) => clock.validate(),
        }
    }
}

pub(crate) fn validate_time_step<T: SimTime>(step: T::Relative) -> SimulatorResult<()> {
    let value = T::relative_as_f64(step);
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimulatorError::InvalidTimeStep(format!("{:?}", step)))
    }
}

/// Run the loop of the simulator's flavor until it stops.
pub(crate) fn run<T: SimTime>(simulator: &Simulator<T>) {
    match simulator.run_loop() {
        RunLoop::Devs => devs::run(simulator),
        RunLoop::Dess { .. } => dess::run(simulator),
        RunLoop::Hybrid { .. } => hybrid::run(simulator),
        RunLoop::RealTime(_) => real_time::run(simulator),
    }
}

/// One unit of work on the calling thread. Real-time simulators execute
/// their next event without waiting.
pub(crate) fn step<T: SimTime>(simulator: &Simulator<T>) -> SimulatorResult<()> {
    let flow = match simulator.run_loop() {
        RunLoop::Devs | RunLoop::RealTime(_) => devs::step(simulator),
        RunLoop::Dess { .. } => dess::step(simulator),
        RunLoop::Hybrid { .. } => hybrid::step(simulator),
    };
    match flow {
        Flow::Throw(e) => Err(e),
        Flow::Continue | Flow::Halt => Ok(()),
    }
}

/// Apply the outcome of an event. Returns `true` when the loop must exit.
pub(crate) fn should_exit<T: SimTime>(simulator: &Simulator<T>, flow: Flow) -> bool {
    match flow {
        Flow::Continue => false,
        Flow::Halt => true,
        Flow::Throw(e) => {
            simulator.record_event_error(e);
            true
        }
    }
}

/// Execute a dequeued event outside the semaphore and route any failure
/// through the error strategy.
pub(crate) fn execute<T: SimTime>(simulator: &Simulator<T>, event: SimEvent<T>) -> Flow {
    let description = event.to_string();
    let time = event.time();
    tracing::trace!("Executing {}", description);
    simulator.with_core(|core| core.events_executed += 1);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| event.into_action().execute(simulator)));
    let error = match outcome {
        Ok(Ok(())) => {
            simulator.check_stopping_condition();
            return Flow::Continue;
        }
        Ok(Err(error)) => error,
        Err(payload) => panic_message(payload).into(),
    };
    error_strategy::recover(simulator, description, time, error)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("action panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("action panicked: {}", msg)
    } else {
        "action panicked".to_string()
    }
}

pub(crate) enum Next<T: SimTime> {
    Event(SimEvent<T>),
    /// No event is due before the run-until time (or window end).
    Exhausted,
    /// The run state left STARTED.
    Stopped,
}

/// Dequeue the earliest event if it is due, moving the clock to its time.
///
/// `window_end` additionally bounds the event time; `bounded` applies the
/// run-until limit.
pub(crate) fn pop_next<T: SimTime>(
    simulator: &Simulator<T>,
    window_end: Option<T>,
    bounded: bool,
) -> Next<T> {
    simulator.with_core(|core| {
        if core.run_state != RunState::Started {
            return Next::Stopped;
        }
        let Some(first) = core.event_list.peek() else {
            return Next::Exhausted;
        };
        let time = first.time();
        if bounded && !core.within_run_until(time) {
            return Next::Exhausted;
        }
        if window_end.is_some_and(|end| time > end) {
            return Next::Exhausted;
        }
        match core.event_list.remove_first() {
            Ok(event) => {
                core.advance_to(simulator, time);
                Next::Event(event)
            }
            Err(_) => Next::Exhausted,
        }
    })
}
