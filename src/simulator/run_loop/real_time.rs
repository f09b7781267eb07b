//! Event loop paced against the wall clock.
//!
//! The loop keeps a baseline `(wall0, sim0)`. At speed factor `f` the
//! wall clock says simulation time should be
//! `sim0 + elapsed_ms / wall_ms_per_unit * f`. While the next event lies
//! ahead of that, the loop sleeps in `update_msec` slices and moves the
//! clock along so animations progress smoothly. A speed change re-bases
//! at the current simulation time, so the clock never jumps.

use std::time::{Duration, Instant};

use crate::simulator::error_strategy::Flow;
use crate::simulator::event_queue::EventId;
use crate::simulator::notify::SimulatorEvent;
use crate::simulator::run_loop::{RealTimeClock, execute, should_exit};
use crate::simulator::state::RunState;
use crate::simulator::time::SimTime;
use crate::simulator::Simulator;

struct Baseline {
    wall0: Instant,
    sim0: f64,
    factor: f64,
}

impl Baseline {
    fn new(sim_now: f64, factor: f64) -> Self {
        Self {
            wall0: Instant::now(),
            sim0: sim_now,
            factor,
        }
    }

    /// Simulation time the wall clock says we should have reached.
    fn wanted(&self, clock: &RealTimeClock) -> f64 {
        let elapsed_ms = self.wall0.elapsed().as_secs_f64() * 1000.0;
        self.sim0 + elapsed_ms / clock.wall_ms_per_unit * self.factor
    }

    /// Wall time left until simulation time `target` is due.
    fn until(&self, target: f64, clock: &RealTimeClock) -> Duration {
        let wall_secs = (target - self.sim0) * clock.wall_ms_per_unit / self.factor / 1000.0;
        let due = if wall_secs > 0.0 {
            Duration::try_from_secs_f64(wall_secs).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        due.saturating_sub(self.wall0.elapsed())
    }

    /// Lag behind the wall clock, in wall-clock milliseconds.
    fn lag_ms(&self, target: f64, clock: &RealTimeClock) -> f64 {
        (self.wanted(clock) - target) * clock.wall_ms_per_unit / self.factor
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Target<T> {
    Event { id: EventId, time: T },
    /// Nothing due before the run-until time; the loop advances to it and
    /// pauses.
    RunUntil(T),
}

impl<T: SimTime> Target<T> {
    fn time(&self) -> T {
        match self {
            Target::Event { time, .. } | Target::RunUntil(time) => *time,
        }
    }
}

enum Wait {
    Due,
    Recheck,
    Stopped,
}

pub(super) fn run<T: SimTime>(simulator: &Simulator<T>) {
    let Some(clock) = simulator.real_time_clock() else {
        return;
    };
    let mut baseline = Baseline::new(simulator.simulator_time().as_f64(), clock.speed_factor);
    loop {
        let Some(clock) = simulator.real_time_clock() else {
            break;
        };
        if clock.speed_factor != baseline.factor {
            baseline = Baseline::new(simulator.simulator_time().as_f64(), clock.speed_factor);
        }
        let Some(target) = next_target(simulator) else {
            break;
        };
        let due = target.time().as_f64();
        if due > simulator.simulator_time().as_f64() {
            let lag_ms = baseline.lag_ms(due, &clock);
            if lag_ms > clock.update_msec as f64 {
                if !clock.catchup {
                    let lag = lag_ms / clock.wall_ms_per_unit * baseline.factor;
                    tracing::debug!(
                        "Real-time loop of '{}' is {:.1} ms behind; re-basing",
                        simulator.id(),
                        lag_ms
                    );
                    simulator.fire(SimulatorEvent::Backlog { lag });
                    baseline = Baseline::new(simulator.simulator_time().as_f64(), clock.speed_factor);
                    continue;
                }
            } else {
                match wait_for(simulator, &mut baseline, target) {
                    Wait::Due => {}
                    Wait::Recheck => continue,
                    Wait::Stopped => break,
                }
            }
        }
        if should_exit(simulator, fire_target(simulator, target)) {
            break;
        }
    }
}

/// The event (or run-until time) the loop is heading for.
fn next_target<T: SimTime>(simulator: &Simulator<T>) -> Option<Target<T>> {
    simulator.with_core(|core| {
        if core.run_state != RunState::Started {
            return None;
        }
        let first = core.event_list.peek()?;
        if core.within_run_until(first.time()) {
            return Some(Target::Event {
                id: first.id(),
                time: first.time(),
            });
        }
        (core.simulator_time < core.run_until_time).then_some(Target::RunUntil(core.run_until_time))
    })
}

/// Sleep until `target` is due by the wall clock. Any change that could
/// alter the decision (stop, speed factor, a new first event) ends the wait.
fn wait_for<T: SimTime>(simulator: &Simulator<T>, baseline: &mut Baseline, target: Target<T>) -> Wait {
    let due = target.time().as_f64();
    loop {
        let Some(clock) = simulator.real_time_clock() else {
            return Wait::Stopped;
        };
        if !simulator.is_started() {
            return Wait::Stopped;
        }
        if clock.speed_factor != baseline.factor {
            *baseline = Baseline::new(simulator.simulator_time().as_f64(), clock.speed_factor);
            return Wait::Recheck;
        }
        if next_target(simulator) != Some(target) {
            return Wait::Recheck;
        }
        let wanted = baseline.wanted(&clock);
        if wanted >= due {
            return Wait::Due;
        }
        creep(simulator, T::from_f64(wanted), target.time());
        let slice = baseline
            .until(due, &clock)
            .min(Duration::from_millis(clock.update_msec.max(1)));
        simulator.nap(slice);
    }
}

/// Move the clock along while waiting, staying short of the target.
fn creep<T: SimTime>(simulator: &Simulator<T>, wanted: T, target: T) {
    simulator.with_core(|core| {
        if core.run_state == RunState::Started && wanted < target {
            core.advance_to(simulator, wanted);
        }
    });
}

fn fire_target<T: SimTime>(simulator: &Simulator<T>, target: Target<T>) -> Flow {
    match target {
        Target::Event { id, .. } => {
            let event = simulator.with_core(|core| {
                if core.run_state != RunState::Started {
                    return None;
                }
                if core.event_list.peek().map(|first| first.id()) != Some(id) {
                    return None;
                }
                let event = core.event_list.remove_first().ok()?;
                core.advance_to(simulator, event.time());
                Some(event)
            });
            match event {
                Some(event) => execute(simulator, event),
                // The list changed under us; the loop picks the new first
                // event up on its next pass.
                None => Flow::Continue,
            }
        }
        Target::RunUntil(until) => {
            simulator.with_core(|core| {
                if core.run_state == RunState::Started {
                    core.advance_to(simulator, until);
                }
            });
            Flow::Halt
        }
    }
}
