use crate::simulator::error_strategy::Flow;
use crate::simulator::notify::SimulatorEvent;
use crate::simulator::state::RunState;
use crate::simulator::time::SimTime;
use crate::simulator::Simulator;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tick {
    Advanced,
    ReachedEnd,
    Idle,
}

pub(super) fn run<T: SimTime>(simulator: &Simulator<T>) {
    while tick(simulator, true) == Tick::Advanced {
        simulator.check_stopping_condition();
    }
}

/// One time step, regardless of the run-until time.
pub(super) fn step<T: SimTime>(simulator: &Simulator<T>) -> Flow {
    if tick(simulator, false) == Tick::Advanced {
        simulator.check_stopping_condition();
    }
    Flow::Continue
}

/// Advance the clock by one time step. Steps are exact; only the last one
/// is shortened so the clock lands on the replication end.
fn tick<T: SimTime>(simulator: &Simulator<T>, bounded: bool) -> Tick {
    let tick = simulator.with_core(|core| {
        if core.run_state != RunState::Started {
            return Tick::Idle;
        }
        let (Some(step), Some(replication)) = (core.run_loop.time_step(), core.replication.as_ref())
        else {
            return Tick::Idle;
        };
        if bounded && !(core.simulator_time < core.run_until_time) {
            return Tick::Idle;
        }
        let (end, warmup) = (replication.end_time(), replication.warmup_time());
        // A warmup at or before the current time belongs before this step.
        if !core.warmed_up && warmup <= core.simulator_time {
            core.warmed_up = true;
            simulator.fire(SimulatorEvent::Warmup(warmup));
        }
        let mut next = core.simulator_time.plus(step);
        let reached_end = next >= end;
        if reached_end {
            next = end;
        }
        core.advance_to(simulator, next);
        if !core.warmed_up && next >= warmup {
            core.warmed_up = true;
            simulator.fire(SimulatorEvent::Warmup(warmup));
        }
        if reached_end { Tick::ReachedEnd } else { Tick::Advanced }
    });
    if tick == Tick::ReachedEnd {
        if let Err(e) = simulator.end_replication() {
            tracing::warn!("Could not end replication of '{}': {}", simulator.id(), e);
        }
    }
    tick
}
