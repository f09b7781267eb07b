use std::time::Duration;

use crate::simulator::error_strategy::Flow;
use crate::simulator::run_loop::{Next, RunLoop, execute, pop_next, should_exit};
use crate::simulator::state::RunState;
use crate::simulator::time::{SimTime, earlier};
use crate::simulator::Simulator;

pub(super) fn run<T: SimTime>(simulator: &Simulator<T>) {
    loop {
        if should_exit(simulator, window(simulator, true)) {
            break;
        }
        pace(simulator);
    }
}

pub(super) fn step<T: SimTime>(simulator: &Simulator<T>) -> Flow {
    window(simulator, false)
}

/// Run one time-step window: every event due inside it, then move the
/// clock to the window boundary. `bounded` applies the run-until limit.
fn window<T: SimTime>(simulator: &Simulator<T>, bounded: bool) -> Flow {
    let boundary = simulator.with_core(|core| {
        if core.run_state != RunState::Started {
            return None;
        }
        if bounded && !(core.simulator_time < core.run_until_time) {
            return None;
        }
        let step = core.run_loop.time_step()?;
        let boundary = earlier(core.simulator_time.plus(step), core.end_time()?);
        (boundary > core.simulator_time).then_some(boundary)
    });
    let Some(boundary) = boundary else {
        return Flow::Halt;
    };

    loop {
        match pop_next(simulator, Some(boundary), bounded) {
            Next::Event(event) => match execute(simulator, event) {
                Flow::Continue => {}
                other => return other,
            },
            Next::Exhausted => break,
            Next::Stopped => return Flow::Halt,
        }
    }

    simulator.with_core(|core| {
        if core.run_state != RunState::Started {
            return Flow::Halt;
        }
        let target = if bounded {
            earlier(boundary, core.run_until_time)
        } else {
            boundary
        };
        core.advance_to(simulator, target);
        if bounded && !(core.simulator_time < core.run_until_time) {
            Flow::Halt
        } else {
            Flow::Continue
        }
    })
}

/// Animated hybrids pause between windows. The pause ends early on stop.
fn pace<T: SimTime>(simulator: &Simulator<T>) {
    if !matches!(simulator.run_loop(), RunLoop::Hybrid { animated: true, .. }) {
        return;
    }
    let delay = simulator.animation_delay();
    if delay > 0 && simulator.is_started() {
        simulator.nap(Duration::from_millis(delay));
    }
}
