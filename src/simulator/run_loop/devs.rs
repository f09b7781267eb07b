use crate::simulator::error_strategy::Flow;
use crate::simulator::run_loop::{Next, execute, pop_next, should_exit};
use crate::simulator::state::RunState;
use crate::simulator::time::SimTime;
use crate::simulator::Simulator;

pub(super) fn run<T: SimTime>(simulator: &Simulator<T>) {
    loop {
        match pop_next(simulator, None, true) {
            Next::Event(event) => {
                if should_exit(simulator, execute(simulator, event)) {
                    break;
                }
            }
            Next::Exhausted => {
                reach_run_until(simulator);
                break;
            }
            Next::Stopped => break,
        }
    }
}

/// The next event lies past the run-until time: the clock still moves up
/// to the run-until time so the caller resumes from there.
fn reach_run_until<T: SimTime>(simulator: &Simulator<T>) {
    simulator.with_core(|core| {
        if core.run_state != RunState::Started || core.event_list.is_empty() {
            return;
        }
        let until = core.run_until_time;
        core.advance_to(simulator, until);
    });
}

pub(super) fn step<T: SimTime>(simulator: &Simulator<T>) -> Flow {
    let event = simulator.with_core(|core| {
        let event = core.event_list.remove_first().ok()?;
        core.advance_to(simulator, event.time());
        Some(event)
    });
    match event {
        Some(event) => execute(simulator, event),
        None => {
            tracing::debug!("Step of '{}' found no pending event", simulator.id());
            Flow::Continue
        }
    }
}
