// Shared helpers for the simulator integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use evsim_rs::{Action, EventResult, Priority, SimTime, Simulator, SimulatorEvent};
use parking_lot::Mutex;

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub type Log = Arc<Mutex<Vec<f64>>>;

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// Collects notifications until STOP arrives. Panics on timeout.
pub fn wait_for_stop<T: SimTime>(rx: &Receiver<SimulatorEvent<T>>) -> Vec<SimulatorEvent<T>> {
    let deadline = Instant::now() + TIMEOUT;
    let mut seen = Vec::new();
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(left) {
            Ok(event) => {
                let stop = event == SimulatorEvent::Stop;
                seen.push(event);
                if stop {
                    return seen;
                }
            }
            Err(_) => break,
        }
    }
    panic!("simulator did not stop; saw {:?}", seen);
}

/// Collects notifications until the first one matching `pred`.
pub fn wait_for<T: SimTime>(
    rx: &Receiver<SimulatorEvent<T>>,
    pred: impl Fn(&SimulatorEvent<T>) -> bool,
) -> Vec<SimulatorEvent<T>> {
    let deadline = Instant::now() + TIMEOUT;
    let mut seen = Vec::new();
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(left) {
            Ok(event) => {
                let hit = pred(&event);
                seen.push(event);
                if hit {
                    return seen;
                }
            }
            Err(_) => break,
        }
    }
    panic!("expected notification never arrived; saw {:?}", seen);
}

/// Polls `cond` until it holds. Panics on timeout.
pub fn eventually(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("condition not reached within {:?}", TIMEOUT);
}

/// Lifecycle notifications only, dropping clock and list chatter.
pub fn lifecycle<T: SimTime>(events: &[SimulatorEvent<T>]) -> Vec<SimulatorEvent<T>> {
    events
        .iter()
        .filter(|e| {
            matches!(
                e,
                SimulatorEvent::Starting
                    | SimulatorEvent::Start
                    | SimulatorEvent::Stopping
                    | SimulatorEvent::Stop
                    | SimulatorEvent::StartReplication(_)
                    | SimulatorEvent::EndReplication(_)
            )
        })
        .cloned()
        .collect()
}

pub fn time_changes<T: SimTime>(events: &[SimulatorEvent<T>]) -> Vec<T> {
    events
        .iter()
        .filter_map(|e| match e {
            SimulatorEvent::TimeChanged(t) => Some(*t),
            _ => None,
        })
        .collect()
}

/// Event at `at` that records its execution time and reschedules itself
/// `every` later.
pub fn repeating(simulator: &Simulator<f64>, at: f64, every: f64, log: Log) -> EventResult {
    simulator.schedule_event_abs(
        at,
        Priority::NORMAL,
        Action::closure(move |sim| {
            let now = sim.simulator_time();
            log.lock().push(now);
            repeating(sim, now + every, every, log)
        }),
    )?;
    Ok(())
}

/// Event at `at` that records its execution time.
pub fn record_at(simulator: &Simulator<f64>, at: f64, log: &Log) -> EventResult {
    let log = Arc::clone(log);
    simulator.schedule_event_abs(
        at,
        Priority::NORMAL,
        Action::closure(move |sim| {
            log.lock().push(sim.simulator_time());
            Ok(())
        }),
    )?;
    Ok(())
}

pub fn failing_at(simulator: &Simulator<f64>, at: f64) -> EventResult {
    simulator.schedule_event_abs(
        at,
        Priority::NORMAL,
        Action::closure(|_| Err("deliberate failure".into())),
    )?;
    Ok(())
}
