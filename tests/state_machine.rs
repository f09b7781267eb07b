mod common;

use std::sync::Arc;

use common::*;
use crossbeam_channel::{Receiver, bounded};
use evsim_rs::{
    Action, EventResult, Priority, Replication, ReplicationState, RunState, Simulator,
    SimulatorError, SimulatorEvent,
};

fn replication() -> Replication<f64> {
    Replication::new("states", 0.0, 0.0, 100.0).unwrap()
}

fn idle_model() -> impl FnMut(&Simulator<f64>) -> EventResult {
    |_: &Simulator<f64>| Ok(())
}

/// Schedules an event at `at` that blocks until the returned sender is
/// used (or dropped).
fn gated_event(simulator: &Simulator<f64>, at: f64) -> crossbeam_channel::Sender<()> {
    let (release, gate): (_, Receiver<()>) = bounded(1);
    simulator
        .schedule_event_abs(
            at,
            Priority::NORMAL,
            Action::closure(move |_| {
                let _ = gate.recv();
                Ok(())
            }),
        )
        .unwrap();
    release
}

#[test]
fn test_fresh_simulator_is_not_initialized() {
    let simulator = Simulator::<f64>::devs("fresh");
    assert_eq!(simulator.id(), "fresh");
    assert_eq!(simulator.run_state(), RunState::NotInitialized);
    assert_eq!(simulator.replication_state(), ReplicationState::NotInitialized);
    assert!(!simulator.is_starting_or_running());

    assert!(matches!(simulator.start(), Err(SimulatorError::IllegalState(_))));
    assert!(matches!(simulator.step(), Err(SimulatorError::IllegalState(_))));
    assert!(matches!(simulator.stop(), Err(SimulatorError::IllegalState(_))));
    assert!(matches!(simulator.end_replication(), Err(SimulatorError::IllegalState(_))));
}

#[test]
fn test_initialize_resets_clock_and_states() {
    let simulator = Simulator::<f64>::devs("init");
    let rx = simulator.subscribe();
    let mut model = idle_model();
    simulator
        .initialize(&mut model, Replication::new("late", 25.0, 5.0, 50.0).unwrap())
        .unwrap();

    assert_eq!(simulator.simulator_time(), 25.0);
    assert_eq!(simulator.run_state(), RunState::Initialized);
    assert_eq!(simulator.replication_state(), ReplicationState::Initialized);
    assert_eq!(simulator.run_until(), (75.0, true));
    // warmup and end-of-replication markers
    assert_eq!(simulator.pending_events(), 2);
    // initialize itself is silent
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_stop_when_not_running_is_rejected() {
    let simulator = Simulator::<f64>::devs("not-running");
    let mut model = idle_model();
    simulator.initialize(&mut model, replication()).unwrap();
    let err = simulator.stop().unwrap_err();
    assert!(err.to_string().contains("not running"));
}

#[test]
fn test_run_until_before_now_is_rejected() {
    let simulator = Simulator::<f64>::devs("backwards");
    let mut model = idle_model();
    simulator
        .initialize(&mut model, Replication::new("late", 10.0, 0.0, 10.0).unwrap())
        .unwrap();
    assert!(matches!(simulator.run_up_to(5.0), Err(SimulatorError::IllegalState(_))));
    assert_eq!(simulator.run_state(), RunState::Initialized);
}

#[test]
fn test_running_simulator_rejects_lifecycle_calls() {
    let simulator = Simulator::<f64>::devs("busy");
    let release = Arc::new(parking_lot::Mutex::new(None));
    let model_release = Arc::clone(&release);
    let mut model = |sim: &Simulator<f64>| -> EventResult {
        *model_release.lock() = Some(gated_event(sim, 1.0));
        Ok(())
    };
    simulator.initialize(&mut model, replication()).unwrap();
    let rx = simulator.subscribe();
    simulator.start().unwrap();
    eventually(|| simulator.simulator_time() == 1.0);

    assert!(simulator.is_starting_or_running());
    assert!(simulator.start().is_err());
    assert!(simulator.step().is_err());
    let mut other = idle_model();
    assert!(simulator.initialize(&mut other, replication()).is_err());

    simulator.stop().unwrap();
    assert_eq!(simulator.run_state(), RunState::Stopping);
    assert!(simulator.stop().is_err());
    drop(release.lock().take());

    let events = wait_for_stop(&rx);
    assert!(events.contains(&SimulatorEvent::Stopping));
    assert_eq!(simulator.run_state(), RunState::Stopped);
    assert_eq!(simulator.replication_state(), ReplicationState::Started);
    // end-of-replication marker still pending
    assert_eq!(simulator.pending_events(), 1);
}

#[test]
fn test_schedule_from_another_thread_while_running() {
    let simulator = Simulator::<f64>::devs("cross-thread");
    let release = Arc::new(parking_lot::Mutex::new(None));
    let model_release = Arc::clone(&release);
    let mut model = |sim: &Simulator<f64>| -> EventResult {
        *model_release.lock() = Some(gated_event(sim, 1.0));
        Ok(())
    };
    simulator.initialize(&mut model, replication()).unwrap();
    let rx = simulator.subscribe();
    simulator.run_up_to(10.0).unwrap();
    eventually(|| simulator.simulator_time() == 1.0);

    let fired = log();
    let other = simulator.clone();
    let other_log = Arc::clone(&fired);
    std::thread::spawn(move || record_at(&other, 5.0, &other_log).unwrap())
        .join()
        .unwrap();
    drop(release.lock().take());

    wait_for_stop(&rx);
    assert_eq!(*fired.lock(), vec![5.0]);
    assert_eq!(simulator.simulator_time(), 10.0);
}

#[test]
fn test_end_replication_while_idle_forces_end_time() {
    let simulator = Simulator::<f64>::devs("idle-end");
    let mut model = idle_model();
    simulator.initialize(&mut model, replication()).unwrap();
    let rx = simulator.subscribe();

    simulator.end_replication().unwrap();

    assert_eq!(simulator.simulator_time(), 100.0);
    assert_eq!(simulator.run_state(), RunState::Ended);
    assert_eq!(simulator.replication_state(), ReplicationState::Ended);
    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            SimulatorEvent::TimeChanged(100.0),
            SimulatorEvent::EndReplication(100.0)
        ]
    );
    assert!(simulator.end_replication().is_err());
    assert!(simulator.start().is_err());
}

#[test]
fn test_end_replication_while_running_does_not_block() {
    let simulator = Simulator::<f64>::devs("running-end");
    let release = Arc::new(parking_lot::Mutex::new(None));
    let model_release = Arc::clone(&release);
    let mut model = |sim: &Simulator<f64>| -> EventResult {
        *model_release.lock() = Some(gated_event(sim, 1.0));
        Ok(())
    };
    simulator.initialize(&mut model, replication()).unwrap();
    let rx = simulator.subscribe();
    simulator.start().unwrap();
    eventually(|| simulator.simulator_time() == 1.0);

    simulator.end_replication().unwrap();
    assert_eq!(simulator.replication_state(), ReplicationState::Ending);
    assert_eq!(simulator.run_state(), RunState::Stopping);
    drop(release.lock().take());

    wait_for(&rx, |e| *e == SimulatorEvent::EndReplication(100.0));
    assert_eq!(simulator.run_state(), RunState::Ended);
    assert_eq!(simulator.replication_state(), ReplicationState::Ended);
}

#[test]
fn test_clean_up_resets_and_detaches_listeners() {
    let simulator = Simulator::<f64>::devs("cleanup");
    let mut model = |sim: &Simulator<f64>| -> EventResult { repeating(sim, 1.0, 1.0, log()) };
    simulator.initialize(&mut model, replication()).unwrap();
    let rx = simulator.subscribe();
    simulator.run_up_to(50.0).unwrap();
    wait_for_stop(&rx);

    simulator.clean_up();
    assert_eq!(simulator.run_state(), RunState::NotInitialized);
    assert_eq!(simulator.replication_state(), ReplicationState::NotInitialized);
    assert!(simulator.replication().is_none());
    // all senders are gone once the buffer is drained
    while rx.try_recv().is_ok() {}
    assert!(rx.recv().is_err());

    // A cleaned-up simulator can be initialized and run again.
    let fired = log();
    let model_log = Arc::clone(&fired);
    let mut model = |sim: &Simulator<f64>| -> EventResult { record_at(sim, 3.0, &model_log) };
    simulator.initialize(&mut model, replication()).unwrap();
    let rx = simulator.subscribe();
    simulator.start().unwrap();
    wait_for(&rx, |e| matches!(e, SimulatorEvent::EndReplication(_)));
    assert_eq!(*fired.lock(), vec![3.0]);
}

#[test]
fn test_clean_up_stops_a_running_loop() {
    let simulator = Simulator::<f64>::devs("cleanup-running");
    let mut model = |sim: &Simulator<f64>| -> EventResult { repeating(sim, 0.0, 0.001, log()) };
    simulator.initialize(&mut model, replication()).unwrap();
    simulator.start().unwrap();
    simulator.clean_up();
    assert_eq!(simulator.run_state(), RunState::NotInitialized);
    assert!(simulator.event_list().is_empty());
}

#[test]
fn test_with_semaphore_is_reentrant() {
    let simulator = Simulator::<f64>::devs("semaphore");
    let mut model = idle_model();
    simulator.initialize(&mut model, replication()).unwrap();
    let pending = simulator.with_semaphore(|| {
        record_at(&simulator, 4.0, &log()).unwrap();
        simulator.with_semaphore(|| simulator.pending_events())
    });
    assert_eq!(pending, 3);
}

#[test]
fn test_start_inside_with_semaphore_does_not_wait() {
    let simulator = Simulator::<f64>::devs("start-locked");
    let fired = log();
    let model_log = Arc::clone(&fired);
    let mut model = |sim: &Simulator<f64>| -> EventResult { record_at(sim, 2.0, &model_log) };
    simulator.initialize(&mut model, replication()).unwrap();
    let rx = simulator.subscribe();

    let began = std::time::Instant::now();
    simulator.with_semaphore(|| {
        simulator.start().unwrap();
        // the worker is held off until the semaphore is released
        assert_eq!(simulator.run_state(), RunState::Starting);
    });
    assert!(began.elapsed() < std::time::Duration::from_millis(500));

    wait_for(&rx, |e| matches!(e, SimulatorEvent::EndReplication(_)));
    assert_eq!(*fired.lock(), vec![2.0]);
}
