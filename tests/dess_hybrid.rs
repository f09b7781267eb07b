mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use evsim_rs::{
    EventResult, Replication, ReplicationState, RunLoop, RunState, Simulator, SimulatorError,
    SimulatorEvent,
};

fn idle(_: &Simulator<f64>) -> EventResult {
    Ok(())
}

#[test]
fn test_dess_rejects_bad_time_step() {
    assert!(matches!(
        Simulator::<f64>::dess("zero", 0.0),
        Err(SimulatorError::InvalidTimeStep(_))
    ));
    assert!(Simulator::<f64>::hybrid("nan", f64::NAN).is_err());
    let simulator = Simulator::<f64>::dess("ok", 1.0).unwrap();
    assert!(simulator.set_time_step(-2.0).is_err());
    simulator.set_time_step(0.25).unwrap();
    assert_eq!(simulator.time_step(), Some(0.25));
    assert!(Simulator::<f64>::devs("devs").set_time_step(1.0).is_err());
}

#[test]
fn test_dess_steps_to_replication_end() {
    let simulator = Simulator::<f64>::dess("dess", 1.0).unwrap();
    let mut model = idle;
    simulator
        .initialize(&mut model, Replication::new("dess", 0.0, 3.0, 10.0).unwrap())
        .unwrap();
    // no markers for a simulator without events
    assert!(simulator.event_list().is_empty());

    let rx = simulator.subscribe();
    simulator.start().unwrap();
    let events = wait_for(&rx, |e| matches!(e, SimulatorEvent::EndReplication(_)));

    let times = time_changes(&events);
    assert_eq!(times, (1..=10).map(f64::from).collect::<Vec<_>>());
    let warmups: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, SimulatorEvent::Warmup(_)))
        .collect();
    assert_eq!(warmups, vec![&SimulatorEvent::Warmup(3.0)]);
    assert_eq!(simulator.run_state(), RunState::Ended);
    assert_eq!(simulator.replication_state(), ReplicationState::Ended);
}

#[test]
fn test_dess_last_step_lands_on_end() {
    let simulator = Simulator::<f64>::dess("uneven", 4.0).unwrap();
    let mut model = idle;
    simulator
        .initialize(&mut model, Replication::new("uneven", 0.0, 0.0, 10.0).unwrap())
        .unwrap();
    let rx = simulator.subscribe();
    simulator.start().unwrap();
    let events = wait_for(&rx, |e| matches!(e, SimulatorEvent::EndReplication(_)));
    assert_eq!(time_changes(&events), vec![4.0, 8.0, 10.0]);
}

#[test]
fn test_dess_run_up_to_uses_whole_steps() {
    let simulator = Simulator::<f64>::dess("partial", 1.0).unwrap();
    let mut model = idle;
    simulator
        .initialize(&mut model, Replication::new("partial", 0.0, 0.0, 10.0).unwrap())
        .unwrap();
    let rx = simulator.subscribe();
    simulator.run_up_to(4.5).unwrap();
    wait_for_stop(&rx);
    assert_eq!(simulator.simulator_time(), 5.0);
    assert_eq!(simulator.run_state(), RunState::Stopped);
}

#[test]
fn test_dess_step() {
    let simulator = Simulator::<f64>::dess("single", 0.5).unwrap();
    let mut model = idle;
    simulator
        .initialize(&mut model, Replication::new("single", 0.0, 0.0, 10.0).unwrap())
        .unwrap();
    simulator.step().unwrap();
    simulator.step().unwrap();
    assert_eq!(simulator.simulator_time(), 1.0);
    assert_eq!(simulator.run_state(), RunState::Stopped);
}

#[test]
fn test_hybrid_executes_events_at_their_own_time() {
    let simulator = Simulator::<f64>::hybrid("hybrid", 1.0).unwrap();
    let fired = log();
    let model_log = Arc::clone(&fired);
    let mut model = |sim: &Simulator<f64>| -> EventResult {
        record_at(sim, 0.5, &model_log)?;
        record_at(sim, 2.25, &model_log)?;
        record_at(sim, 3.0, &model_log)
    };
    simulator
        .initialize(&mut model, Replication::new("hybrid", 0.0, 0.0, 10.0).unwrap())
        .unwrap();
    let rx = simulator.subscribe();
    simulator.run_up_to(3.0).unwrap();
    let events = wait_for_stop(&rx);

    assert_eq!(*fired.lock(), vec![0.5, 2.25]);
    assert_eq!(time_changes(&events), vec![0.5, 1.0, 2.0, 2.25, 3.0]);
    assert_eq!(simulator.simulator_time(), 3.0);
    assert_eq!(simulator.run_state(), RunState::Stopped);
}

#[test]
fn test_hybrid_runs_to_end() {
    let simulator = Simulator::<f64>::hybrid("hybrid-end", 1.5).unwrap();
    let fired = log();
    let model_log = Arc::clone(&fired);
    let mut model = |sim: &Simulator<f64>| -> EventResult { repeating(sim, 1.0, 2.0, Arc::clone(&model_log)) };
    simulator
        .initialize(&mut model, Replication::new("hybrid", 0.0, 0.0, 10.0).unwrap())
        .unwrap();
    let rx = simulator.subscribe();
    simulator.start().unwrap();
    wait_for(&rx, |e| matches!(e, SimulatorEvent::EndReplication(_)));

    assert_eq!(*fired.lock(), vec![1.0, 3.0, 5.0, 7.0, 9.0]);
    assert_eq!(simulator.simulator_time(), 10.0);
    assert_eq!(simulator.replication_state(), ReplicationState::Ended);
}

#[test]
fn test_hybrid_step_is_one_window() {
    let simulator = Simulator::<f64>::hybrid("window", 2.0).unwrap();
    let fired = log();
    let model_log = Arc::clone(&fired);
    let mut model = |sim: &Simulator<f64>| -> EventResult {
        record_at(sim, 0.5, &model_log)?;
        record_at(sim, 1.5, &model_log)?;
        record_at(sim, 2.5, &model_log)
    };
    simulator
        .initialize(&mut model, Replication::new("window", 0.0, 0.0, 10.0).unwrap())
        .unwrap();
    simulator.step().unwrap();
    assert_eq!(*fired.lock(), vec![0.5, 1.5]);
    assert_eq!(simulator.simulator_time(), 2.0);
}

#[test]
fn test_animated_hybrid_pauses_and_stops_promptly() {
    let simulator = Simulator::<f64>::hybrid_animator("animator", 1.0).unwrap();
    assert!(matches!(
        simulator.run_loop(),
        RunLoop::Hybrid { animated: true, .. }
    ));
    let rx = simulator.subscribe();
    simulator.set_animation_delay(20);
    assert_eq!(rx.try_recv().unwrap(), SimulatorEvent::AnimationDelayChanged(20));

    let mut model = idle;
    simulator
        .initialize(&mut model, Replication::new("anim", 0.0, 0.0, 5.0).unwrap())
        .unwrap();
    let began = Instant::now();
    simulator.start().unwrap();
    let events = wait_for(&rx, |e| matches!(e, SimulatorEvent::EndReplication(_)));
    // four pauses between five windows
    assert!(began.elapsed() >= Duration::from_millis(60));
    assert_eq!(time_changes(&events), vec![1.0, 2.0, 3.0, 4.0, 5.0]);

    // A long delay does not hold up a stop.
    simulator.set_animation_delay(60_000);
    simulator
        .initialize(&mut model, Replication::new("anim", 0.0, 0.0, 5.0).unwrap())
        .unwrap();
    simulator.start().unwrap();
    wait_for(&rx, |e| *e == SimulatorEvent::TimeChanged(1.0));
    let stopping = Instant::now();
    simulator.stop().unwrap();
    wait_for_stop(&rx);
    assert!(stopping.elapsed() < Duration::from_secs(5));
    assert_eq!(simulator.simulator_time(), 1.0);
}

fn warmups(events: &[SimulatorEvent<f64>]) -> Vec<SimulatorEvent<f64>> {
    events
        .iter()
        .filter(|e| matches!(e, SimulatorEvent::Warmup(_)))
        .cloned()
        .collect()
}

#[test]
fn test_dess_zero_warmup_fires_at_start_time() {
    let simulator = Simulator::<f64>::dess("no-warmup", 1.0).unwrap();
    let mut model = idle;
    simulator
        .initialize(&mut model, Replication::new("r", 0.0, 0.0, 5.0).unwrap())
        .unwrap();
    let rx = simulator.subscribe();
    simulator.start().unwrap();
    let events = wait_for(&rx, |e| matches!(e, SimulatorEvent::EndReplication(_)));

    assert_eq!(warmups(&events), vec![SimulatorEvent::Warmup(0.0)]);
    // reported before the first step
    let warmup_at = events.iter().position(|e| *e == SimulatorEvent::Warmup(0.0));
    let first_step = events.iter().position(|e| *e == SimulatorEvent::TimeChanged(1.0));
    assert!(warmup_at < first_step);
}

#[test]
fn test_dess_warmup_between_steps_reports_warmup_time() {
    let simulator = Simulator::<f64>::dess("mid-step", 4.0).unwrap();
    let mut model = idle;
    simulator
        .initialize(&mut model, Replication::new("r", 0.0, 3.0, 10.0).unwrap())
        .unwrap();
    let rx = simulator.subscribe();
    simulator.step().unwrap();
    let events: Vec<_> = rx.try_iter().collect();

    assert_eq!(simulator.simulator_time(), 4.0);
    assert_eq!(warmups(&events), vec![SimulatorEvent::Warmup(3.0)]);

    // once only
    simulator.step().unwrap();
    assert!(warmups(&rx.try_iter().collect::<Vec<_>>()).is_empty());
}
