//! Discrete-event simulation kernel.
//!
//! A [`Simulator`] owns a clock and a time-ordered event list and executes
//! events on a dedicated worker thread. Four run loops are provided:
//! pure discrete-event (DEVS), fixed-step (DESS), a hybrid of both, and a
//! discrete-event loop paced against the wall clock.
//!
//! ```no_run
//! use evsim_rs::{Action, Priority, Replication, Simulator, EventResult};
//!
//! let simulator = Simulator::<f64>::devs("demo");
//! let replication = Replication::new("rep", 0.0, 0.0, 100.0)?;
//! let mut model = |sim: &Simulator<f64>| -> EventResult {
//!     sim.schedule_event_abs(5.0, Priority::NORMAL, Action::closure(|sim| {
//!         println!("fired at {}", sim.simulator_time());
//!         Ok(())
//!     }))?;
//!     Ok(())
//! };
//! simulator.initialize(&mut model, replication)?;
//! simulator.start()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod simulator;

pub use error::{EventError, EventResult, SimulatorError, SimulatorResult};
pub use simulator::{
    Action, ErrorStrategy, EventHandle, EventId, EventList, EventTarget, LogLevel, Model,
    Priority, RealTimeClock, Replication, ReplicationState, RunLoop, RunState, SimEvent, SimTime,
    Simulator, SimulatorEvent, StoppingCondition,
};
