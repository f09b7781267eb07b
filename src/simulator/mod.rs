//! The simulator: clock, event list, state machines and the worker thread
//! that drives them.
//!
//! A [`Simulator`] is a cheap handle; clones share one clock and one event
//! list. All mutable state sits behind a reentrant semaphore, so event
//! actions and API callers on other threads can schedule, cancel and read
//! the clock at any time. Event actions always execute outside the
//! semaphore.

pub mod action;
pub mod error_strategy;
pub mod event_queue;
pub mod notify;
pub mod replication;
pub mod run_loop;
pub mod state;
pub mod time;
mod worker;

use std::cell::RefCell;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, ReentrantMutex};

pub use action::{Action, EventTarget};
pub use error_strategy::{ErrorStrategy, LogLevel};
pub use event_queue::{EventHandle, EventId, EventList, Priority, SimEvent};
pub use notify::SimulatorEvent;
pub use replication::{Model, Replication, StoppingCondition};
pub use run_loop::{RealTimeClock, RunLoop};
pub use state::{ReplicationState, RunState};
pub use time::SimTime;

use crate::error::{SimulatorError, SimulatorResult};
use notify::Listeners;
use run_loop::animation::AnimationPump;
use worker::{Wakeup, Worker};

/// How long `start` waits for the worker to pick up the run request.
const START_TIMEOUT: Duration = Duration::from_secs(1);

pub const DEFAULT_ANIMATION_DELAY_MS: u64 = 100;

pub struct Simulator<T: SimTime> {
    shared: Arc<Shared<T>>,
}

impl<T: SimTime> Clone for Simulator<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

pub(crate) struct Shared<T: SimTime> {
    id: String,
    semaphore: ReentrantMutex<RefCell<Core<T>>>,
    listeners: Listeners<T>,
    worker: Mutex<Option<Worker>>,
    wakeup: Wakeup,
    event_error: Mutex<Option<SimulatorError>>,
}

/// State guarded by the semaphore.
pub(crate) struct Core<T: SimTime> {
    pub(crate) simulator_time: T,
    pub(crate) run_until_time: T,
    pub(crate) run_until_including: bool,
    pub(crate) run_state: RunState,
    pub(crate) replication_state: ReplicationState,
    pub(crate) event_list: EventList<T>,
    pub(crate) replication: Option<Replication<T>>,
    pub(crate) run_loop: RunLoop<T>,
    pub(crate) warmed_up: bool,
    pub(crate) events_executed: u64,
    error_strategy: ErrorStrategy,
    error_log_level: LogLevel,
    animation_delay_ms: u64,
    on_initialize: Vec<Action<T>>,
}

impl<T: SimTime> Core<T> {
    /// Whether an event at `time` may run before the loop pauses.
    pub(crate) fn within_run_until(&self, time: T) -> bool {
        if self.run_until_including {
            time <= self.run_until_time
        } else {
            time < self.run_until_time
        }
    }

    pub(crate) fn end_time(&self) -> Option<T> {
        self.replication.as_ref().map(Replication::end_time)
    }

    /// Move the clock forward to `time`. The clock never moves backward.
    pub(crate) fn advance_to(&mut self, simulator: &Simulator<T>, time: T) -> bool {
        if time > self.simulator_time {
            self.simulator_time = time;
            simulator.fire(SimulatorEvent::TimeChanged(time));
            true
        } else {
            false
        }
    }

    fn check_can_run(&self) -> SimulatorResult<()> {
        if self.run_state.is_starting_or_running() {
            return Err(SimulatorError::illegal_state("simulator is already running"));
        }
        if self.run_state == RunState::Stopping {
            return Err(SimulatorError::illegal_state("simulator is still stopping"));
        }
        let Some(replication) = &self.replication else {
            return Err(SimulatorError::illegal_state("no replication attached"));
        };
        if !self.run_state.is_initialized() {
            return Err(SimulatorError::illegal_state(format!(
                "simulator is {}",
                self.run_state
            )));
        }
        if !self.replication_state.is_active() {
            return Err(SimulatorError::illegal_state(format!(
                "replication is {}",
                self.replication_state
            )));
        }
        if !(self.simulator_time < replication.end_time()) {
            return Err(SimulatorError::illegal_state(format!(
                "simulator time {:?} is not before the replication end {:?}",
                self.simulator_time,
                replication.end_time()
            )));
        }
        Ok(())
    }

    /// Marks a run as begun. Returns whether this is the first run of the
    /// replication.
    fn begin_run(&mut self, state: RunState) -> bool {
        let first = self.replication_state == ReplicationState::Initialized;
        if first {
            self.replication_state = ReplicationState::Started;
        }
        self.run_state = state;
        first
    }
}

impl<T: SimTime> Simulator<T> {
    pub fn new(id: impl Into<String>, run_loop: RunLoop<T>) -> SimulatorResult<Self> {
        run_loop.validate()?;
        Ok(Self::build(id.into(), run_loop))
    }

    /// Pure discrete-event simulator.
    pub fn devs(id: impl Into<String>) -> Self {
        Self::build(id.into(), RunLoop::Devs)
    }

    /// Fixed-step continuous simulator. It has no event list of its own
    /// and advances the clock by `time_step` per step.
    pub fn dess(id: impl Into<String>, time_step: T::Relative) -> SimulatorResult<Self> {
        Self::new(id, RunLoop::Dess { time_step })
    }

    /// Discrete events interleaved with fixed clock steps.
    pub fn hybrid(id: impl Into<String>, time_step: T::Relative) -> SimulatorResult<Self> {
        Self::new(
            id,
            RunLoop::Hybrid {
                time_step,
                animated: false,
            },
        )
    }

    /// Hybrid simulator that pauses for the animation delay after every
    /// step so a viewer can keep up.
    pub fn hybrid_animator(id: impl Into<String>, time_step: T::Relative) -> SimulatorResult<Self> {
        Self::new(
            id,
            RunLoop::Hybrid {
                time_step,
                animated: true,
            },
        )
    }

    /// Discrete-event simulator paced against the wall clock.
    pub fn real_time(id: impl Into<String>, clock: RealTimeClock) -> SimulatorResult<Self> {
        Self::new(id, RunLoop::RealTime(clock))
    }

    fn build(id: String, run_loop: RunLoop<T>) -> Self {
        tracing::debug!("Creating {} simulator '{}'", run_loop.name(), id);
        let core = Core {
            simulator_time: T::zero(),
            run_until_time: T::zero(),
            run_until_including: true,
            run_state: RunState::NotInitialized,
            replication_state: ReplicationState::NotInitialized,
            event_list: EventList::new(),
            replication: None,
            run_loop,
            warmed_up: false,
            events_executed: 0,
            error_strategy: ErrorStrategy::default(),
            error_log_level: ErrorStrategy::default().default_log_level(),
            animation_delay_ms: DEFAULT_ANIMATION_DELAY_MS,
            on_initialize: Vec::new(),
        };
        Self {
            shared: Arc::new(Shared {
                id,
                semaphore: ReentrantMutex::new(RefCell::new(core)),
                listeners: Listeners::new(),
                worker: Mutex::new(None),
                wakeup: Wakeup::new(),
                event_error: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn from_weak(shared: &Weak<Shared<T>>) -> Option<Self> {
        shared.upgrade().map(|shared| Self { shared })
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared<T>> {
        Arc::downgrade(&self.shared)
    }

    /// Short critical section over the guarded state. `f` must not call
    /// back into the simulator.
    pub(crate) fn with_core<R>(&self, f: impl FnOnce(&mut Core<T>) -> R) -> R {
        let guard = self.shared.semaphore.lock();
        let mut core = guard.borrow_mut();
        f(&mut core)
    }

    pub(crate) fn fire(&self, event: SimulatorEvent<T>) {
        self.shared.listeners.fire(event);
    }

    pub(crate) fn nap(&self, timeout: Duration) -> bool {
        self.shared.wakeup.nap(timeout)
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    // ---- state queries ----

    pub fn simulator_time(&self) -> T {
        self.with_core(|core| core.simulator_time)
    }

    pub fn run_state(&self) -> RunState {
        self.with_core(|core| core.run_state)
    }

    pub fn replication_state(&self) -> ReplicationState {
        self.with_core(|core| core.replication_state)
    }

    pub fn is_starting_or_running(&self) -> bool {
        self.run_state().is_starting_or_running()
    }

    pub(crate) fn is_started(&self) -> bool {
        self.run_state() == RunState::Started
    }

    pub fn replication(&self) -> Option<Replication<T>> {
        self.with_core(|core| core.replication.clone())
    }

    /// The time the current run pauses at, and whether events scheduled
    /// exactly at it still execute.
    pub fn run_until(&self) -> (T, bool) {
        self.with_core(|core| (core.run_until_time, core.run_until_including))
    }

    /// Events executed since the last `initialize`.
    pub fn events_executed(&self) -> u64 {
        self.with_core(|core| core.events_executed)
    }

    pub fn run_loop(&self) -> RunLoop<T> {
        self.with_core(|core| core.run_loop)
    }

    /// Handles of the pending events in firing order. A snapshot: combine
    /// with [`with_semaphore`](Self::with_semaphore) to keep it current
    /// while acting on it.
    pub fn event_list(&self) -> Vec<EventHandle<T>> {
        self.with_core(|core| core.event_list.handles())
    }

    pub fn pending_events(&self) -> usize {
        self.with_core(|core| core.event_list.len())
    }

    /// Whether `handle` is still waiting to fire.
    pub fn is_scheduled(&self, handle: &EventHandle<T>) -> bool {
        self.with_core(|core| core.event_list.contains(handle))
    }

    /// Run `f` while holding the simulator's semaphore. No other thread
    /// can schedule, cancel or advance the clock until `f` returns; `f`
    /// may itself call any simulator method. A run started inside `f`
    /// begins once `f` returns.
    pub fn with_semaphore<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.shared.semaphore.lock();
        f()
    }

    // ---- listeners ----

    pub fn subscribe(&self) -> Receiver<SimulatorEvent<T>> {
        self.shared.listeners.subscribe()
    }

    // ---- scheduling ----

    pub fn schedule_event(&self, event: SimEvent<T>) -> SimulatorResult<EventHandle<T>> {
        let (handle, real_time) = self.with_core(|core| {
            let now = core.simulator_time;
            core.event_list
                .add(event, now)
                .map(|handle| (handle, core.run_loop.is_real_time()))
        })?;
        self.fire(SimulatorEvent::EventListChanged);
        if real_time {
            self.shared.wakeup.nudge();
        }
        Ok(handle)
    }

    pub fn schedule_event_abs(
        &self,
        time: T,
        priority: Priority,
        action: Action<T>,
    ) -> SimulatorResult<EventHandle<T>> {
        self.schedule_event(SimEvent::new(time, priority, action))
    }

    /// Schedule `action` at `now + delay`. The clock cannot move between
    /// reading `now` and inserting the event.
    pub fn schedule_event_rel(
        &self,
        delay: T::Relative,
        priority: Priority,
        action: Action<T>,
    ) -> SimulatorResult<EventHandle<T>> {
        self.with_semaphore(|| {
            let time = self.simulator_time().plus(delay);
            self.schedule_event_abs(time, priority, action)
        })
    }

    pub fn schedule_event_now(
        &self,
        priority: Priority,
        action: Action<T>,
    ) -> SimulatorResult<EventHandle<T>> {
        self.with_semaphore(|| self.schedule_event_abs(self.simulator_time(), priority, action))
    }

    /// Cancel a pending event. Returns `false` when it already fired or was
    /// cancelled before.
    pub fn cancel_event(&self, handle: &EventHandle<T>) -> bool {
        let (removed, real_time) = self.with_core(|core| {
            (core.event_list.remove(handle), core.run_loop.is_real_time())
        });
        if removed {
            self.fire(SimulatorEvent::EventListChanged);
            if real_time {
                self.shared.wakeup.nudge();
            }
        }
        removed
    }

    /// Queue `action` to execute once at the end of the next `initialize`,
    /// after the model has been constructed.
    pub fn add_scheduled_method_on_initialize(&self, action: Action<T>) {
        self.with_core(|core| core.on_initialize.push(action));
    }

    // ---- lifecycle ----

    /// Attach `replication`, reset the clock to its start time and let
    /// `model` populate the event list.
    pub fn initialize(
        &self,
        model: &mut dyn Model<T>,
        replication: Replication<T>,
    ) -> SimulatorResult<()> {
        self.with_core(|core| {
            if core.run_state.is_starting_or_running() || core.run_state == RunState::Stopping {
                return Err(SimulatorError::illegal_state(format!(
                    "cannot initialize while {}",
                    core.run_state
                )));
            }
            let start = replication.start_time();
            core.simulator_time = start;
            core.run_until_time = replication.end_time();
            core.run_until_including = true;
            core.event_list.clear();
            core.warmed_up = false;
            core.events_executed = 0;
            if core.run_loop.uses_event_list() {
                core.event_list.add(warmup_event(replication.warmup_time()), start)?;
                core.event_list.add(end_event(replication.end_time()), start)?;
            }
            tracing::info!(
                "Initializing simulator '{}' with replication '{}' ({}) from {:?} to {:?}",
                self.shared.id,
                replication.context(),
                replication.id(),
                start,
                replication.end_time()
            );
            core.replication = Some(replication);
            core.run_state = RunState::Initialized;
            core.replication_state = ReplicationState::Initialized;
            Ok(())
        })?;
        self.shared.event_error.lock().take();
        self.ensure_worker()?;

        if let Err(e) = model.construct_model(self) {
            tracing::error!("Model construction for '{}' failed: {}", self.shared.id, e);
            self.detach_replication();
            return Err(SimulatorError::ModelConstruction(e));
        }

        let pending = self.with_core(|core| std::mem::take(&mut core.on_initialize));
        for action in pending {
            if let Err(e) = action.execute(self) {
                self.detach_replication();
                return Err(SimulatorError::ModelConstruction(e));
            }
        }
        Ok(())
    }

    /// Run until the end of the replication. Returns once the worker has
    /// picked the run up; the loop continues on the worker thread.
    pub fn start(&self) -> SimulatorResult<()> {
        let end = self
            .with_core(|core| core.end_time())
            .ok_or_else(|| SimulatorError::illegal_state("no replication attached"))?;
        self.start_impl(end, true)
    }

    /// Run until `time`, leaving events scheduled exactly at `time` pending.
    pub fn run_up_to(&self, time: T) -> SimulatorResult<()> {
        self.start_impl(time, false)
    }

    /// Run until `time`, executing events scheduled exactly at `time`.
    pub fn run_up_to_and_including(&self, time: T) -> SimulatorResult<()> {
        self.start_impl(time, true)
    }

    fn start_impl(&self, run_until: T, including: bool) -> SimulatorResult<()> {
        if !run_until.is_valid() {
            return Err(SimulatorError::InvalidEventTime(format!("{:?}", run_until)));
        }
        let (first, now) = self.with_core(|core| {
            core.check_can_run()?;
            if run_until < core.simulator_time {
                return Err(SimulatorError::illegal_state(format!(
                    "run-until time {:?} lies before the current time {:?}",
                    run_until, core.simulator_time
                )));
            }
            core.run_until_time = run_until;
            core.run_until_including = including;
            Ok((core.begin_run(RunState::Starting), core.simulator_time))
        })?;
        if first {
            self.fire(SimulatorEvent::StartReplication(now));
        }
        self.fire(SimulatorEvent::Starting);
        tracing::info!(
            "Starting simulator '{}' at {:?} until {:?}{}",
            self.shared.id,
            now,
            run_until,
            if including { " (inclusive)" } else { "" }
        );

        // Under the caller's semaphore the worker cannot pick the run up
        // until the caller lets go, so there is nothing to wait for.
        let held = self.shared.semaphore.is_owned_by_current_thread();
        let link = self.shared.worker.lock().as_ref().map(Worker::link);
        let requested = match link {
            Some(link) if held => link.send_run().map(|()| true),
            Some(link) => link.request_run(START_TIMEOUT),
            None => Err(SimulatorError::Worker("no worker thread".to_string())),
        };
        match requested {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(
                    "Worker of '{}' did not acknowledge the start within {:?}",
                    self.shared.id,
                    START_TIMEOUT
                );
                Ok(())
            }
            Err(e) => {
                self.with_core(|core| core.run_state = RunState::Stopped);
                Err(e)
            }
        }
    }

    /// Execute a single unit of work on the calling thread: one event, or
    /// one clock step for time-stepped simulators.
    pub fn step(&self) -> SimulatorResult<()> {
        let (first, now) = self.with_core(|core| {
            core.check_can_run()?;
            Ok::<_, SimulatorError>((core.begin_run(RunState::Started), core.simulator_time))
        })?;
        if first {
            self.fire(SimulatorEvent::StartReplication(now));
        }
        self.fire(SimulatorEvent::Start);
        let result = run_loop::step(self);
        self.finish_run();
        result
    }

    /// Ask a running simulator to stop. The loop stops at its next safe
    /// point; the call does not wait for it.
    pub fn stop(&self) -> SimulatorResult<()> {
        self.with_core(|core| match core.run_state {
            RunState::Starting | RunState::Started => {
                core.run_state = RunState::Stopping;
                Ok(())
            }
            state if state.is_stopping_or_stopped() => Err(SimulatorError::illegal_state(
                "simulator is already stopping or stopped",
            )),
            state => Err(SimulatorError::illegal_state(format!(
                "simulator is not running ({})",
                state
            ))),
        })?;
        tracing::info!("Stop requested for simulator '{}'", self.shared.id);
        self.fire(SimulatorEvent::Stopping);
        self.shared.wakeup.nudge();
        Ok(())
    }

    /// End the replication now. When called before the replication's end
    /// time the clock is forced forward to it. Never blocks.
    pub fn end_replication(&self) -> SimulatorResult<()> {
        let (clamped, was_running, loop_active) = self.with_core(|core| {
            let Some(end) = core.end_time() else {
                return Err(SimulatorError::illegal_state("no replication attached"));
            };
            if !core.replication_state.is_active() {
                return Err(SimulatorError::illegal_state(format!(
                    "replication is {}",
                    core.replication_state
                )));
            }
            core.replication_state = ReplicationState::Ending;
            let clamped = if core.simulator_time < end {
                tracing::warn!(
                    "Replication of '{}' ended at {:?}, before its end time {:?}; clock set to end time",
                    self.shared.id,
                    core.simulator_time,
                    end
                );
                core.simulator_time = end;
                Some(end)
            } else {
                None
            };
            let was_running = core.run_state.is_starting_or_running();
            if was_running {
                core.run_state = RunState::Stopping;
            }
            Ok((clamped, was_running, core.run_state == RunState::Stopping))
        })?;
        if let Some(end) = clamped {
            self.fire(SimulatorEvent::TimeChanged(end));
        }
        if was_running {
            self.fire(SimulatorEvent::Stopping);
            self.shared.wakeup.nudge();
        }
        if !loop_active {
            let time = self.with_core(|core| {
                core.replication_state = ReplicationState::Ended;
                core.run_state = RunState::Ended;
                core.simulator_time
            });
            tracing::info!("Replication of '{}' ended at {:?}", self.shared.id, time);
            self.fire(SimulatorEvent::EndReplication(time));
        }
        Ok(())
    }

    /// Stop if needed, detach every listener, terminate the worker thread
    /// and return both state machines to NOT_INITIALIZED.
    pub fn clean_up(&self) {
        let was_running = self.with_core(|core| {
            let running = core.run_state.is_starting_or_running();
            if running {
                core.run_state = RunState::Stopping;
            }
            running
        });
        if was_running {
            self.fire(SimulatorEvent::Stopping);
            self.shared.wakeup.nudge();
        }
        let worker = self.shared.worker.lock().take();
        drop(worker);
        self.shared.listeners.clear();
        self.detach_replication();
        tracing::info!("Simulator '{}' cleaned up", self.shared.id);
    }

    // ---- error policy ----

    /// Set the strategy and its default log level.
    pub fn set_error_strategy(&self, strategy: ErrorStrategy) {
        self.set_error_strategy_with_level(strategy, strategy.default_log_level());
    }

    pub fn set_error_strategy_with_level(&self, strategy: ErrorStrategy, level: LogLevel) {
        self.with_core(|core| {
            core.error_strategy = strategy;
            core.error_log_level = level;
        });
    }

    pub fn set_error_log_level(&self, level: LogLevel) {
        self.with_core(|core| core.error_log_level = level);
    }

    pub fn error_strategy(&self) -> ErrorStrategy {
        self.with_core(|core| core.error_strategy)
    }

    pub fn error_log_level(&self) -> LogLevel {
        self.with_core(|core| core.error_log_level)
    }

    /// Failure captured by [`ErrorStrategy::WarnAndThrow`] while the worker
    /// thread was running. Cleared on read and on `initialize`.
    pub fn take_event_error(&self) -> Option<SimulatorError> {
        self.shared.event_error.lock().take()
    }

    pub(crate) fn error_policy(&self) -> (ErrorStrategy, LogLevel) {
        self.with_core(|core| (core.error_strategy, core.error_log_level))
    }

    pub(crate) fn record_event_error(&self, error: SimulatorError) {
        *self.shared.event_error.lock() = Some(error);
    }

    /// Stop the loop after a failed event, leaving clock and list intact.
    pub(crate) fn pause_after_failure(&self) {
        let paused = self.with_core(|core| {
            if core.run_state == RunState::Started {
                core.run_state = RunState::Stopping;
                true
            } else {
                false
            }
        });
        if paused {
            self.fire(SimulatorEvent::Stopping);
        }
    }

    // ---- flavor parameters ----

    pub fn time_step(&self) -> Option<T::Relative> {
        self.with_core(|core| core.run_loop.time_step())
    }

    pub fn set_time_step(&self, step: T::Relative) -> SimulatorResult<()> {
        run_loop::validate_time_step::<T>(step)?;
        self.with_core(|core| match &mut core.run_loop {
            RunLoop::Dess { time_step } | RunLoop::Hybrid { time_step, .. } => {
                *time_step = step;
                Ok(())
            }
            other => Err(SimulatorError::illegal_state(format!(
                "{} simulator has no time step",
                other.name()
            ))),
        })
    }

    pub fn real_time_clock(&self) -> Option<RealTimeClock> {
        self.with_core(|core| match core.run_loop {
            RunLoop::RealTime(clock) => Some(clock),
            _ => None,
        })
    }

    pub fn speed_factor(&self) -> Option<f64> {
        self.real_time_clock().map(|clock| clock.speed_factor)
    }

    /// Change the real-time speed factor. A running loop re-baselines from
    /// the current simulation time; the clock never jumps.
    pub fn set_speed_factor(&self, factor: f64) -> SimulatorResult<()> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(SimulatorError::InvalidSpeedFactor(factor));
        }
        self.update_real_time_clock(|clock| clock.speed_factor = factor)?;
        tracing::debug!("Speed factor of '{}' set to {}", self.shared.id, factor);
        self.fire(SimulatorEvent::ChangeSpeedFactor(factor));
        Ok(())
    }

    pub fn set_catchup(&self, catchup: bool) -> SimulatorResult<()> {
        self.update_real_time_clock(|clock| clock.catchup = catchup)
    }

    /// Wall-clock interval at which a waiting real-time loop advances the
    /// clock. Clamped to at least 1 ms.
    pub fn set_update_msec(&self, update_msec: u64) -> SimulatorResult<()> {
        self.update_real_time_clock(|clock| clock.update_msec = update_msec.max(1))
    }

    fn update_real_time_clock(&self, f: impl FnOnce(&mut RealTimeClock)) -> SimulatorResult<()> {
        self.with_core(|core| match &mut core.run_loop {
            RunLoop::RealTime(clock) => {
                f(clock);
                Ok(())
            }
            other => Err(SimulatorError::illegal_state(format!(
                "{} simulator is not paced in real time",
                other.name()
            ))),
        })?;
        self.shared.wakeup.nudge();
        Ok(())
    }

    pub fn animation_delay(&self) -> u64 {
        self.with_core(|core| core.animation_delay_ms)
    }

    pub fn set_animation_delay(&self, delay_ms: u64) {
        self.with_core(|core| core.animation_delay_ms = delay_ms);
        self.fire(SimulatorEvent::AnimationDelayChanged(delay_ms));
    }

    // ---- run loop plumbing ----

    fn ensure_worker(&self) -> SimulatorResult<()> {
        let mut worker = self.shared.worker.lock();
        if worker.is_none() {
            *worker = Some(Worker::spawn(
                format!("{}-worker", self.shared.id),
                self.downgrade(),
            )?);
        }
        Ok(())
    }

    fn detach_replication(&self) {
        self.with_core(|core| {
            core.run_state = RunState::NotInitialized;
            core.replication_state = ReplicationState::NotInitialized;
            core.replication = None;
            core.event_list.clear();
        });
    }

    /// Body of one run on the worker thread.
    pub(crate) fn run_on_worker(&self, started: &Sender<()>) {
        self.shared.wakeup.clear();
        let picked_up = self.with_core(|core| {
            if core.run_state == RunState::Starting {
                core.run_state = RunState::Started;
                true
            } else {
                false
            }
        });
        if !picked_up {
            let _ = started.try_send(());
            self.finish_run();
            return;
        }
        self.fire(SimulatorEvent::Start);
        let _ = started.try_send(());
        tracing::debug!(
            "Run loop of '{}' started at {:?}",
            self.shared.id,
            self.simulator_time()
        );

        let pump = if self.run_loop().is_animated() {
            AnimationPump::start(self)
                .map_err(|e| tracing::warn!("No animation for '{}': {}", self.shared.id, e))
                .ok()
        } else {
            None
        };
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run_loop::run(self)));
        drop(pump);
        if outcome.is_err() {
            tracing::error!("Run loop of '{}' panicked; treating it as stopped", self.shared.id);
        }
        self.finish_run();
    }

    /// Leave the running states once the loop has exited.
    pub(crate) fn finish_run(&self) {
        let outcome = self.with_core(|core| {
            if !matches!(
                core.run_state,
                RunState::Starting | RunState::Started | RunState::Stopping
            ) {
                return None;
            }
            if core.replication_state == ReplicationState::Ending {
                core.replication_state = ReplicationState::Ended;
                core.run_state = RunState::Ended;
                Some((true, core.simulator_time))
            } else {
                core.run_state = RunState::Stopped;
                Some((false, core.simulator_time))
            }
        });
        let Some((ended, time)) = outcome else {
            return;
        };
        tracing::debug!("Run loop of '{}' stopped at {:?}", self.shared.id, time);
        self.fire(SimulatorEvent::Stop);
        if ended {
            tracing::info!("Replication of '{}' ended at {:?}", self.shared.id, time);
            self.fire(SimulatorEvent::EndReplication(time));
        }
    }

    /// Ends the replication once its stopping condition holds.
    pub(crate) fn check_stopping_condition(&self) {
        let condition = self.with_core(|core| {
            if core.replication_state != ReplicationState::Started {
                return None;
            }
            core.replication
                .as_ref()
                .and_then(Replication::stopping_condition)
        });
        let Some(condition) = condition else {
            return;
        };
        if condition(self) {
            tracing::info!(
                "Stopping condition of '{}' met at {:?}",
                self.shared.id,
                self.simulator_time()
            );
            if let Err(e) = self.end_replication() {
                tracing::warn!("Could not end replication: {}", e);
            }
        }
    }
}

impl<T: SimTime> std::fmt::Debug for Simulator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("id", &self.shared.id)
            .finish_non_exhaustive()
    }
}

fn warmup_event<T: SimTime>(time: T) -> SimEvent<T> {
    SimEvent::new(
        time,
        Priority::WARMUP,
        Action::closure(|simulator: &Simulator<T>| {
            let now = simulator.with_core(|core| {
                core.warmed_up = true;
                core.simulator_time
            });
            tracing::debug!("Warmup of '{}' at {:?}", simulator.id(), now);
            simulator.fire(SimulatorEvent::Warmup(now));
            Ok(())
        }),
    )
}

fn end_event<T: SimTime>(time: T) -> SimEvent<T> {
    SimEvent::new(
        time,
        Priority::END_OF_REPLICATION,
        Action::closure(|simulator: &Simulator<T>| {
            simulator.end_replication()?;
            Ok(())
        }),
    )
}
