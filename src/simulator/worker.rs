//! The dedicated run-loop thread.
//!
//! The worker parks on a command channel. `start` sends it a run command
//! and waits a bounded time for the loop to acknowledge that it has begun;
//! the loop itself runs to completion on the worker and the worker parks
//! again. Dropping the [`Worker`] shuts the thread down.

use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use crate::error::{SimulatorError, SimulatorResult};
use crate::simulator::time::SimTime;
use crate::simulator::{Shared, Simulator};

/// Interruptible sleep shared by the run loop and the API callers that
/// need to cut it short (stop, speed changes, cross-thread scheduling).
pub(crate) struct Wakeup {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Wakeup {
    pub(crate) fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    pub(crate) fn nudge(&self) {
        let _ = self.tx.try_send(());
    }

    /// Sleep for at most `timeout`. Returns `true` when nudged.
    pub(crate) fn nap(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }

    /// Drop a nudge left over from a previous run.
    pub(crate) fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

enum Command {
    Run,
    Shutdown,
}

/// Cloneable sending side of a worker, usable without holding the
/// simulator's worker slot locked.
#[derive(Clone)]
pub(crate) struct WorkerLink {
    commands: Sender<Command>,
    started: Receiver<()>,
}

impl WorkerLink {
    /// Ask the worker to run the loop. Returns whether the loop acknowledged
    /// within `timeout`.
    pub(crate) fn request_run(&self, timeout: Duration) -> SimulatorResult<bool> {
        self.send_run()?;
        Ok(self.started.recv_timeout(timeout).is_ok())
    }

    /// Ask the worker to run the loop without waiting for it to begin.
    pub(crate) fn send_run(&self) -> SimulatorResult<()> {
        while self.started.try_recv().is_ok() {}
        self.commands
            .send(Command::Run)
            .map_err(|_| SimulatorError::Worker("worker thread has exited".to_string()))
    }
}

pub(crate) struct Worker {
    link: WorkerLink,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn<T: SimTime>(name: String, shared: Weak<Shared<T>>) -> SimulatorResult<Self> {
        let (commands, command_rx) = unbounded();
        let (started_tx, started) = bounded(1);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || worker_main(shared, command_rx, started_tx))
            .map_err(|e| SimulatorError::Worker(e.to_string()))?;
        Ok(Self {
            link: WorkerLink { commands, started },
            handle: Some(handle),
        })
    }

    pub(crate) fn link(&self) -> WorkerLink {
        self.link.clone()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.link.commands.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            // Dropped from inside the loop (cleanup from an event): the
            // thread exits on its own once the loop unwinds.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!("Simulator worker thread panicked");
            }
        }
    }
}

fn worker_main<T: SimTime>(shared: Weak<Shared<T>>, commands: Receiver<Command>, started: Sender<()>) {
    tracing::debug!("Simulator worker parked");
    while let Ok(Command::Run) = commands.recv() {
        let Some(simulator) = Simulator::from_weak(&shared) else {
            break;
        };
        simulator.run_on_worker(&started);
    }
    tracing::debug!("Simulator worker exiting");
}
