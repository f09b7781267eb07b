//! Notifications produced by a simulator.
//!
//! Listeners subscribe through [`Simulator::subscribe`](crate::simulator::Simulator::subscribe)
//! and receive every notification on an unbounded channel. Firing never
//! blocks the run loop; receivers that were dropped are pruned on the next
//! fire.

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use crate::simulator::time::SimTime;

#[derive(Debug, Clone, PartialEq)]
pub enum SimulatorEvent<T: SimTime> {
    Starting,
    Start,
    Stopping,
    Stop,
    TimeChanged(T),
    EventListChanged,
    StartReplication(T),
    Warmup(T),
    EndReplication(T),
    AnimationDelayChanged(u64),
    UpdateAnimation(T),
    ChangeSpeedFactor(f64),
    /// The real-time loop fell behind the wall clock by `lag` simulation
    /// units and, with catch-up disabled, accepted the lag.
    Backlog { lag: f64 },
}

pub(crate) struct Listeners<T: SimTime> {
    senders: Mutex<Vec<Sender<SimulatorEvent<T>>>>,
}

impl<T: SimTime> Listeners<T> {
    pub(crate) fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> Receiver<SimulatorEvent<T>> {
        let (tx, rx) = unbounded();
        self.senders.lock().push(tx);
        rx
    }

    pub(crate) fn fire(&self, event: SimulatorEvent<T>) {
        let mut senders = self.senders.lock();
        if senders.is_empty() {
            return;
        }
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn clear(&self) {
        self.senders.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.senders.lock().len()
    }
}
