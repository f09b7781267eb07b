//! Periodic UPDATE_ANIMATION notifications while an animated simulator
//! runs.

use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::error::{SimulatorError, SimulatorResult};
use crate::simulator::notify::SimulatorEvent;
use crate::simulator::time::SimTime;
use crate::simulator::{Shared, Simulator};

/// Background thread that ticks every animation delay. Stopped and joined
/// on drop.
pub(crate) struct AnimationPump {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl AnimationPump {
    pub(crate) fn start<T: SimTime>(simulator: &Simulator<T>) -> SimulatorResult<Self> {
        let (stop_tx, stop_rx) = bounded(1);
        let shared = simulator.downgrade();
        let handle = thread::Builder::new()
            .name(format!("{}-animation", simulator.id()))
            .spawn(move || pump(shared, stop_rx))
            .map_err(|e| SimulatorError::Worker(e.to_string()))?;
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

impl Drop for AnimationPump {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Animation thread panicked");
            }
        }
    }
}

fn pump<T: SimTime>(shared: Weak<Shared<T>>, stop: Receiver<()>) {
    loop {
        let Some(delay) = Simulator::from_weak(&shared).map(|s| s.animation_delay()) else {
            return;
        };
        match stop.recv_timeout(Duration::from_millis(delay.max(1))) {
            Err(RecvTimeoutError::Timeout) => {
                let Some(simulator) = Simulator::from_weak(&shared) else {
                    return;
                };
                simulator.fire(SimulatorEvent::UpdateAnimation(simulator.simulator_time()));
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
