//! Replications and the models run inside them.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{EventResult, SimulatorError, SimulatorResult};
use crate::simulator::Simulator;
use crate::simulator::time::SimTime;

/// Predicate that ends a replication early once it returns `true`.
pub type StoppingCondition<T> = Arc<dyn Fn(&Simulator<T>) -> bool + Send + Sync>;

/// A model builds its initial state and first events when a replication is
/// attached to a simulator.
pub trait Model<T: SimTime> {
    fn construct_model(&mut self, simulator: &Simulator<T>) -> EventResult;
}

impl<T, F> Model<T> for F
where
    T: SimTime,
    F: FnMut(&Simulator<T>) -> EventResult,
{
    fn construct_model(&mut self, simulator: &Simulator<T>) -> EventResult {
        (self)(simulator)
    }
}

/// One run of a model from `start_time` to `end_time`.
///
/// Statistics collected before `warmup_time` are meant to be discarded;
/// the simulator marks that instant with a WARMUP notification.
#[derive(Clone)]
pub struct Replication<T: SimTime> {
    id: Uuid,
    context: String,
    start_time: T,
    warmup_time: T,
    end_time: T,
    stopping_condition: Option<StoppingCondition<T>>,
}

impl<T: SimTime> Replication<T> {
    pub fn new(
        context: impl Into<String>,
        start_time: T,
        warmup_period: T::Relative,
        run_length: T::Relative,
    ) -> SimulatorResult<Self> {
        if !start_time.is_valid() {
            return Err(SimulatorError::InvalidReplication(format!(
                "start time {:?} is not a valid time",
                start_time
            )));
        }
        let zero = T::zero().minus(T::zero());
        if !(run_length > zero) {
            return Err(SimulatorError::InvalidReplication(format!(
                "run length {:?} must be positive",
                run_length
            )));
        }
        if !(warmup_period >= zero) || warmup_period > run_length {
            return Err(SimulatorError::InvalidReplication(format!(
                "warmup period {:?} must lie within the run length {:?}",
                warmup_period, run_length
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            context: context.into(),
            start_time,
            warmup_time: start_time.plus(warmup_period),
            end_time: start_time.plus(run_length),
            stopping_condition: None,
        })
    }

    pub fn with_stopping_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Simulator<T>) -> bool + Send + Sync + 'static,
    {
        self.stopping_condition = Some(Arc::new(condition));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Namespace under which the replication's results are reported.
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn start_time(&self) -> T {
        self.start_time
    }

    pub fn warmup_time(&self) -> T {
        self.warmup_time
    }

    pub fn end_time(&self) -> T {
        self.end_time
    }

    pub fn stopping_condition(&self) -> Option<StoppingCondition<T>> {
        self.stopping_condition.clone()
    }
}

impl<T: SimTime> fmt::Debug for Replication<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replication")
            .field("id", &self.id)
            .field("context", &self.context)
            .field("start_time", &self.start_time)
            .field("warmup_time", &self.warmup_time)
            .field("end_time", &self.end_time)
            .field("stopping_condition", &self.stopping_condition.is_some())
            .finish()
    }
}
