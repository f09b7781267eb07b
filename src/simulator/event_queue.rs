//! Future event list for the simulator
//!
//! Events are kept in a `BTreeMap` keyed by `(time, priority, id)`, which
//! gives O(log n) insert, peek, pop and cancellation by key. Within one
//! instant a higher priority fires first; among equal priorities the event
//! added first fires first.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{SimulatorError, SimulatorResult};
use crate::simulator::action::Action;
use crate::simulator::time::SimTime;

/// Insertion sequence number of an event, assigned by the [`EventList`]
/// it is added to. Strictly increasing per list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

/// Event priority. Higher values fire earlier within the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(i8);

impl Priority {
    pub const MIN: Priority = Priority(1);
    pub const NORMAL: Priority = Priority(5);
    pub const MAX: Priority = Priority(10);

    /// Orders the warmup marker ahead of every user event at its instant.
    pub(crate) const WARMUP: Priority = Priority(Self::MAX.0 + 1);
    /// Orders the end-of-replication marker behind every user event.
    pub(crate) const END_OF_REPLICATION: Priority = Priority(Self::MIN.0 - 1);

    pub fn new(value: i8) -> SimulatorResult<Self> {
        if value < Self::MIN.0 || value > Self::MAX.0 {
            return Err(SimulatorError::InvalidPriority {
                value,
                min: Self::MIN.0,
                max: Self::MAX.0,
            });
        }
        Ok(Priority(value))
    }

    pub fn value(self) -> i8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

/// Identifies a scheduled event for cancellation.
#[derive(Debug, Clone, Copy)]
pub struct EventHandle<T: SimTime> {
    id: EventId,
    time: T,
    priority: Priority,
}

impl<T: SimTime> EventHandle<T> {
    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn time(&self) -> T {
        self.time
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    fn key(&self) -> EventKey<T> {
        EventKey {
            time: self.time,
            priority: self.priority,
            id: self.id,
        }
    }
}

impl<T: SimTime> PartialEq for EventHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Simulation event. Its id is assigned when it is added to a list.
pub struct SimEvent<T: SimTime> {
    id: EventId,
    time: T,
    priority: Priority,
    action: Action<T>,
}

impl<T: SimTime> SimEvent<T> {
    pub fn new(time: T, priority: Priority, action: Action<T>) -> Self {
        Self {
            id: EventId(0),
            time,
            priority,
            action,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    /// Absolute execution time.
    pub fn time(&self) -> T {
        self.time
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    fn handle(&self) -> EventHandle<T> {
        EventHandle {
            id: self.id,
            time: self.time,
            priority: self.priority,
        }
    }

    pub(crate) fn into_action(self) -> Action<T> {
        self.action
    }

    fn key(&self) -> EventKey<T> {
        self.handle().key()
    }
}

impl<T: SimTime> fmt::Debug for SimEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimEvent")
            .field("id", &self.id)
            .field("time", &self.time)
            .field("priority", &self.priority.0)
            .field("action", &self.action)
            .finish()
    }
}

impl<T: SimTime> fmt::Display for SimEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {:?} (p{}, {:?})", self.id, self.time, self.priority.0, self.action)
    }
}

impl<T: SimTime> PartialEq for SimEvent<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T: SimTime> Eq for SimEvent<T> {}
impl<T: SimTime> PartialOrd for SimEvent<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<T: SimTime> Ord for SimEvent<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

#[derive(Debug, Clone, Copy)]
struct EventKey<T: SimTime> {
    time: T,
    priority: Priority,
    id: EventId,
}

// Times are checked with `is_valid` before insertion, so `partial_cmp`
// only returns `None` for keys that never reach the map.
impl<T: SimTime> Ord for EventKey<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .partial_cmp(&other.time)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| self.id.cmp(&other.id))
    }
}
impl<T: SimTime> PartialOrd for EventKey<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<T: SimTime> PartialEq for EventKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl<T: SimTime> Eq for EventKey<T> {}

/// Ordered set of pending events.
///
/// Holds exactly the events that have been scheduled and neither executed
/// nor cancelled. The simulator guards it with its semaphore.
pub struct EventList<T: SimTime> {
    events: BTreeMap<EventKey<T>, SimEvent<T>>,
    next_id: u64,
}

impl<T: SimTime> EventList<T> {
    pub fn new() -> Self {
        Self {
            events: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Insert `event`, refusing times before `now`.
    pub fn add(&mut self, mut event: SimEvent<T>, now: T) -> SimulatorResult<EventHandle<T>> {
        if !event.time.is_valid() {
            return Err(SimulatorError::InvalidEventTime(format!("{:?}", event.time)));
        }
        if event.time < now {
            return Err(SimulatorError::ScheduleInPast {
                requested: format!("{:?}", event.time),
                current: format!("{:?}", now),
            });
        }
        event.id = EventId(self.next_id);
        self.next_id += 1;
        let handle = event.handle();
        self.events.insert(event.key(), event);
        Ok(handle)
    }

    /// The earliest event, without removing it.
    pub fn first(&self) -> SimulatorResult<&SimEvent<T>> {
        self.events
            .first_key_value()
            .map(|(_, event)| event)
            .ok_or(SimulatorError::EmptyEventList)
    }

    pub fn peek(&self) -> Option<&SimEvent<T>> {
        self.events.first_key_value().map(|(_, event)| event)
    }

    pub fn remove_first(&mut self) -> SimulatorResult<SimEvent<T>> {
        self.events
            .pop_first()
            .map(|(_, event)| event)
            .ok_or(SimulatorError::EmptyEventList)
    }

    /// Cancel a scheduled event. Returns `false` when it already fired or
    /// was removed before.
    pub fn remove(&mut self, handle: &EventHandle<T>) -> bool {
        self.events.remove(&handle.key()).is_some()
    }

    pub fn contains(&self, handle: &EventHandle<T>) -> bool {
        self.events.contains_key(&handle.key())
    }

    /// Drop every pending event. Ids keep increasing, so handles taken
    /// before the clear never match a later event.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Handles of all pending events in firing order.
    pub fn handles(&self) -> Vec<EventHandle<T>> {
        self.events.values().map(SimEvent::handle).collect()
    }
}

impl<T: SimTime> Default for EventList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SimTime> fmt::Debug for EventList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.events.values()).finish()
    }
}
