//! Simulation clock values.
//!
//! The kernel is generic over the clock type. Anything that can be copied,
//! compared, shifted by a relative duration and measured against another
//! instant can drive a simulator. The real-time loop additionally needs a
//! lossy projection onto `f64` to do its wall-clock arithmetic.

use std::fmt::Debug;
use std::time::Duration;

/// An absolute simulation time.
pub trait SimTime: Copy + PartialOrd + Debug + Send + Sync + 'static {
    /// Distance between two instants.
    type Relative: Copy + PartialOrd + Debug + Send + Sync + 'static;

    fn zero() -> Self;

    /// `self + delta`.
    fn plus(self, delta: Self::Relative) -> Self;

    /// `self - earlier`.
    fn minus(self, earlier: Self) -> Self::Relative;

    fn as_f64(self) -> f64;

    /// Inverse of [`as_f64`](SimTime::as_f64). Integer clocks round down so
    /// a converted value never lies past the input.
    fn from_f64(value: f64) -> Self;

    fn relative_as_f64(delta: Self::Relative) -> f64;

    fn relative_from_f64(value: f64) -> Self::Relative;

    /// False for values that cannot be ordered (NaN).
    fn is_valid(self) -> bool {
        true
    }
}

/// The earlier of two instants.
pub(crate) fn earlier<T: SimTime>(a: T, b: T) -> T {
    if b < a { b } else { a }
}

impl SimTime for f64 {
    type Relative = f64;

    fn zero() -> Self {
        0.0
    }
    fn plus(self, delta: f64) -> Self {
        self + delta
    }
    fn minus(self, earlier: Self) -> f64 {
        self - earlier
    }
    fn as_f64(self) -> f64 {
        self
    }
    fn from_f64(value: f64) -> Self {
        value
    }
    fn relative_as_f64(delta: f64) -> f64 {
        delta
    }
    fn relative_from_f64(value: f64) -> f64 {
        value
    }
    fn is_valid(self) -> bool {
        !self.is_nan()
    }
}

impl SimTime for f32 {
    type Relative = f32;

    fn zero() -> Self {
        0.0
    }
    fn plus(self, delta: f32) -> Self {
        self + delta
    }
    fn minus(self, earlier: Self) -> f32 {
        self - earlier
    }
    fn as_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(value: f64) -> Self {
        value as f32
    }
    fn relative_as_f64(delta: f32) -> f64 {
        delta as f64
    }
    fn relative_from_f64(value: f64) -> f32 {
        value as f32
    }
    fn is_valid(self) -> bool {
        !self.is_nan()
    }
}

impl SimTime for i64 {
    type Relative = i64;

    fn zero() -> Self {
        0
    }
    fn plus(self, delta: i64) -> Self {
        self.saturating_add(delta)
    }
    fn minus(self, earlier: Self) -> i64 {
        self.saturating_sub(earlier)
    }
    fn as_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(value: f64) -> Self {
        // `as` saturates and maps NaN to 0.
        value.floor() as i64
    }
    fn relative_as_f64(delta: i64) -> f64 {
        delta as f64
    }
    fn relative_from_f64(value: f64) -> i64 {
        value.floor() as i64
    }
}

/// Elapsed-time clock. Converts to and from seconds.
impl SimTime for Duration {
    type Relative = Duration;

    fn zero() -> Self {
        Duration::ZERO
    }
    fn plus(self, delta: Duration) -> Self {
        self.saturating_add(delta)
    }
    fn minus(self, earlier: Self) -> Duration {
        self.saturating_sub(earlier)
    }
    fn as_f64(self) -> f64 {
        self.as_secs_f64()
    }
    fn from_f64(value: f64) -> Self {
        duration_from_secs(value)
    }
    fn relative_as_f64(delta: Duration) -> f64 {
        delta.as_secs_f64()
    }
    fn relative_from_f64(value: f64) -> Duration {
        duration_from_secs(value)
    }
}

fn duration_from_secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}
