//! Monotonic change stamps.
//!
//! Every mutation that can affect rendered output takes a fresh stamp from a
//! [`Clock`]. Comparing two stamps tells which change happened last; `0` is
//! older than any stamp a clock hands out.

/// A point on a [`Clock`]'s timeline.
pub type TimeStamp = u64;

/// Strictly increasing stamp source.
///
/// There is no process-wide clock; whoever owns the timeline owns the
/// `Clock` and passes it where stamps are taken.
#[derive(Debug, Default)]
pub struct Clock {
    now: TimeStamp,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock and returns the new stamp.
    pub fn tick(&mut self) -> TimeStamp {
        self.now += 1;
        self.now
    }

    /// The most recently issued stamp.
    pub fn now(&self) -> TimeStamp {
        self.now
    }
}
