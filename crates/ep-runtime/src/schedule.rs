//! Virtual-time timers
//!
//! The runtime is driven by the host: it reports the current time in
//! milliseconds and asks for the next deadline. These helpers keep the
//! bookkeeping for debounced and periodic work.

/// Milliseconds on the host's monotonic clock.
pub type Millis = u64;

/// Collapses bursts of triggers into one firing `delay` after the last one.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Millis,
    deadline: Option<Millis>,
}

impl Debouncer {
    pub fn new(delay: Millis) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn trigger(&mut self, now: Millis) {
        self.deadline = Some(now.saturating_add(self.delay));
    }

    /// True once per burst, when the quiet period has elapsed.
    pub fn fire_if_due(&mut self, now: Millis) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn deadline(&self) -> Option<Millis> {
        self.deadline
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

/// Fires every `period` while running.
#[derive(Debug, Clone)]
pub struct Interval {
    period: Millis,
    next: Option<Millis>,
}

impl Interval {
    pub fn new(period: Millis) -> Self {
        Self { period, next: None }
    }

    pub fn start(&mut self, now: Millis) {
        self.next = Some(now.saturating_add(self.period));
    }

    pub fn stop(&mut self) {
        self.next = None;
    }

    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    /// Missed periods collapse into a single firing.
    pub fn fire_if_due(&mut self, now: Millis) -> bool {
        match self.next {
            Some(next) if now >= next => {
                self.next = Some(now.saturating_add(self.period));
                true
            }
            _ => false,
        }
    }

    pub fn deadline(&self) -> Option<Millis> {
        self.next
    }
}

/// Earliest of a set of optional deadlines.
pub fn earliest(deadlines: impl IntoIterator<Item = Option<Millis>>) -> Option<Millis> {
    deadlines.into_iter().flatten().min()
}
