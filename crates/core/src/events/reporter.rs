use crate::events::{EventBus, ProgressEvent};

/// Handle collaborators use to report incremental progress.
#[derive(Clone)]
pub struct ProgressReporter {
    bus: EventBus,
}

impl ProgressReporter {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Reporter with no listeners, for callers that don't care.
    pub fn silent() -> Self {
        Self::new(EventBus::new())
    }

    pub fn report(&self, message: &str, percent: u8) {
        self.bus.publish(ProgressEvent::progress(message, percent));
    }
}

/// Tracks whole-percent changes so progress is only reported when it moves.
pub struct PercentTracker {
    last: Option<u8>,
}

impl PercentTracker {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Returns the new percent if it differs from the previously seen one.
    pub fn update(&mut self, done: f64, total: f64) -> Option<u8> {
        let percent = if total <= 0.0 {
            100
        } else {
            ((done / total) * 100.0).clamp(0.0, 100.0) as u8
        };
        if self.last == Some(percent) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }
}

impl Default for PercentTracker {
    fn default() -> Self {
        Self::new()
    }
}
