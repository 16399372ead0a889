use std::time::{Duration, Instant};

/// Debounce gate: at most one accepted trigger per cooldown window.
///
/// The window is measured from the trigger instant, not from capture or
/// classification completion.
#[derive(Clone, Debug)]
pub struct CooldownGate {
    cooldown: Duration,
    last_trigger: Option<Instant>,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_trigger: None,
        }
    }

    /// True when a trigger at `now` would be accepted.
    fn is_open(&self, now: Instant) -> bool {
        match self.last_trigger {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.cooldown,
        }
    }

    /// Accept a trigger at `now` if the gate is open, recording it immediately.
    pub fn try_fire(&mut self, now: Instant) -> bool {
        if !self.is_open(now) {
            return false;
        }
        self.last_trigger = Some(now);
        true
    }
}
