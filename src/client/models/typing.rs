use std::time::{Duration, Instant};

/// How long after the last keystroke the indicator stays up.
pub const IDLE_WINDOW: Duration = Duration::from_secs(2);

/// Signals the host loop must forward to the live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

/// Outgoing typing debounce for one open conversation. The idle deadline is
/// the single scheduled task here: it is always either armed by the latest
/// keystroke or cleared — send, expiry, and leaving all cancel it, so it can
/// never fire stale.
#[derive(Debug, Default)]
pub struct TypingTracker {
    active: bool,
    idle_deadline: Option<Instant>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A keystroke happened. Emits `Start` only on the first of a burst;
    /// every keystroke re-arms the idle deadline.
    pub fn keystroke(&mut self, now: Instant) -> Option<TypingSignal> {
        self.idle_deadline = Some(now + IDLE_WINDOW);
        if self.active {
            None
        } else {
            self.active = true;
            Some(TypingSignal::Start)
        }
    }

    /// Driven by the host's timer tick. Emits `Stop` exactly once when the
    /// idle window elapsed with no further keystroke.
    pub fn poll_idle(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.idle_deadline {
            Some(deadline) if now >= deadline => {
                self.idle_deadline = None;
                self.active = false;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }

    /// The user sent their message: stop immediately and cancel the pending
    /// deadline, whatever time was left on it.
    pub fn message_sent(&mut self) -> Option<TypingSignal> {
        self.idle_deadline = None;
        if self.active {
            self.active = false;
            Some(TypingSignal::Stop)
        } else {
            None
        }
    }

    /// Leaving the conversation cancels the deadline without emitting.
    pub fn leave(&mut self) {
        self.idle_deadline = None;
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.idle_deadline
    }
}
