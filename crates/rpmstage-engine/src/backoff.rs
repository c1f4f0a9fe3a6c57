use std::time::Duration;

pub struct BackoffSchedule {
    next_delay: Duration,
    cap: Duration,
}

impl BackoffSchedule {
    pub fn progressive() -> Self {
        Self::with_bounds(Duration::from_secs(1), Duration::from_secs(256))
    }

    pub fn with_bounds(initial: Duration, cap: Duration) -> Self {
        Self {
            next_delay: initial.min(cap),
            cap,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next_delay;
        self.next_delay = (delay * 2).min(self.cap);
        delay
    }
}
