use std::time::{Duration, Instant};

/// Fires at most once per `interval`, tracking the last time it actually fired.
///
/// Used for the event loop's periodic housekeeping (statistics logging, idle
/// sweep) so the call site can just ask "is it time yet?" every tick without
/// keeping its own clock.
#[derive(Debug, Clone)]
pub struct Repeater {
    interval: Duration,
    last_acted: Instant,
}

impl Repeater {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_acted: Instant::now(),
        }
    }

    /// Returns `true` and resets the internal clock if `interval` has
    /// elapsed since the last time this fired.
    pub fn maybe(&mut self) -> bool {
        if self.fired() {
            self.last_acted = Instant::now();
            true
        } else {
            false
        }
    }

    /// Runs `f` if the interval has elapsed; returns whether it ran.
    pub fn every(&mut self, f: impl FnOnce()) -> bool {
        if self.maybe() {
            f();
            true
        } else {
            false
        }
    }

    /// Whether the interval has elapsed without resetting the clock.
    pub fn fired(&self) -> bool {
        self.last_acted.elapsed() >= self.interval
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Resets the clock without firing.
    pub fn reset(&mut self) {
        self.last_acted = Instant::now();
    }

    /// Forces the next `fired`/`maybe` check to succeed.
    pub fn force_fire(&mut self) {
        self.last_acted = Instant::now() - self.interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn does_not_fire_before_interval() {
        let r = Repeater::new(Duration::from_secs(60));
        assert!(!r.fired());
    }

    #[test]
    fn force_fire_makes_it_due() {
        let mut r = Repeater::new(Duration::from_secs(60));
        r.force_fire();
        assert!(r.fired());
    }

    #[test]
    fn maybe_resets_after_firing() {
        let mut r = Repeater::new(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(r.maybe());
        assert!(!r.fired());
    }
}
