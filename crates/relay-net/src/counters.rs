use std::collections::VecDeque;

const WINDOW_SECONDS: usize = 60;

/// Rolling packet/byte-rate counters over 1, 10 and 60 second windows.
///
/// A plain ring buffer of per-second samples, advanced once per periodic
/// tick; this replaces the shared-memory telemetry queue used for
/// cross-process statistics elsewhere, which has no role in a standalone
/// single-process server.
#[derive(Debug)]
pub struct RollingCounters {
    samples: VecDeque<Sample>,
    current: Sample,
}

#[derive(Debug, Default, Clone, Copy)]
struct Sample {
    packets: u64,
    bytes: u64,
}

impl Default for RollingCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingCounters {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(WINDOW_SECONDS),
            current: Sample::default(),
        }
    }

    pub fn record(&mut self, packets: u64, bytes: u64) {
        self.current.packets += packets;
        self.current.bytes += bytes;
    }

    /// Closes out the current second and starts a new one; call once per
    /// second of wall-clock time from the periodic tick.
    pub fn tick(&mut self) {
        if self.samples.len() == WINDOW_SECONDS {
            self.samples.pop_front();
        }
        self.samples.push_back(std::mem::take(&mut self.current));
    }

    pub fn packets_over(&self, seconds: usize) -> u64 {
        self.window(seconds).map(|s| s.packets).sum()
    }

    pub fn bytes_over(&self, seconds: usize) -> u64 {
        self.window(seconds).map(|s| s.bytes).sum()
    }

    fn window(&self, seconds: usize) -> impl Iterator<Item = &Sample> {
        let seconds = seconds.min(self.samples.len());
        self.samples.iter().rev().take(seconds)
    }
}
