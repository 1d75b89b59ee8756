use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Pure side channel for run progress. Implementations must never affect
/// control flow or the conversion outcome.
pub trait ProgressReporter {
    fn tick(&mut self, id: i64);

    /// Called once after the last row.
    fn finish(&mut self) {}
}

/// Swap-in reporter for tests and embedded use.
#[derive(Debug, Default)]
pub struct NoopProgressReporter;

impl ProgressReporter for NoopProgressReporter {
    fn tick(&mut self, _id: i64) {}
}

/// Prints one overwritten status line with throughput and a remaining-time
/// estimate, throttled to a minimum interval between emissions.
pub struct TermProgressReporter {
    total: u64,
    processed: u64,
    started: Instant,
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl TermProgressReporter {
    pub fn new(total: u64) -> Self {
        Self::with_interval(total, Duration::from_secs(1))
    }

    pub fn with_interval(total: u64, min_interval: Duration) -> Self {
        Self {
            total,
            processed: 0,
            started: Instant::now(),
            last_emit: None,
            min_interval,
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    fn emit(&mut self, id: i64, now: Instant) {
        let elapsed = now.duration_since(self.started).as_secs_f64().max(0.001);
        let rate = self.processed as f64 / elapsed;
        let remaining = self.total.saturating_sub(self.processed);
        let eta_secs = if rate > 0.0 {
            (remaining as f64 / rate).round() as u64
        } else {
            0
        };

        print!(
            "\rmigrated {} of {} rows ({:.0} rows/s, ~{}s remaining, last id {})  ",
            self.processed, self.total, rate, eta_secs, id
        );
        let _ = io::stdout().flush();
        self.last_emit = Some(now);
    }
}

impl ProgressReporter for TermProgressReporter {
    fn tick(&mut self, id: i64) {
        self.processed += 1;
        let now = Instant::now();
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < self.min_interval {
                return;
            }
        }
        self.emit(id, now);
    }

    fn finish(&mut self) {
        if self.last_emit.is_some() {
            println!();
        }
    }
}
