use std::time::{Duration, Instant};

pub fn percentage(bytes_read: u64, total_bytes: Option<u64>) -> f64 {
    match total_bytes {
        Some(total) if total > 0 => {
            ((bytes_read as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
        }
        _ => 0.0,
    }
}

/// Bounds the rate of published progress snapshots so a fast transfer
/// cannot flood subscribers. The first sample and the final (100%)
/// sample always pass regardless of the interval.
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            last_emit: None,
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    pub fn should_emit(&mut self, percentage: f64) -> bool {
        let now = Instant::now();
        let due = match self.last_emit {
            None => true,
            Some(last) => now.duration_since(last) >= self.min_interval,
        };
        if due || percentage >= 100.0 {
            self.last_emit = Some(now);
            true
        } else {
            false
        }
    }
}

/// Exponentially smoothed instantaneous transfer speed.
pub struct SpeedEstimator {
    last_bytes: u64,
    last_time: Instant,
    smoothed: f64,
}

impl SpeedEstimator {
    pub fn new() -> Self {
        Self {
            last_bytes: 0,
            last_time: Instant::now(),
            smoothed: 0.0,
        }
    }

    pub fn sample(&mut self, bytes_read: u64) -> f64 {
        let now = Instant::now();
        let dt = now.duration_since(self.last_time).as_secs_f64();
        if bytes_read > self.last_bytes && dt > 0.1 {
            let instant = (bytes_read - self.last_bytes) as f64 / dt;
            self.smoothed = blend(self.smoothed, instant);
            self.last_bytes = bytes_read;
            self.last_time = now;
        }
        self.smoothed
    }
}

fn blend(smoothed: f64, instant: f64) -> f64 {
    if smoothed > 0.0 {
        smoothed * 0.7 + instant * 0.3
    } else {
        instant
    }
}
