//! Transfer statistics: a single guarded, append-only log written by
//! `readfile` handlers from any dispatch unit and summarized at
//! shutdown.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TransferSample {
    pub bytes: usize,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub bytes_per_sec: f64,
}

#[derive(Default)]
pub struct StatsCollector {
    samples: Mutex<Vec<TransferSample>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TransferSample>> {
        match self.samples.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// One critical section per append; this is the only shared
    /// resource concurrent dispatch units write to.
    pub fn record(&self, bytes: usize, elapsed: Duration) -> TransferSample {
        let secs = elapsed.as_secs_f64();
        let sample = TransferSample {
            bytes,
            elapsed,
            bytes_per_sec: if secs > 0.0 { bytes as f64 / secs } else { 0.0 },
        };
        self.lock().push(sample.clone());
        sample
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<TransferSample> {
        self.lock().clone()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    pub fn summary(&self) -> String {
        let samples = self.snapshot();
        if samples.is_empty() {
            return "no transfers recorded".to_string();
        }
        let total_bytes: usize = samples.iter().map(|s| s.bytes).sum();
        let mean_rate =
            samples.iter().map(|s| s.bytes_per_sec).sum::<f64>() / samples.len() as f64;
        format!(
            "{} transfers, {} bytes total, {:.0} B/s mean",
            samples.len(),
            total_bytes,
            mean_rate
        )
    }
}
