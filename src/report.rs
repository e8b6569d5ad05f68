//! Receiver-side experiment report.
//!
//! Per-timeout elapsed times are summed across tries in configuration order
//! and written exactly once, after all rounds of all tries complete, as a
//! two-line CSV: comma-joined timeout values, then comma-joined averaged
//! elapsed times (arithmetic mean across tries, integer-truncated).

use crate::error::BenchError;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
struct TimeoutSlot {
    timeout_ms: u32,
    total_micros: i64,
}

/// Accumulates round timings across all tries of the experiment.
#[derive(Debug)]
pub struct ExperimentReport {
    slots: Vec<TimeoutSlot>,
}

impl ExperimentReport {
    pub fn new(timeout_count: u32) -> Self {
        Self {
            slots: vec![TimeoutSlot::default(); timeout_count as usize],
        }
    }

    /// Adds one round's elapsed time to the slot for `index`. Aborted rounds
    /// contribute their partial timing the same way as successful ones.
    pub fn record(&mut self, index: usize, timeout_ms: u32, elapsed_micros: i64) {
        let slot = &mut self.slots[index];
        slot.timeout_ms = timeout_ms;
        slot.total_micros += elapsed_micros;
    }

    /// Timeout values in configuration order.
    pub fn timeouts(&self) -> Vec<u32> {
        self.slots.iter().map(|slot| slot.timeout_ms).collect()
    }

    /// Per-timeout mean elapsed micros across `tries`, integer-truncated.
    pub fn averaged_micros(&self, tries: u32) -> Vec<i64> {
        let divisor = i64::from(tries.max(1));
        self.slots
            .iter()
            .map(|slot| slot.total_micros / divisor)
            .collect()
    }

    /// Writes the two-line CSV report.
    pub fn write_csv(&self, path: &Path, tries: u32) -> Result<(), BenchError> {
        let timeouts = join_row(self.timeouts().iter());
        let averages = join_row(self.averaged_micros(tries).iter());
        fs::write(path, format!("{}\n{}\n", timeouts, averages))?;

        info!(path = %path.display(), tries, "report written");
        Ok(())
    }
}

fn join_row<T: ToString>(values: impl Iterator<Item = T>) -> String {
    values
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
