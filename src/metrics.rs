//! Phase timing and memory sampling for the benchmark binaries.
//!
//! Two memory views are reported: jemalloc's allocated-byte counter
//! (precise deltas per phase, provided the binary installs
//! `tikv_jemallocator::Jemalloc` as its global allocator) and the
//! process RSS from procfs (the end-of-run total, comparable across
//! runs).

use std::time::Instant;

/// Bytes currently allocated according to jemalloc.
///
/// Returns 0 when the statistics are unavailable (e.g. under a different
/// global allocator).
pub fn allocated_bytes() -> usize {
    if tikv_jemalloc_ctl::epoch::advance().is_err() {
        return 0;
    }
    tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0)
}

// `/proc/self/statm` reports in pages; 4 KiB covers the platforms this
// harness runs on.
const PAGE_SIZE: usize = 4096;

/// Resident set size of this process in bytes, from the second field
/// (`resident`) of `/proc/self/statm`; 0 where procfs is absent.
pub fn rss_bytes() -> usize {
    let Ok(statm) = std::fs::read_to_string("/proc/self/statm") else {
        return 0;
    };
    let resident_pages: usize = statm
        .split_whitespace()
        .nth(1)
        .and_then(|field| field.parse().ok())
        .unwrap_or(0);
    resident_pages * PAGE_SIZE
}

/// Bytes to mebibytes, as reported in the results CSV.
pub fn to_mb(bytes: usize) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Completed measurement of one benchmark phase.
#[derive(Debug, Clone, Copy)]
pub struct Phase {
    /// Wall-clock seconds.
    pub secs: f64,
    /// Growth of jemalloc's allocated counter over the phase (clamped
    /// at zero; phases can free more than they allocate).
    pub allocated_delta: usize,
}

impl Phase {
    /// Allocation growth in mebibytes.
    pub fn allocated_mb(&self) -> f64 {
        to_mb(self.allocated_delta)
    }
}

/// Wall-clock plus allocation-delta timer for one phase.
pub struct PhaseTimer {
    t0: Instant,
    alloc0: usize,
}

impl PhaseTimer {
    /// Start timing now.
    pub fn start() -> Self {
        PhaseTimer {
            alloc0: allocated_bytes(),
            t0: Instant::now(),
        }
    }

    /// Stop and report.
    pub fn finish(self) -> Phase {
        let secs = self.t0.elapsed().as_secs_f64();
        let alloc1 = allocated_bytes();
        Phase {
            secs,
            allocated_delta: alloc1.saturating_sub(self.alloc0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_timer_measures_something() {
        let timer = PhaseTimer::start();
        let v: Vec<u8> = vec![0; 1 << 20];
        std::hint::black_box(&v);
        let phase = timer.finish();
        assert!(phase.secs >= 0.0);
    }

    #[test]
    fn mb_conversion() {
        assert_eq!(to_mb(1024 * 1024), 1.0);
        assert_eq!(to_mb(0), 0.0);
    }
}
