//! CPU-time sampling and load estimation.
use crate::procfs::{ProcError, ProcessHandle, ProcessTable};
use std::time::Duration;

/// CPU time could not be read for the process, almost always because it has
/// exited. This is how the supervisor learns its handle went stale.
#[derive(Debug)]
pub struct SampleError {
    pub pid: u32,
    pub source: ProcError,
}

impl std::fmt::Display for SampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cpu time unavailable for pid {}: {}", self.pid, self.source)
    }
}

impl std::error::Error for SampleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Cumulative user + system CPU seconds consumed by the process.
pub fn cpu_seconds<T: ProcessTable + ?Sized>(
    table: &T,
    handle: &ProcessHandle,
) -> Result<f64, SampleError> {
    table.cpu_seconds(handle).map_err(|source| SampleError {
        pid: handle.pid(),
        source,
    })
}

/// Fraction of `window` spent on CPU, given readings at its start and end.
///
/// 1.0 means one core saturated for the whole window; multi-threaded
/// processes can exceed it.
pub fn load_factor(start: f64, end: f64, window: Duration) -> f64 {
    (end - start) / window.as_secs_f64()
}

/// Read CPU time, sleep for `window`, read again, and return the load factor.
///
/// The real interval is never shorter than `window`; scheduler slop on top of
/// it is not corrected for.
pub async fn estimate_load<T: ProcessTable + ?Sized>(
    table: &T,
    handle: &ProcessHandle,
    window: Duration,
) -> Result<f64, SampleError> {
    debug_assert!(!window.is_zero(), "sampling window must be non-zero");
    let start = cpu_seconds(table, handle)?;
    tokio::time::sleep(window).await;
    let end = cpu_seconds(table, handle)?;
    Ok(load_factor(start, end, window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTable;
    use tokio::time::Instant;

    #[test]
    fn test_load_factor_one_second() {
        let load = load_factor(2.0, 2.7, Duration::from_secs(1));
        assert!((load - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_load_factor_scales_with_window() {
        let load = load_factor(10.0, 13.0, Duration::from_secs(2));
        assert!((load - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_load_factor_idle() {
        assert_eq!(load_factor(5.0, 5.0, Duration::from_secs(1)), 0.0);
    }

    #[test]
    fn test_cpu_seconds_maps_error() {
        let table = FakeTable::new();
        let err = cpu_seconds(&table, &ProcessHandle::new(77, "gone")).unwrap_err();
        assert_eq!(err.pid, 77);
        assert!(err.to_string().starts_with("cpu time unavailable for pid 77"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimate_load_from_readings() {
        let table = FakeTable::new();
        table.spawn_with_readings(1, "worker", vec![2.0, 2.7]);
        let handle = ProcessHandle::new(1, "worker");

        let started = Instant::now();
        let load = estimate_load(&table, &handle, Duration::from_secs(1))
            .await
            .unwrap();

        assert!((load - 0.7).abs() < 1e-9);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimate_load_reads_window_apart() {
        let table = FakeTable::new();
        table.spawn(1, "worker", &[1.2]);
        let handle = ProcessHandle::new(1, "worker");

        estimate_load(&table, &handle, Duration::from_secs(1))
            .await
            .unwrap();

        let reads = table.reads();
        assert_eq!(reads.len(), 2);
        assert!(reads[1] - reads[0] >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimate_load_unavailable_at_start() {
        let table = FakeTable::new();
        let handle = ProcessHandle::new(9, "worker");

        let started = Instant::now();
        let err = estimate_load(&table, &handle, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(err.pid, 9);
        // Failing first read returns without sleeping.
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimate_load_unavailable_at_end() {
        let table = FakeTable::new();
        table.spawn_with_readings(1, "worker", vec![4.0]);
        let handle = ProcessHandle::new(1, "worker");

        let err = estimate_load(&table, &handle, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err.source, ProcError::Read { .. }));
    }
}
