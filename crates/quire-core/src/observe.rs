//! Optional metrics instrumentation for Quire.
//!
//! When the `observe` feature is enabled, key operations emit counters and
//! histograms via the [`metrics`] crate. A downstream application must
//! install a metrics recorder to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a wrapped bulk write.
///
/// - `quire.bulk_write.total` – counter
/// - `quire.bulk_write.rows_total` – counter with `outcome` label (`success` / `error`)
/// - `quire.bulk_write.duration_seconds` – histogram
#[inline]
pub fn record_bulk_write(duration: std::time::Duration, successes: usize, errors: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("quire.bulk_write.total").increment(1);
        metrics::counter!("quire.bulk_write.rows_total", "outcome" => "success")
            .increment(successes as u64);
        metrics::counter!("quire.bulk_write.rows_total", "outcome" => "error")
            .increment(errors as u64);
        metrics::histogram!("quire.bulk_write.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, successes, errors);
    }
}

/// Record tombstones re-inserted by the resurrection pass.
///
/// - `quire.resurrections_total` – counter
#[inline]
pub fn record_resurrections(count: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("quire.resurrections_total").increment(count as u64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = count;
    }
}

/// Record a run-queue acquisition wait time.
///
/// - `quire.run_queue.wait_duration_seconds` – histogram
#[inline]
pub fn record_lock_wait(duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::histogram!("quire.run_queue.wait_duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = duration;
    }
}

/// Record an event bulk dropped because its id was already emitted.
///
/// - `quire.event_bulk.duplicates_total` – counter
#[inline]
pub fn record_duplicate_event_bulk() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("quire.event_bulk.duplicates_total").increment(1);
    }
}
