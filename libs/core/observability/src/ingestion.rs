//! Metrics for the ingestion path and the client-side buffer.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Which side of the pipeline performed a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushSide {
    Server,
    Client,
}

impl FlushSide {
    fn as_str(self) -> &'static str {
        match self {
            FlushSide::Server => "server",
            FlushSide::Client => "client",
        }
    }
}

/// Ingestion metrics recorder
pub struct IngestionMetrics;

impl IngestionMetrics {
    /// Events written to the store; `path` is `batch` or `queue`.
    pub fn record_accepted(path: &'static str, count: usize) {
        counter!("telemetry_events_accepted_total", "path" => path).increment(count as u64);
    }

    pub fn record_rejected(count: usize) {
        if count > 0 {
            counter!("telemetry_events_rejected_total").increment(count as u64);
        }
    }

    pub fn record_flush(side: FlushSide, outcome: &'static str, events: usize, elapsed: Duration) {
        counter!(
            "telemetry_flushes_total",
            "side" => side.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!("telemetry_flush_duration_seconds", "side" => side.as_str())
            .record(elapsed.as_secs_f64());

        tracing::debug!(
            side = side.as_str(),
            outcome = outcome,
            events = events,
            elapsed_ms = elapsed.as_millis() as u64,
            "Flush finished"
        );
    }

    pub fn set_queue_depth(side: FlushSide, depth: usize) {
        gauge!("telemetry_queue_depth", "side" => side.as_str()).set(depth as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_a_noop() {
        IngestionMetrics::record_accepted("batch", 3);
        IngestionMetrics::record_rejected(0);
        IngestionMetrics::record_flush(FlushSide::Server, "ok", 3, Duration::from_millis(4));
        IngestionMetrics::set_queue_depth(FlushSide::Client, 7);
    }

    #[test]
    fn test_flush_side_labels() {
        assert_eq!(FlushSide::Server.as_str(), "server");
        assert_eq!(FlushSide::Client.as_str(), "client");
    }
}
