//! Load timing telemetry

use std::time::Duration;

/// Sink for per-file load timing.
pub trait LoadTimeLog: Send + Sync {
    /// Record how long a request waited behind the dispatcher and how long
    /// the streaming decode itself took.
    fn log_file_time(&self, wait: Duration, load: Duration, frames: u32, filename: &str);
}

/// Default sink: forwards to the `log` facade.
#[derive(Debug, Default)]
pub struct DebugLoadLog;

impl LoadTimeLog for DebugLoadLog {
    fn log_file_time(&self, wait: Duration, load: Duration, frames: u32, filename: &str) {
        log::debug!(
            "loaded {filename}: {frames} frames, waited {:.3} ms, streamed in {:.3} ms",
            wait.as_secs_f64() * 1e3,
            load.as_secs_f64() * 1e3,
        );
    }
}
