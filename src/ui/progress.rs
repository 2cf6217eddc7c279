//! Elapsed-time tracking for reporter tasks

use super::Reporter;
use std::time::{Duration, Instant};

/// Timer for a whole task started by [`Reporter::timed_task`]
pub struct TaskTimer {
    message: String,
    started: Instant,
}

impl TaskTimer {
    pub(super) fn start(message: &str) -> Self {
        Self {
            message: message.to_string(),
            started: Instant::now(),
        }
    }

    /// Report the task as finished with its total duration
    pub fn finish(self, reporter: &Reporter) {
        reporter.success(&format!(
            "{} finished in {}",
            self.message,
            format_elapsed(self.started.elapsed())
        ));
    }
}

/// Human-readable duration: `0.42s`, `12.3s`, `2m 05s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 10.0 {
        format!("{:.2}s", secs)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let whole = elapsed.as_secs();
        format!("{}m {:02}s", whole / 60, whole % 60)
    }
}

/// Human-readable byte count: `512 B`, `1.5 KiB`, `20.0 MiB`
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
