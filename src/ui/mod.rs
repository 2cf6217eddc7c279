//! Operator-facing output
//!
//! Diagnostics go through `tracing` to stderr; what the operator is meant to
//! read (which step is running, cache hits and misses, timings) goes through
//! a [`Reporter`] to stdout.
//!
//! # Example
//!
//! ```rust,ignore
//! use stepcache::ui::Reporter;
//!
//! let reporter = Reporter::stdout();
//! let timer = reporter.timed_task("Run 'lint'");
//! let manifest = reporter
//!     .timed_step("Hashing inputs", build_manifest(step, root, &[]))
//!     .await?;
//! reporter.substep(&format!("{} files", manifest.files.len()));
//! timer.finish(&reporter);
//! ```

mod output;
mod progress;

pub use output::Reporter;
pub use progress::{format_elapsed, format_size, TaskTimer};

#[cfg(test)]
pub(crate) use output::tests::Captured;
