//! Operator-facing output
//!
//! Everything the operator reads goes through a [`Reporter`]. While a timed
//! step is running the reporter is *deferred*: the step's own line is left
//! open so the elapsed time can be appended to it, and any lines printed in
//! the meantime are queued and written after it, in order.

use super::progress::{format_elapsed, TaskTimer};
use crate::error::StepCacheResult;
use console::style;
use std::future::Future;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

struct State {
    out: Box<dyn Write + Send>,
    deferred: bool,
    queue: Vec<String>,
}

/// Writes progress lines for one invocation
pub struct Reporter {
    state: Mutex<State>,
}

impl Reporter {
    /// Reporter writing to stdout
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }

    /// Reporter writing to an arbitrary sink
    pub fn with_writer(out: impl Write + Send + 'static) -> Self {
        Self {
            state: Mutex::new(State {
                out: Box::new(out),
                deferred: false,
                queue: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn line(&self, text: String) {
        let mut state = self.lock();
        if state.deferred {
            state.queue.push(text);
        } else {
            let _ = writeln!(state.out, "{}", text);
            let _ = state.out.flush();
        }
    }

    /// Top-level heading for a command
    pub fn task(&self, message: &str) {
        self.line(format!("{} {}", style("▸").cyan(), style(message).cyan().bold()));
    }

    pub fn step(&self, message: &str) {
        self.line(format!("  {} {}", style("∙").dim(), message));
    }

    pub fn substep(&self, message: &str) {
        self.line(format!("    {}", style(message).dim()));
    }

    pub fn success(&self, message: &str) {
        self.line(format!("{} {}", style("✔").green(), style(message).green()));
    }

    pub fn info(&self, message: &str) {
        self.line(format!("  {}", message));
    }

    /// Run `work` as a step, annotating its line with the elapsed time
    pub async fn timed_step<T, F>(&self, message: &str, work: F) -> StepCacheResult<T>
    where
        F: Future<Output = StepCacheResult<T>>,
    {
        self.timed(format!("  {} {}", style("∙").dim(), message), work)
            .await
    }

    /// Like [`Reporter::timed_step`], one level deeper
    pub async fn timed_substep<T, F>(&self, message: &str, work: F) -> StepCacheResult<T>
    where
        F: Future<Output = StepCacheResult<T>>,
    {
        self.timed(format!("    {}", style(message).dim()), work)
            .await
    }

    /// Start timing a whole task; call [`TaskTimer::finish`] when done
    pub fn timed_task(&self, message: &str) -> TaskTimer {
        self.task(message);
        TaskTimer::start(message)
    }

    async fn timed<T, F>(&self, head: String, work: F) -> StepCacheResult<T>
    where
        F: Future<Output = StepCacheResult<T>>,
    {
        let nested = {
            let mut state = self.lock();
            if state.deferred {
                true
            } else {
                let _ = write!(state.out, "{}...", head);
                let _ = state.out.flush();
                state.deferred = true;
                false
            }
        };

        let started = Instant::now();
        let result = work.await;
        let elapsed = format_elapsed(started.elapsed());
        let tail = match &result {
            Ok(_) => style(format!(" ({})", elapsed)).dim().to_string(),
            Err(_) => format!(" {}", style("failed").red()),
        };

        let mut state = self.lock();
        if nested {
            state.queue.push(format!("{}...{}", head, tail));
            return result;
        }

        let _ = writeln!(state.out, "{}", tail);
        let queued = std::mem::take(&mut state.queue);
        for text in queued {
            let _ = writeln!(state.out, "{}", text);
        }
        let _ = state.out.flush();
        state.deferred = false;
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::StepCacheError;
    use std::sync::Arc;

    /// Cloneable in-memory sink for asserting on output
    #[derive(Clone, Default)]
    pub(crate) struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        pub(crate) fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn plain_lines_are_written_immediately() {
        let out = Captured::default();
        let reporter = Reporter::with_writer(out.clone());

        reporter.task("Build");
        reporter.step("hashing");
        reporter.success("done");

        let text = out.text();
        let build = text.find("Build").unwrap();
        let hashing = text.find("hashing").unwrap();
        let done = text.find("done").unwrap();
        assert!(build < hashing && hashing < done);
    }

    #[tokio::test]
    async fn substeps_are_queued_until_timed_step_finishes() {
        let out = Captured::default();
        let reporter = Reporter::with_writer(out.clone());

        let value = reporter
            .timed_step("Fetching", async {
                reporter.substep("first");
                reporter.substep("second");
                Ok(7)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let text = out.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Fetching...") && lines[0].contains('s'));
        assert!(lines[1].contains("first"));
        assert!(lines[2].contains("second"));
    }

    #[tokio::test]
    async fn failed_timed_step_still_flushes() {
        let out = Captured::default();
        let reporter = Reporter::with_writer(out.clone());

        let result: StepCacheResult<()> = reporter
            .timed_step("Uploading", async {
                reporter.substep("queued");
                Err(StepCacheError::Internal("nope".into()))
            })
            .await;
        assert!(result.is_err());

        let text = out.text();
        assert!(text.contains("Uploading..."));
        assert!(text.contains("failed"));
        assert!(text.contains("queued"));

        reporter.step("after");
        assert!(out.text().ends_with("after\n"));
    }

    #[tokio::test]
    async fn nested_timed_substep_is_queued_in_order() {
        let out = Captured::default();
        let reporter = Reporter::with_writer(out.clone());

        reporter
            .timed_step("Outer", async {
                reporter
                    .timed_substep("inner", async { Ok(()) })
                    .await?;
                reporter.substep("later");
                Ok(())
            })
            .await
            .unwrap();

        let text = out.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("inner"));
        assert!(lines[2].contains("later"));
    }
}
