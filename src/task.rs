//! Cooperative background threads
//!
//! A task runs until its running flag is cleared; it checks the flag at each
//! wake-up. Stopping waits a bounded time and detaches the thread if it has
//! not finished by then.

use eyre::{Context, Result};
use std::io::Read;
use std::process::{Child, ExitStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Granularity of cooperative sleeps
pub const TICK: Duration = Duration::from_millis(100);

pub struct BackgroundTask {
    signal: TaskSignal,
    handle: Option<JoinHandle<()>>,
}

/// Cloneable stop switch for a task, usable from threads that do not own it
#[derive(Clone)]
pub struct TaskSignal {
    name: String,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

/// Sets `finished` when the thread body returns or unwinds
struct FinishGuard(Arc<AtomicBool>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl BackgroundTask {
    /// Spawn a named thread; `body` receives the running flag
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let finished = Arc::new(AtomicBool::new(false));
        let flag = running.clone();
        let guard = FinishGuard(finished.clone());

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = guard;
                body(flag)
            })
            .with_context(|| format!("Failed to spawn {} thread", name))?;

        log::debug!("Started {} thread", name);
        Ok(Self {
            signal: TaskSignal {
                name: name.to_string(),
                running,
                finished,
            },
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && !self.signal.is_finished()
    }

    pub fn signal(&self) -> TaskSignal {
        self.signal.clone()
    }

    /// Request exit and wait up to `timeout`. Returns true if the thread was joined.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        if !self.signal.halt(timeout) {
            return false;
        }

        if handle.join().is_err() {
            log::error!("{} thread panicked", self.signal.name);
        }
        log::debug!("Stopped {} thread", self.signal.name);
        true
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.signal.running.store(false, Ordering::SeqCst);
    }
}

impl TaskSignal {
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Clear the running flag and wait up to `timeout` for the thread body to return
    pub fn halt(&self, timeout: Duration) -> bool {
        self.running.store(false, Ordering::SeqCst);

        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                log::warn!("{} thread did not stop within {:?}, detaching", self.name, timeout);
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }
}

/// Sleep for `duration` in ticks. Returns false as soon as the flag is cleared.
pub fn pause(running: &AtomicBool, duration: Duration) -> bool {
    // An interval too long to represent never elapses
    let deadline = Instant::now().checked_add(duration);
    loop {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        let remaining = match deadline {
            Some(deadline) if now >= deadline => return true,
            Some(deadline) => deadline - now,
            None => TICK,
        };
        thread::sleep(TICK.min(remaining));
    }
}

/// Wait for a child process, killing it if `running` is cleared first.
/// Captured stderr is returned alongside the exit status.
pub fn wait_child(mut child: Child, running: &AtomicBool, label: &str) -> Result<(ExitStatus, String)> {
    loop {
        if let Some(status) = child.try_wait().with_context(|| format!("Failed to wait for {}", label))? {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                // Best effort; the status is what matters
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Ok((status, stderr));
        }

        if !running.load(Ordering::SeqCst) {
            if let Err(e) = child.kill() {
                log::warn!("Failed to kill {}: {}", label, e);
            }
            let _ = child.wait();
            eyre::bail!("{} interrupted", label);
        }

        thread::sleep(TICK);
    }
}
