//! Cooperative and forced cancellation of a running batch.
//!
//! A [`CancelToken`] is shared between the submitter and the worker. The
//! worker polls [`CancelToken::is_stopped`] at loop boundaries; a hard kill
//! additionally terminates whichever external process is registered at the
//! time, or the next one to be registered if none is running yet.

use crate::error::{DeidError, DeidResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Shared stop/kill signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    stop: AtomicBool,
    kill_pending: AtomicBool,
    running: Mutex<Vec<u32>>,
}

/// Registration of a live external process. Unregisters on drop.
#[derive(Debug)]
pub struct ProcessRegistration {
    token: CancelToken,
    pid: u32,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Soft stop: loops observe the flag and unwind after closing their
    /// reader and encoder.
    pub fn request_stop(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        tracing::info!("Stop requested");
    }

    /// Hard kill: stop plus termination of the running external process.
    pub fn request_kill(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        let running = self.lock_running();
        if running.is_empty() {
            self.inner.kill_pending.store(true, Ordering::SeqCst);
            tracing::info!("Kill requested with no running process; deferring to next spawn");
            return;
        }
        for pid in running.iter() {
            kill_process(*pid);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stop.load(Ordering::SeqCst)
    }

    /// `Err(DeidError::Cancelled)` once a stop or kill was requested.
    pub fn check(&self) -> DeidResult<()> {
        if self.is_stopped() {
            Err(DeidError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Record a freshly spawned process. A deferred kill is applied
    /// immediately.
    pub fn register_process(&self, pid: u32) -> ProcessRegistration {
        let mut running = self.lock_running();
        running.push(pid);
        if self.inner.kill_pending.swap(false, Ordering::SeqCst) {
            tracing::info!(pid, "Applying deferred kill");
            kill_process(pid);
        }
        drop(running);
        ProcessRegistration {
            token: self.clone(),
            pid,
        }
    }

    /// Number of external processes currently registered.
    pub fn running_processes(&self) -> usize {
        self.lock_running().len()
    }

    fn unregister(&self, pid: u32) {
        let mut running = self.lock_running();
        if let Some(pos) = running.iter().position(|p| *p == pid) {
            running.swap_remove(pos);
        }
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Vec<u32>> {
        self.inner
            .running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProcessRegistration {
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for ProcessRegistration {
    fn drop(&mut self) {
        self.token.unregister(self.pid);
    }
}

#[cfg(unix)]
fn kill_process(pid: u32) {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(raw, libc::SIGKILL) };
    if rc == 0 {
        tracing::info!(pid, "Killed external process");
    } else {
        tracing::warn!(pid, error = %std::io::Error::last_os_error(), "Failed to kill external process");
    }
}

#[cfg(not(unix))]
fn kill_process(pid: u32) {
    let status = std::process::Command::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .status();
    match status {
        Ok(s) if s.success() => tracing::info!(pid, "Killed external process"),
        Ok(s) => tracing::warn!(pid, status = %s, "taskkill failed"),
        Err(e) => tracing::warn!(pid, error = %e, "taskkill failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_sets_flag_and_check_fails() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        token.request_stop();
        assert!(token.is_stopped());
        assert!(matches!(token.check(), Err(DeidError::Cancelled)));
    }

    #[test]
    fn test_clone_shares_state() {
        let token = CancelToken::new();
        let other = token.clone();
        other.request_stop();
        assert!(token.is_stopped());
    }

    #[test]
    fn test_registration_drops_out() {
        let token = CancelToken::new();
        {
            let _reg = token.register_process(u32::MAX);
            assert_eq!(token.running_processes(), 1);
        }
        assert_eq!(token.running_processes(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_deferred_kill_applies_to_next_process() {
        let token = CancelToken::new();
        token.request_kill();

        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let _reg = token.register_process(child.id());
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_terminates_running_process() {
        let token = CancelToken::new();
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let _reg = token.register_process(child.id());
        token.request_kill();
        let status = child.wait().unwrap();
        assert!(!status.success());
        assert!(token.is_stopped());
    }
}
