//! Shutdown orchestrator (spec §4.9), grounded directly on the teacher's
//! `orca::shutdown::ShutdownCoordinator`: an idempotent, `Notify`-backed
//! trigger that either the executor (all nodes finished) or a process
//! signal can fire exactly once, followed by the fixed close sequence.

use crate::node::Node;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// What caused shutdown to begin, which in turn decides the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// All finish watchers fired: the graph ran its course.
    Finished,
    /// SIGINT or SIGTERM.
    Signal,
    /// An explicit user-initiated stop (e.g. via the control surface).
    User,
}

impl ShutdownReason {
    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownReason::Finished => 0,
            ShutdownReason::Signal | ShutdownReason::User => 1,
        }
    }
}

/// Anything that must stop accepting new work before nodes are closed —
/// namely the HTTP/WS control surface (spec §4.9 step 1). Kept as a trait
/// here so `speechflow-core` doesn't need to depend on `speechflow-control`.
#[async_trait::async_trait]
pub trait Stoppable: Send + Sync {
    async fn stop(&self);
}

/// Fires exactly once no matter how many callers race to trigger it, the
/// same guarantee `orca::shutdown` gives the rest of that codebase.
pub struct ShutdownCoordinator {
    triggered: AtomicBool,
    reason: Mutex<Option<ShutdownReason>>,
    notify: Notify,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            reason: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Request shutdown for `reason`. A second or later call, for any
    /// reason, is a no-op: only the first trigger is recorded.
    pub fn trigger(&self, reason: ShutdownReason) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            *self.reason.lock().expect("shutdown reason mutex poisoned") = Some(reason);
            self.notify.notify_waiters();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.reason.lock().expect("shutdown reason mutex poisoned")
    }

    /// Wait until shutdown has been triggered by any path. Returns
    /// immediately if it already has.
    pub async fn wait(&self) -> ShutdownReason {
        loop {
            if let Some(reason) = self.reason() {
                return reason;
            }
            self.notify.notified().await;
        }
    }

    /// Spawn tasks that trigger [`ShutdownReason::Signal`] on SIGINT/SIGTERM.
    pub fn install_signal_handlers(self: &std::sync::Arc<Self>) {
        let coordinator = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                coordinator.trigger(ShutdownReason::Signal);
            }
        });

        #[cfg(unix)]
        {
            let coordinator = std::sync::Arc::clone(self);
            tokio::spawn(async move {
                if let Ok(mut term) =
                    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                {
                    term.recv().await;
                    coordinator.trigger(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the fixed shutdown sequence from spec §4.9, steps 1, 3 and 4
/// (edges are unpiped by the executor dropping their channel halves
/// before this is called, covering step 2). Each node's `close()` is
/// shielded: an error is logged and swallowed rather than propagated, so
/// one misbehaving node can never block the rest of teardown.
pub async fn run_shutdown_sequence(
    control_surfaces: &[std::sync::Arc<dyn Stoppable>],
    mut nodes: Vec<(String, Box<dyn Node>)>,
) {
    for surface in control_surfaces {
        surface.stop().await;
    }

    // Close in reverse construction order, mirroring the open-failure
    // rollback order in the executor.
    while let Some((id, mut node)) = nodes.pop() {
        if let Err(err) = node.close().await {
            tracing::warn!(node = %id, error = %err, "node close failed during shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_trigger_does_not_overwrite_reason() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.trigger(ShutdownReason::Finished);
        coordinator.trigger(ShutdownReason::Signal);
        assert_eq!(coordinator.reason(), Some(ShutdownReason::Finished));
    }

    #[test]
    fn exit_code_matches_reason() {
        assert_eq!(ShutdownReason::Finished.exit_code(), 0);
        assert_eq!(ShutdownReason::Signal.exit_code(), 1);
        assert_eq!(ShutdownReason::User.exit_code(), 1);
    }

    #[tokio::test]
    async fn wait_returns_immediately_if_already_triggered() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.trigger(ShutdownReason::Finished);
        let reason = coordinator.wait().await;
        assert_eq!(reason, ShutdownReason::Finished);
    }
}
