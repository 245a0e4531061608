//! Control surface server (spec §4.8, §4.9 step 1): binds the router to an
//! address and serves it until [`Stoppable::stop`] fires, the same
//! graceful-shutdown pattern as the teacher's `orchestrator-server.rs`
//! `shutdown_signal()` future, except triggered by the shared
//! [`ShutdownCoordinator`](speechflow_core::shutdown::ShutdownCoordinator)
//! instead of its own signal handlers.

use crate::routes::router;
use crate::state::AppState;
use async_trait::async_trait;
use speechflow_core::executor::NotifyBroadcast;
use speechflow_core::registry::NodeRegistry;
use speechflow_core::shutdown::Stoppable;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub struct ControlServer {
    stop_notify: Notify,
    stopped: AtomicBool,
}

impl ControlServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { stop_notify: Notify::new(), stopped: AtomicBool::new(false) })
    }

    /// Bind `addr` and serve the control surface until `stop()` is called
    /// or a fatal I/O error occurs.
    pub async fn serve(
        self: &Arc<Self>,
        addr: SocketAddr,
        nodes: Arc<NodeRegistry>,
        notify: NotifyBroadcast,
    ) -> std::io::Result<()> {
        let state = AppState { nodes, notify };
        let app = router(state);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "control surface listening");

        let server = Arc::clone(self);
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                server.stop_notify.notified().await;
            })
            .await
    }
}

#[async_trait]
impl Stoppable for ControlServer {
    async fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.stop_notify.notify_waiters();
        }
    }
}
