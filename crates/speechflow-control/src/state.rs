//! Shared application state (spec §4.8), mirroring the teacher's
//! `orchestrator::api::routes::AppState`: a thin, `Clone`-able struct of
//! `Arc`s the handlers read from, built once in [`crate::server`].

use speechflow_core::executor::NotifyBroadcast;
use speechflow_core::registry::NodeRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub nodes: Arc<NodeRegistry>,
    pub notify: NotifyBroadcast,
}
