//! External control surface (C8): a small HTTP + WebSocket endpoint that
//! translates `{request:"COMMAND", node, args}` into
//! `ControlHandle::receive_request` calls and broadcasts every node's
//! `send-response` event to connected WebSocket peers as
//! `{response:"NOTIFY", node, args}` (spec §4.8).

pub mod handlers;
pub mod protocol;
pub mod routes;
pub mod server;
pub mod state;
pub mod ws;

pub use protocol::{CommandRequest, CommandResponse, NotifyMessage};
pub use server::ControlServer;
pub use state::AppState;
