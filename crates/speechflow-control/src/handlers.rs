//! Request handlers (spec §4.8): translate a `COMMAND` request into a
//! [`ControlHandle::receive_request`](speechflow_core::node::ControlHandle)
//! call and report the outcome. Shared by both the POST and GET entry
//! points, which only differ in how they parse `node`/`args` out of the
//! request (spec.md's "two request shapes").

use crate::protocol::{args_to_param_values, path_segments_to_args, CommandRequest, CommandResponse};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

/// `POST /api` with `{request:"COMMAND", node, args}` in the body.
pub async fn command_post(State(state): State<AppState>, Json(body): Json<CommandRequest>) -> impl IntoResponse {
    if body.request != "COMMAND" {
        return error_response(format!("unsupported request kind '{}'", body.request));
    }
    dispatch(&state, &body.node, &body.args).await
}

/// `GET /api/COMMAND/<node>` — no arguments.
pub async fn command_get_bare(State(state): State<AppState>, Path(node): Path<String>) -> impl IntoResponse {
    dispatch(&state, &node, &[]).await
}

/// `GET /api/COMMAND/<node>/<arg0>/<arg1>/...`.
pub async fn command_get_with_args(
    State(state): State<AppState>,
    Path((node, tail)): Path<(String, String)>,
) -> impl IntoResponse {
    let args = path_segments_to_args(&tail);
    dispatch(&state, &node, &args).await
}

async fn dispatch(state: &AppState, node: &str, args: &[serde_json::Value]) -> axum::response::Response {
    let params = match args_to_param_values(args) {
        Ok(params) => params,
        Err(reason) => return error_response(reason).into_response(),
    };

    let Some(handle) = state.nodes.get(node) else {
        return error_response(format!("unknown node '{node}'")).into_response();
    };

    match handle.receive_request(params).await {
        Ok(()) => (StatusCode::OK, Json(CommandResponse::Ok)).into_response(),
        Err(err) => error_response(err.to_string()).into_response(),
    }
}

/// Spec §4.8: `{response:"ERROR", data:<msg>}`, HTTP 417.
fn error_response(message: String) -> impl IntoResponse {
    (StatusCode::EXPECTATION_FAILED, Json(CommandResponse::Error { data: message }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::NotifyMessage;
    use async_trait::async_trait;
    use speechflow_core::error::ExternalRequestError;
    use speechflow_core::node::ControlHandle;
    use speechflow_core::params::ParamValue;
    use speechflow_core::registry::NodeRegistry;
    use std::sync::Arc;

    struct EchoHandle;

    #[async_trait]
    impl ControlHandle for EchoHandle {
        async fn receive_request(&self, args: Vec<ParamValue>) -> Result<(), ExternalRequestError> {
            if args.is_empty() {
                return Err(ExternalRequestError::Malformed("no args".to_string()));
            }
            Ok(())
        }
    }

    fn test_state() -> AppState {
        let nodes = Arc::new(NodeRegistry::new());
        nodes.register("mute:0", Arc::new(EchoHandle));
        let (notify, _rx) = tokio::sync::broadcast::channel(8);
        AppState { nodes, notify }
    }

    #[tokio::test]
    async fn dispatch_to_unknown_node_fails() {
        let state = test_state();
        let response = dispatch(&state, "bogus:0", &[]).await;
        assert_eq!(response.status(), StatusCode::EXPECTATION_FAILED);
    }

    #[tokio::test]
    async fn dispatch_to_known_node_succeeds() {
        let state = test_state();
        let args = vec![serde_json::json!("mode")];
        let response = dispatch(&state, "mute:0", &args).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn notify_message_tags_response_field() {
        let msg = NotifyMessage::new("mute:0".to_string(), serde_json::json!(["mute", "mode", "silenced"]));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["response"], "NOTIFY");
        assert_eq!(json["node"], "mute:0");
    }
}
