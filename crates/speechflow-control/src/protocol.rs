//! Wire protocol for the control surface (spec §4.8, §8 S5): the request
//! and response envelopes exchanged over HTTP and broadcast over the
//! WebSocket, plus the structural validation spec.md asks for ("request
//! has the three keys with correct types").

use serde::{Deserialize, Serialize};
use speechflow_core::params::ParamValue;

/// `POST /api` body: `{request:"COMMAND", node:<id>, args:[…]}`. `request`
/// is checked against the literal string `"COMMAND"` at the handler, since
/// it is the only request kind this surface defines.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub request: String,
    pub node: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

/// `{response:"OK"}` (200) or `{response:"ERROR", data:<msg>}` (417).
#[derive(Debug, Serialize)]
#[serde(tag = "response")]
pub enum CommandResponse {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error { data: String },
}

/// A node's `send-response` event, broadcast to every connected WebSocket
/// peer as `{response:"NOTIFY", node, args}` (spec §4.8, §8 S5).
#[derive(Debug, Clone, Serialize)]
pub struct NotifyMessage {
    pub response: &'static str,
    pub node: String,
    pub args: serde_json::Value,
}

impl NotifyMessage {
    pub fn new(node: String, args: serde_json::Value) -> Self {
        Self { response: "NOTIFY", node, args }
    }
}

/// Reject a request whose `args` entries aren't primitives a [`ParamValue`]
/// can represent — arrays, objects, and `null` have no node-parameter
/// equivalent.
pub fn args_to_param_values(args: &[serde_json::Value]) -> Result<Vec<ParamValue>, String> {
    args.iter()
        .map(|value| match value {
            serde_json::Value::String(s) => Ok(ParamValue::String(s.clone())),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(ParamValue::Number)
                .ok_or_else(|| format!("argument {n} is not representable as f64")),
            serde_json::Value::Bool(b) => Ok(ParamValue::Boolean(*b)),
            other => Err(format!("argument {other} is not a string, number, or boolean")),
        })
        .collect()
}

/// Parse the `/api/COMMAND/<node>/<arg0>/<arg1>/...` path form into the
/// same string-typed args the POST form would carry after `/api/COMMAND/<node>`.
pub fn path_segments_to_args(tail: &str) -> Vec<serde_json::Value> {
    if tail.is_empty() {
        return Vec::new();
    }
    tail.split('/').filter(|s| !s.is_empty()).map(|s| serde_json::Value::String(s.to_string())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_array_typed_argument() {
        let args = vec![serde_json::json!(["nested"])];
        let err = args_to_param_values(&args).unwrap_err();
        assert!(err.contains("not a string"));
    }

    #[test]
    fn converts_primitive_arguments() {
        let args = vec![serde_json::json!("mode"), serde_json::json!(2.5), serde_json::json!(true)];
        let bound = args_to_param_values(&args).unwrap();
        assert_eq!(bound[0], ParamValue::String("mode".into()));
        assert_eq!(bound[1], ParamValue::Number(2.5));
        assert_eq!(bound[2], ParamValue::Boolean(true));
    }

    #[test]
    fn path_tail_splits_on_slash() {
        let args = path_segments_to_args("mode/silenced");
        assert_eq!(args, vec![serde_json::json!("mode"), serde_json::json!("silenced")]);
    }

    #[test]
    fn empty_path_tail_is_no_args() {
        assert!(path_segments_to_args("").is_empty());
    }
}
