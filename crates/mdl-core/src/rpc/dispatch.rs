//! Method table: maps a call's method name to a Dispatcher operation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use super::codec::{self, CallFrame, ResponseFrame, RpcError};
use crate::dispatcher::Dispatcher;
use crate::job::{DownloadRequest, JobKind};
use crate::worker::tool_version;

/// Wire protocol revision reported by `version`.
pub const PROTOCOL_VERSION: &str = "1";

type HandlerResult = Result<Value, RpcError>;
type Handler = for<'a> fn(&'a RpcDispatcher, Value) -> BoxFuture<'a, HandlerResult>;

/// Decodes calls, runs them against the Dispatcher and encodes the reply.
/// Both carriers share one instance.
pub struct RpcDispatcher {
    dispatcher: Dispatcher,
    tool: PathBuf,
    spawn_timeout: Duration,
    methods: HashMap<&'static str, Handler>,
}

impl RpcDispatcher {
    pub fn new(dispatcher: Dispatcher, tool: impl Into<PathBuf>, spawn_timeout: Duration) -> Self {
        let mut methods: HashMap<&'static str, Handler> = HashMap::new();
        methods.insert("exec", exec);
        methods.insert("execPlaylist", exec_playlist);
        methods.insert("execLivestream", exec_livestream);
        methods.insert("running", running);
        methods.insert("pending", pending);
        methods.insert("list", list);
        methods.insert("progress", progress);
        methods.insert("cancel", cancel);
        methods.insert("kill", cancel);
        methods.insert("cancelAll", cancel_all);
        methods.insert("killAll", cancel_all);
        methods.insert("clear", clear);
        methods.insert("version", version);
        Self {
            dispatcher,
            tool: tool.into(),
            spawn_timeout,
            methods,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Decode `frame`, run it and return the encoded response. Never fails:
    /// decode and method errors come back as error frames.
    pub async fn handle_frame(&self, frame: &str) -> String {
        let response = match codec::decode_call(frame) {
            Ok(call) => self.call(call).await,
            Err(e) => {
                tracing::debug!("undecodable frame: {}", e);
                ResponseFrame::err(Value::Null, e)
            }
        };
        codec::encode_response(&response)
    }

    pub async fn call(&self, call: CallFrame) -> ResponseFrame {
        let name = normalize_method(&call.method);
        let Some(handler) = self.methods.get(name.as_str()) else {
            tracing::debug!(method = %call.method, "unknown method");
            return ResponseFrame::err(call.id, RpcError::method_not_found(&call.method));
        };
        match handler(self, call.params).await {
            Ok(result) => ResponseFrame::ok(call.id, result),
            Err(e) => {
                tracing::debug!(method = %name, code = %e.code, "call failed: {}", e.message);
                ResponseFrame::err(call.id, e)
            }
        }
    }
}

/// `Service.ExecPlaylist` / `execPlaylist` / `ExecPlaylist` -> `execPlaylist`.
fn normalize_method(method: &str) -> String {
    let bare = method.strip_prefix("Service.").unwrap_or(method);
    let mut chars = bare.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn submit(rpc: &RpcDispatcher, kind: JobKind, params: &Value) -> Result<String, RpcError> {
    let source: DownloadRequest = codec::param(params)?;
    Ok(rpc.dispatcher.submit(kind, source)?)
}

fn exec(rpc: &RpcDispatcher, params: Value) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move { Ok(Value::String(submit(rpc, JobKind::Single, &params)?)) })
}

fn exec_playlist(rpc: &RpcDispatcher, params: Value) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        submit(rpc, JobKind::Playlist, &params)?;
        Ok(json!("ok"))
    })
}

fn exec_livestream(rpc: &RpcDispatcher, params: Value) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        submit(rpc, JobKind::Livestream, &params)?;
        Ok(json!("ok"))
    })
}

fn to_value<T: serde::Serialize>(v: T) -> HandlerResult {
    serde_json::to_value(v).map_err(|e| RpcError::new("InternalError", e.to_string()))
}

fn running(rpc: &RpcDispatcher, _params: Value) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move { to_value(rpc.dispatcher.running()) })
}

fn pending(rpc: &RpcDispatcher, _params: Value) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move { to_value(rpc.dispatcher.pending()) })
}

fn list(rpc: &RpcDispatcher, _params: Value) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move { to_value(rpc.dispatcher.list_all()) })
}

fn progress(rpc: &RpcDispatcher, params: Value) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let id = codec::id_param(&params)?;
        to_value(rpc.dispatcher.get(&id)?)
    })
}

fn cancel(rpc: &RpcDispatcher, params: Value) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let id = codec::id_param(&params)?;
        rpc.dispatcher.cancel(&id)?;
        Ok(json!("ok"))
    })
}

fn cancel_all(rpc: &RpcDispatcher, _params: Value) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move { Ok(json!(rpc.dispatcher.cancel_all())) })
}

fn clear(rpc: &RpcDispatcher, params: Value) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let id = codec::id_param(&params)?;
        rpc.dispatcher.clear(&id)?;
        Ok(json!("ok"))
    })
}

fn version(rpc: &RpcDispatcher, _params: Value) -> BoxFuture<'_, HandlerResult> {
    Box::pin(async move {
        let tool = tool_version(&rpc.tool, rpc.spawn_timeout).await?;
        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "toolVersion": tool,
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::normalize_method;

    #[test]
    fn method_names_normalize() {
        assert_eq!(normalize_method("Service.Exec"), "exec");
        assert_eq!(normalize_method("Service.ExecPlaylist"), "execPlaylist");
        assert_eq!(normalize_method("execLivestream"), "execLivestream");
        assert_eq!(normalize_method("KillAll"), "killAll");
        assert_eq!(normalize_method(""), "");
    }
}
