//! Call/response frame codec.
//!
//! Frames are JSON objects shaped like JSON-RPC 1.0:
//! request `{"id": any, "method": "Service.Exec", "params": [..]}`,
//! response `{"id": any, "result": any|null, "error": {code,message}|null}`,
//! server push `{"id": null, "method": "job.status", "params": [Job]}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::JobError;
use crate::job::{Job, JobId};

/// Method name of server-pushed job status notifications.
pub const STATUS_EVENT: &str = "job.status";

/// A decoded call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallFrame {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Structured error carried in a response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

impl RpcError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new("ParseError", message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new("MethodNotFound", format!("unknown method: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new("InvalidRequest", message)
    }
}

impl From<JobError> for RpcError {
    fn from(e: JobError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

/// Exactly one of `result` / `error` is non-null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: Value,
    pub result: Value,
    pub error: Option<RpcError>,
}

impl ResponseFrame {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    pub fn err(id: Value, error: RpcError) -> Self {
        Self {
            id,
            result: Value::Null,
            error: Some(error),
        }
    }
}

#[derive(Serialize)]
struct Notification<'a, T: Serialize> {
    id: Value,
    method: &'a str,
    params: [T; 1],
}

/// Decode one call frame. Malformed input maps to `ParseError`.
pub fn decode_call(frame: &str) -> Result<CallFrame, RpcError> {
    serde_json::from_str(frame).map_err(|e| RpcError::parse_error(e.to_string()))
}

pub fn encode_response(response: &ResponseFrame) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        // Only reachable with non-string map keys in `result`.
        format!(
            r#"{{"id":null,"result":null,"error":{{"code":"InternalError","message":"{}"}}}}"#,
            e
        )
    })
}

/// Encode a `job.status` push for `job`.
pub fn encode_status_event(job: &Job) -> String {
    let note = Notification {
        id: Value::Null,
        method: STATUS_EVENT,
        params: [job],
    };
    serde_json::to_string(&note).unwrap_or_default()
}

/// First positional argument, or the keyed object itself.
pub fn first_param(params: &Value) -> Value {
    match params {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// Decode the first parameter as `T`.
pub fn param<T: DeserializeOwned>(params: &Value) -> Result<T, RpcError> {
    match first_param(params) {
        Value::Null => Err(RpcError::invalid_params("missing parameters")),
        v => serde_json::from_value(v).map_err(|e| RpcError::invalid_params(e.to_string())),
    }
}

/// Job id argument: a bare string or an object with an `id`/`Id` field.
pub fn id_param(params: &Value) -> Result<JobId, RpcError> {
    let value = first_param(params);
    let id = match &value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map
            .get("id")
            .or_else(|| map.get("Id"))
            .or_else(|| map.get("ID"))
            .and_then(Value::as_str),
        _ => None,
    };
    match id.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(RpcError::invalid_params("missing job id")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{DownloadRequest, JobKind};
    use serde_json::json;

    #[test]
    fn decodes_positional_call() {
        let call =
            decode_call(r#"{"id":7,"method":"Service.Exec","params":[{"URL":"https://a/b"}]}"#)
                .unwrap();
        assert_eq!(call.id, json!(7));
        assert_eq!(call.method, "Service.Exec");
        let req: DownloadRequest = param(&call.params).unwrap();
        assert_eq!(req.url, "https://a/b");
    }

    #[test]
    fn missing_params_default_to_null() {
        let call = decode_call(r#"{"method":"Service.Running"}"#).unwrap();
        assert_eq!(call.id, Value::Null);
        assert_eq!(call.params, Value::Null);
    }

    #[test]
    fn malformed_frame_is_parse_error() {
        let e = decode_call("{not json").unwrap_err();
        assert_eq!(e.code, "ParseError");
        let e = decode_call(r#"{"id":1}"#).unwrap_err();
        assert_eq!(e.code, "ParseError");
    }

    #[test]
    fn id_param_accepts_string_or_object() {
        assert_eq!(id_param(&json!(["abc"])).unwrap(), "abc");
        assert_eq!(id_param(&json!([{"id": "abc"}])).unwrap(), "abc");
        assert_eq!(id_param(&json!({"Id": "abc"})).unwrap(), "abc");
        assert_eq!(id_param(&json!([])).unwrap_err().code, "InvalidRequest");
        assert_eq!(id_param(&json!([{"id": " "}])).unwrap_err().code, "InvalidRequest");
    }

    #[test]
    fn response_has_exactly_one_of_result_and_error() {
        let ok = encode_response(&ResponseFrame::ok(json!(1), json!("id-1")));
        let v: Value = serde_json::from_str(&ok).unwrap();
        assert_eq!(v, json!({"id": 1, "result": "id-1", "error": null}));

        let err = encode_response(&ResponseFrame::err(
            json!(2),
            JobError::NotFound("x".into()).into(),
        ));
        let v: Value = serde_json::from_str(&err).unwrap();
        assert_eq!(v["result"], Value::Null);
        assert_eq!(v["error"]["code"], "NotFound");
        assert_eq!(v["id"], 2);
    }

    #[test]
    fn status_event_wraps_job() {
        let job = Job::new(JobKind::Single, DownloadRequest::for_url("https://a/b"));
        let v: Value = serde_json::from_str(&encode_status_event(&job)).unwrap();
        assert_eq!(v["method"], STATUS_EVENT);
        assert_eq!(v["id"], Value::Null);
        assert_eq!(v["params"][0]["id"], json!(job.id));
        assert_eq!(v["params"][0]["status"], "pending");
    }
}
