use serde_json::json;

use crate::error::CoreError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn core_err(id: &str, e: &CoreError) -> serde_json::Value {
    if e.status() < 500 {
        tracing::debug!(request_id = id, code = e.code(), error = %e, "request rejected");
    }
    err(id, e.code(), e.public_message(), Some(e.details()))
}
