use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::auth::Caller;
use crate::db::Store;
use crate::error::{CoreError, CoreResult};
use crate::ipc::error::{core_err, err, ok};
use crate::ipc::types::{AppState, Request};

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

pub fn required_bool(req: &Request, key: &str) -> Result<bool, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn store<'a>(state: &'a AppState, req: &Request) -> Result<&'a Store, Value> {
    state
        .store
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// The verified identity the host attaches as `params.caller`.
pub fn caller(req: &Request) -> Result<Caller, Value> {
    let unauthorized = |msg: &str| {
        let e = CoreError::Unauthorized(msg.to_string());
        core_err(&req.id, &e)
    };
    let Some(raw) = req.params.get("caller") else {
        return Err(unauthorized("missing caller"));
    };
    serde_json::from_value(raw.clone()).map_err(|_| unauthorized("malformed caller"))
}

/// Deserializes the whole params object into `T`; extra keys are ignored.
pub fn parse_params<T: DeserializeOwned>(req: &Request) -> Result<T, Value> {
    serde_json::from_value(req.params.clone())
        .map_err(|e| err(&req.id, "bad_params", format!("invalid params: {e}"), None))
}

pub fn reply<T: Serialize>(req: &Request, result: CoreResult<T>) -> Value {
    match result {
        Ok(v) => match serde_json::to_value(v) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => core_err(&req.id, &e),
    }
}
