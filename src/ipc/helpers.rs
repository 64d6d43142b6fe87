use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::workspace::SchoolData;
use serde_json::Value;

pub fn require_data<'a>(state: &'a mut AppState, req: &Request) -> Result<&'a mut SchoolData, Value> {
    state
        .data
        .as_mut()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) => Ok(v.trim().to_string()),
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

pub fn required_non_empty(req: &Request, key: &str) -> Result<String, Value> {
    let v = required_str(req, key)?;
    if v.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        ));
    }
    Ok(v)
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_f64(req: &Request, key: &str) -> Result<f64, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}
