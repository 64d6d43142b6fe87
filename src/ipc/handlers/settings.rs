use crate::config::Settings;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::require_data;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use tracing::info;

fn settings_view(settings: &Settings) -> Value {
    let mut v = serde_json::to_value(settings).unwrap_or_else(|_| json!({}));
    v["aiConfigured"] = json!(settings.ai.api_key.is_some());
    v
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> Value {
    ok(&req.id, settings_view(&state.settings))
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> Value {
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch object", None);
    };
    let data = match require_data(state, req) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    // Patch the stored settings, not the effective ones, so environment
    // overrides never get written to disk.
    let mut stored = data.load_settings();
    for (section, fields) in patch {
        let Some(fields) = fields.as_object() else {
            return err(
                &req.id,
                "bad_params",
                format!("patch.{} must be an object", section),
                None,
            );
        };
        if let Err(message) = stored.apply_patch(section, fields) {
            return err(
                &req.id,
                "bad_params",
                message,
                Some(json!({ "section": section })),
            );
        }
    }
    if let Err(e) = data.save_settings(&stored) {
        return err(&req.id, "db_update_failed", format!("{e:?}"), None);
    }

    let mut effective = stored;
    effective.apply_env(|k| std::env::var(k).ok());
    data.apply_settings(&effective);
    info!(sections = ?patch.keys().collect::<Vec<_>>(), "settings updated");
    let resp = ok(&req.id, settings_view(&effective));
    state.settings = effective;
    resp
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        _ => None,
    }
}
