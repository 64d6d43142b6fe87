use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::workspace::SchoolData;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.data.as_ref().map(|d| d.path.to_string_lossy().to_string()),
            "loading": state.data.as_ref().map(|d| d.store.is_loading()),
            "revision": state.data.as_ref().map(|d| d.store.revision()),
            "aiConfigured": state.settings.ai.api_key.is_some()
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    // Drop the old workspace first so nothing can persist into it mid-switch.
    state.data = None;
    state.fee_records.clear();

    match SchoolData::open(&path) {
        Ok(mut data) => {
            let mut settings = data.load_settings();
            settings.apply_env(|k| std::env::var(k).ok());
            data.apply_settings(&settings);
            let result = json!({
                "workspacePath": path.to_string_lossy(),
                "students": data.store.students().len(),
                "fees": data.store.fees().len(),
                "studentsSource": data.students_source.as_str(),
                "feesSource": data.fees_source.as_str(),
            });
            state.settings = settings;
            state.data = Some(data);
            ok(&req.id, result)
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
