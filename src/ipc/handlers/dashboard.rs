use crate::ipc::error::{ok, store_err};
use crate::ipc::helpers::require_data;
use crate::ipc::types::{AppState, Request};
use crate::views;
use serde_json::json;

fn handle_dashboard_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let data = match require_data(state, req) {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    let snapshot = match data.store.snapshot() {
        Ok(s) => s,
        Err(e) => return store_err(&req.id, &e),
    };
    let stats = views::dashboard_stats(snapshot.students, snapshot.fees);
    let classes = views::class_histogram(snapshot.students);
    ok(
        &req.id,
        json!({
            "stats": stats,
            "classHistogram": classes,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.summary" => Some(handle_dashboard_summary(state, req)),
        _ => None,
    }
}
