use crate::ai::{self, GeminiClient};
use crate::ipc::error::{ai_err, ok, store_err};
use crate::ipc::helpers::{require_data, required_non_empty};
use crate::ipc::types::{AppState, Reply, Request};
use serde_json::json;
use tracing::info;

fn client(state: &AppState, req: &Request) -> Result<GeminiClient, serde_json::Value> {
    GeminiClient::from_settings(&state.settings.ai).map_err(|e| ai_err(&req.id, &e))
}

fn handle_ai_calculate_fee(state: &mut AppState, req: &Request) -> Reply {
    let prompt = match required_non_empty(req, "prompt") {
        Ok(v) => v,
        Err(resp) => return Reply::Ready(resp),
    };
    let generator = match client(state, req) {
        Ok(c) => c,
        Err(resp) => return Reply::Ready(resp),
    };
    let data = match require_data(state, req) {
        Ok(d) => d,
        Err(resp) => return Reply::Ready(resp),
    };
    let students = match data.store.snapshot() {
        Ok(s) => s.students.to_vec(),
        Err(e) => return Reply::Ready(store_err(&req.id, &e)),
    };

    let id = req.id.clone();
    info!(request_id = %id, "fee calculation queued");
    Reply::Deferred(Box::new(move || {
        match ai::calculate_fee(&generator, &prompt, &students) {
            Ok(voucher) => ok(&id, json!({ "voucher": voucher })),
            Err(e) => ai_err(&id, &e),
        }
    }))
}

fn handle_ai_text(
    state: &mut AppState,
    req: &Request,
    param: &str,
    generate: fn(&dyn ai::TextGenerator, &str) -> Result<String, crate::error::AiError>,
) -> Reply {
    let input = match required_non_empty(req, param) {
        Ok(v) => v,
        Err(resp) => return Reply::Ready(resp),
    };
    let generator = match client(state, req) {
        Ok(c) => c,
        Err(resp) => return Reply::Ready(resp),
    };

    let id = req.id.clone();
    info!(request_id = %id, method = %req.method, "text generation queued");
    Reply::Deferred(Box::new(move || match generate(&generator, &input) {
        Ok(text) => ok(&id, json!({ "text": text })),
        Err(e) => ai_err(&id, &e),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Reply> {
    match req.method.as_str() {
        "ai.calculateFee" => Some(handle_ai_calculate_fee(state, req)),
        "ai.reportComment" => Some(handle_ai_text(state, req, "performance", ai::report_comment)),
        "ai.communicationDraft" => {
            Some(handle_ai_text(state, req, "topic", ai::communication_draft))
        }
        _ => None,
    }
}
