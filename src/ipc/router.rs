use super::handlers;
use super::types::{AppState, Reply, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> Reply {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return Reply::Ready(resp);
    }
    if let Some(resp) = handlers::students::try_handle(state, &req) {
        return Reply::Ready(resp);
    }
    if let Some(resp) = handlers::fees::try_handle(state, &req) {
        return Reply::Ready(resp);
    }
    if let Some(resp) = handlers::dashboard::try_handle(state, &req) {
        return Reply::Ready(resp);
    }
    if let Some(reply) = handlers::ai::try_handle(state, &req) {
        return reply;
    }
    if let Some(resp) = handlers::settings::try_handle(state, &req) {
        return Reply::Ready(resp);
    }
    if let Some(resp) = handlers::backup::try_handle(state, &req) {
        return Reply::Ready(resp);
    }

    Reply::Ready(err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    ))
}
