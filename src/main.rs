mod ai;
mod backup;
mod config;
mod error;
mod ipc;
mod kv;
mod model;
mod persist;
mod store;
mod views;
mod workspace;

use std::io::{self, BufRead, Stdout, Write};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Logs go to stderr; stdout carries only protocol lines.
fn init_tracing() {
    let filter = std::env::var("SCHOOLD_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .with_writer(io::stderr)
        .try_init();
}

fn write_line(out: &Mutex<Stdout>, resp: &serde_json::Value) {
    let line = serde_json::to_string(resp).unwrap_or_else(|_| "{\"ok\":false}".to_string());
    // A poisoned lock only means another writer panicked mid-line.
    let mut stdout = out.lock().unwrap_or_else(|p| p.into_inner());
    let _ = writeln!(stdout, "{}", line);
    let _ = stdout.flush();
}

fn join_logged(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        warn!("background request panicked");
    }
}

fn reap_finished(pending: &mut Vec<JoinHandle<()>>) {
    let (done, running): (Vec<_>, Vec<_>) =
        pending.drain(..).partition(|h| h.is_finished());
    *pending = running;
    done.into_iter().for_each(join_logged);
}

fn main() {
    init_tracing();

    let mut state = ipc::AppState::new(config::Settings::from_env());
    let out = Arc::new(Mutex::new(io::stdout()));
    let mut pending: Vec<JoinHandle<()>> = Vec::new();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                write_line(
                    &out,
                    &serde_json::json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    }),
                );
                continue;
            }
        };
        debug!(id = %req.id, method = %req.method, "request");

        match ipc::handle_request(&mut state, req) {
            ipc::Reply::Ready(resp) => write_line(&out, &resp),
            ipc::Reply::Deferred(job) => {
                let out = Arc::clone(&out);
                reap_finished(&mut pending);
                pending.push(thread::spawn(move || write_line(&out, &job())));
            }
        }
    }

    pending.into_iter().for_each(join_logged);
}
