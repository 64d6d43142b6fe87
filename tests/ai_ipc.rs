use serde_json::json;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar(env: &[(&str, &str)]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .env_remove("GEMINI_API_KEY")
        .env_remove("API_KEY")
        .env_remove("SCHOOLD_AI_ENDPOINT")
        .env_remove("SCHOOLD_AI_MODEL")
        .env_remove("HTTP_PROXY")
        .env_remove("http_proxy")
        .env_remove("HTTPS_PROXY")
        .env_remove("https_proxy")
        .env_remove("ALL_PROXY")
        .env_remove("all_proxy")
        .envs(env.iter().copied())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .cloned()
            .unwrap_or_else(|| json!({ "code": "unknown" }))
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> String {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

#[derive(Debug, Clone)]
struct Captured {
    path: String,
    api_key: Option<String>,
    body: serde_json::Value,
}

struct CannedReply {
    status: u16,
    body: String,
    delay: Duration,
}

fn reply(status: u16, body: serde_json::Value) -> CannedReply {
    CannedReply {
        status,
        body: body.to_string(),
        delay: Duration::ZERO,
    }
}

fn text_reply(text: &str) -> CannedReply {
    reply(
        200,
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }),
    )
}

/// Serves one canned reply per connection, in order, then stops.
fn fake_gemini(replies: Vec<CannedReply>) -> (String, Arc<Mutex<Vec<Captured>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake server");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_server = Arc::clone(&seen);
    thread::spawn(move || {
        for canned in replies {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut request_line = String::new();
            reader.read_line(&mut request_line).expect("request line");
            let path = request_line
                .split_whitespace()
                .nth(1)
                .unwrap_or("")
                .to_string();
            let mut content_length = 0usize;
            let mut api_key = None;
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).expect("header line");
                let header = header.trim_end();
                if header.is_empty() {
                    break;
                }
                if let Some((name, value)) = header.split_once(':') {
                    let name = name.trim().to_ascii_lowercase();
                    if name == "content-length" {
                        content_length = value.trim().parse().unwrap_or(0);
                    } else if name == "x-goog-api-key" {
                        api_key = Some(value.trim().to_string());
                    }
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).expect("request body");
            seen_by_server.lock().expect("lock").push(Captured {
                path,
                api_key,
                body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
            });

            thread::sleep(canned.delay);
            let mut stream = stream;
            let _ = write!(
                stream,
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                canned.status,
                if canned.status == 200 { "OK" } else { "Error" },
                canned.body.len(),
                canned.body
            );
            let _ = stream.flush();
        }
    });
    (base, seen)
}

fn select(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        "select",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    )
}

#[test]
fn missing_key_reports_ai_unavailable_without_network() {
    let workspace = temp_dir("schoold-ai-nokey");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[]);
    select(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "ai.reportComment",
        json!({ "performance": "Math: A" }),
    );
    assert_eq!(error_code(&resp), "ai_unavailable");

    let empty = request(
        &mut stdin,
        &mut reader,
        "2",
        "ai.communicationDraft",
        json!({ "topic": "  " }),
    );
    assert_eq!(error_code(&empty), "bad_params");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn fee_calculator_joins_quote_with_roster() {
    let workspace = temp_dir("schoold-ai-fee");
    let quote = json!({
        "studentName": "alice johnson",
        "month": "August",
        "breakdown": { "tuition": 400, "sports": 50, "library": 25, "discount": -25, "lateFee": 0 },
        "total": 450
    });
    let stranger = json!({
        "studentName": "Zed Unknown",
        "month": "August",
        "breakdown": { "tuition": 400, "sports": 0, "library": 0, "discount": 0, "lateFee": 0 },
        "total": 500
    });
    let (base, seen) = fake_gemini(vec![
        text_reply(&format!("```json\n{}\n```", quote)),
        text_reply(&stranger.to_string()),
    ]);
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[
        ("GEMINI_API_KEY", "test-key"),
        ("SCHOOLD_AI_ENDPOINT", base.as_str()),
    ]);

    let no_ws = request(
        &mut stdin,
        &mut reader,
        "0",
        "ai.calculateFee",
        json!({ "prompt": "Alice Johnson, August" }),
    );
    assert_eq!(error_code(&no_ws), "no_workspace");

    select(&mut stdin, &mut reader, &workspace);
    let voucher = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "ai.calculateFee",
        json!({ "prompt": "Alice Johnson, August, 25 discount" }),
    );
    let voucher = &voucher["voucher"];
    assert_eq!(voucher["studentId"], json!("S001"));
    assert_eq!(voucher["className"], json!("5-A"));
    assert_eq!(voucher["rollNumber"], json!("12"));
    assert_eq!(voucher["total"], json!(450.0));
    assert_eq!(voucher["consistent"], json!(true));
    assert_eq!(voucher["breakdown"]["discount"], json!(-25.0));

    let unknown = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "ai.calculateFee",
        json!({ "prompt": "Zed, August" }),
    );
    assert_eq!(unknown["voucher"]["studentId"], serde_json::Value::Null);
    assert_eq!(unknown["voucher"]["className"], json!("N/A"));
    assert_eq!(unknown["voucher"]["rollNumber"], json!("N/A"));
    assert_eq!(unknown["voucher"]["consistent"], json!(false));

    let seen = seen.lock().expect("lock").clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[0].path,
        "/v1beta/models/gemini-2.5-flash:generateContent"
    );
    assert_eq!(seen[0].api_key.as_deref(), Some("test-key"));
    assert_eq!(
        seen[0].body["generationConfig"]["responseMimeType"],
        json!("application/json")
    );
    assert!(seen[0].body["generationConfig"]["responseSchema"].is_object());
    assert!(seen[0].body["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap_or("")
        .contains("25 discount"));

    // Vouchers are display-only.
    let fees = request_ok(&mut stdin, &mut reader, "3", "fees.list", json!({}));
    assert_eq!(fees["total"], json!(2));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn text_generators_return_trimmed_text_and_map_failures() {
    let (base, seen) = fake_gemini(vec![
        text_reply("  Alice shows steady progress in math.\n"),
        text_reply("Dear parents,\nSports day is on Friday."),
        reply(500, json!({ "error": { "message": "boom" } })),
        reply(200, json!({ "candidates": [] })),
    ]);
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[
        ("GEMINI_API_KEY", "test-key"),
        ("SCHOOLD_AI_ENDPOINT", base.as_str()),
        ("SCHOOLD_AI_MODEL", "test-model"),
    ]);

    let comment = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "ai.reportComment",
        json!({ "performance": "Math: A, Science: B" }),
    );
    assert_eq!(comment["text"], json!("Alice shows steady progress in math."));

    let draft = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "ai.communicationDraft",
        json!({ "topic": "Sports day" }),
    );
    assert_eq!(draft["text"], json!("Dear parents,\nSports day is on Friday."));

    let failed = request(
        &mut stdin,
        &mut reader,
        "3",
        "ai.reportComment",
        json!({ "performance": "x" }),
    );
    assert_eq!(error_code(&failed), "ai_failed");

    let empty = request(
        &mut stdin,
        &mut reader,
        "4",
        "ai.communicationDraft",
        json!({ "topic": "y" }),
    );
    assert_eq!(error_code(&empty), "ai_failed");

    let seen = seen.lock().expect("lock").clone();
    assert_eq!(seen[0].path, "/v1beta/models/test-model:generateContent");
    assert_eq!(
        seen[0].body["generationConfig"]["thinkingConfig"]["thinkingBudget"],
        json!(0)
    );
    assert!(seen[1].body.get("generationConfig").is_none());
    assert!(seen[1].body["systemInstruction"]["parts"][0]["text"].is_string());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn slow_generation_does_not_block_other_requests() {
    let workspace = temp_dir("schoold-ai-slow");
    let (base, _seen) = fake_gemini(vec![CannedReply {
        delay: Duration::from_millis(1500),
        ..text_reply("A kind comment.")
    }]);
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[
        ("GEMINI_API_KEY", "test-key"),
        ("SCHOOLD_AI_ENDPOINT", base.as_str()),
    ]);
    select(&mut stdin, &mut reader, &workspace);

    for (id, method, params) in [
        ("slow", "ai.reportComment", json!({ "performance": "Reading: B" })),
        ("fast", "students.list", json!({})),
    ] {
        let payload = json!({ "id": id, "method": method, "params": params });
        writeln!(stdin, "{}", payload).expect("write request");
    }
    stdin.flush().expect("flush requests");

    let mut ids = Vec::new();
    for _ in 0..2 {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read response line");
        let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value["ok"], json!(true), "{}", value);
        ids.push(value["id"].as_str().unwrap_or("").to_string());
    }
    assert_eq!(ids, vec!["fast", "slow"]);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn stalled_service_times_out() {
    let workspace = temp_dir("schoold-ai-timeout");
    let (base, _seen) = fake_gemini(vec![CannedReply {
        delay: Duration::from_secs(4),
        ..text_reply("too late")
    }]);
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[
        ("GEMINI_API_KEY", "test-key"),
        ("SCHOOLD_AI_ENDPOINT", base.as_str()),
    ]);
    select(&mut stdin, &mut reader, &workspace);
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "settings.update",
        json!({ "patch": { "ai": { "timeoutSecs": 1 } } }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "ai.reportComment",
        json!({ "performance": "History: C" }),
    );
    assert_eq!(error_code(&resp), "ai_failed");

    drop(stdin);
    let _ = child.wait();
}
