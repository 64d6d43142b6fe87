use crate::backup::{self, BundleEntry};
use crate::config::{Settings, SETTINGS_KEY};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{require_data, required_non_empty};
use crate::ipc::types::{AppState, Request};
use crate::model::{Fee, Student};
use crate::persist::{FEES_KEY, STUDENTS_KEY};
use crate::workspace::SchoolData;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

/// Each entry must be a known key whose bytes decode as that key's type.
fn validate_entry(entry: &BundleEntry) -> Result<(), String> {
    let decoded = match entry.key.as_str() {
        STUDENTS_KEY => serde_json::from_slice::<Vec<Student>>(&entry.bytes).map(|_| ()),
        FEES_KEY => serde_json::from_slice::<Vec<Fee>>(&entry.bytes).map(|_| ()),
        SETTINGS_KEY => serde_json::from_slice::<Settings>(&entry.bytes).map(|_| ()),
        other => return Err(format!("unknown bundle entry: {}", other)),
    };
    decoded.map_err(|e| format!("{} does not decode: {}", entry.key, e))
}

struct ExportErr {
    code: &'static str,
    message: String,
    key: &'static str,
}

impl ExportErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, Some(json!({ "key": self.key })))
    }
}

/// Collections come from the live store, which may be running on seed data
/// the key-value file never saw. Settings are copied as stored.
fn bundle_entries(data: &SchoolData) -> Result<Vec<BundleEntry>, ExportErr> {
    let snapshot = data.store.snapshot().map_err(|e| ExportErr {
        code: e.code(),
        message: e.to_string(),
        key: STUDENTS_KEY,
    })?;
    let encode = |key: &'static str, bytes: serde_json::Result<Vec<u8>>| {
        bytes
            .map(|bytes| BundleEntry {
                key: key.to_string(),
                bytes,
            })
            .map_err(|e| ExportErr {
                code: "backup_failed",
                message: e.to_string(),
                key,
            })
    };
    let mut entries = vec![
        encode(STUDENTS_KEY, serde_json::to_vec(snapshot.students))?,
        encode(FEES_KEY, serde_json::to_vec(snapshot.fees))?,
    ];
    match data.read_entry(SETTINGS_KEY) {
        Ok(Some(bytes)) => entries.push(BundleEntry {
            key: SETTINGS_KEY.to_string(),
            bytes,
        }),
        Ok(None) => {}
        Err(e) => {
            return Err(ExportErr {
                code: "backup_failed",
                message: format!("{e:?}"),
                key: SETTINGS_KEY,
            })
        }
    }
    Ok(entries)
}

fn handle_backup_export_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match required_non_empty(req, "outPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let data = match require_data(state, req) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let entries = match bundle_entries(data) {
        Ok(v) => v,
        Err(resp) => return resp.response(&req.id),
    };

    let out = PathBuf::from(&out_path);
    match backup::export_bundle(&entries, &out) {
        Ok(summary) => {
            info!(path = %out_path, entries = summary.entry_count, "bundle exported");
            ok(
                &req.id,
                json!({
                    "path": out_path,
                    "bundleFormat": summary.bundle_format,
                    "entryCount": summary.entry_count
                }),
            )
        }
        Err(e) => err(
            &req.id,
            "backup_failed",
            format!("{e:?}"),
            Some(json!({ "path": out_path })),
        ),
    }
}

fn handle_backup_import_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match required_non_empty(req, "inPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let data = match require_data(state, req) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let src = PathBuf::from(&in_path);
    let entries = match backup::read_bundle(&src) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "backup_failed",
                format!("{e:?}"),
                Some(json!({ "path": in_path })),
            )
        }
    };
    for entry in &entries {
        if let Err(message) = validate_entry(entry) {
            return err(
                &req.id,
                "backup_failed",
                message,
                Some(json!({ "path": in_path, "key": entry.key })),
            );
        }
    }
    for entry in &entries {
        if let Err(e) = data.write_entry(&entry.key, &entry.bytes) {
            return err(
                &req.id,
                "backup_failed",
                format!("{e:?}"),
                Some(json!({ "key": entry.key })),
            );
        }
    }

    data.reload();
    let mut settings = data.load_settings();
    settings.apply_env(|k| std::env::var(k).ok());
    data.apply_settings(&settings);
    let result = json!({
        "entryCount": entries.len(),
        "students": data.store.students().len(),
        "fees": data.store.fees().len(),
    });
    info!(path = %in_path, entries = entries.len(), "bundle imported");
    state.settings = settings;
    state.fee_records.clear();
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportBundle" => Some(handle_backup_export_bundle(state, req)),
        "backup.importBundle" => Some(handle_backup_import_bundle(state, req)),
        _ => None,
    }
}
