use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DATA_DIR: &str = "data";
pub const BUNDLE_FORMAT_V1: &str = "schoold-data-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

/// One persisted entry carried by a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub key: String,
    pub bytes: Vec<u8>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn entry_path(key: &str) -> String {
    format!("{}/{}.json", DATA_DIR, key)
}

pub fn export_bundle(entries: &[BundleEntry], out_path: &Path) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let listed: Vec<serde_json::Value> = entries
        .iter()
        .map(|e| {
            json!({
                "key": e.key,
                "path": entry_path(&e.key),
                "bytes": e.bytes.len(),
                "sha256": sha256_hex(&e.bytes),
            })
        })
        .collect();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "entries": listed,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for e in entries {
        zip.start_file(entry_path(&e.key), opts)
            .with_context(|| format!("failed to start entry {}", e.key))?;
        zip.write_all(&e.bytes)
            .with_context(|| format!("failed to write entry {}", e.key))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: entries.len(),
    })
}

/// Reads every entry listed in the manifest, verifying each checksum.
pub fn read_bundle(in_path: &Path) -> anyhow::Result<Vec<BundleEntry>> {
    if !is_zip_file(in_path)? {
        return Err(anyhow!(
            "not a bundle archive: {}",
            in_path.to_string_lossy()
        ));
    }
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let listed = manifest
        .get("entries")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("manifest.json has no entries list"))?;
    let mut out = Vec::with_capacity(listed.len());
    for item in listed {
        let key = item
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("manifest entry without key"))?;
        let expected = item
            .get("sha256")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("manifest entry {} without sha256", key))?;
        let mut bytes = Vec::new();
        archive
            .by_name(&entry_path(key))
            .with_context(|| format!("bundle missing {}", entry_path(key)))?
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read {}", entry_path(key)))?;
        if sha256_hex(&bytes) != expected {
            return Err(anyhow!("checksum mismatch for {}", key));
        }
        out.push(BundleEntry {
            key: key.to_string(),
            bytes,
        });
    }
    Ok(out)
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
