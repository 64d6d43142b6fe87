use crate::kv::KvStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

pub const SETTINGS_KEY: &str = "school_settings";

pub const DEFAULT_AI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_AI_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeeSettings {
    /// Lets `fees.updateStatus` move a record back to Unpaid.
    pub allow_status_revert: bool,
    /// Refuses a second fee for the same (student, month, year).
    pub enforce_unique_period: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiSettings {
    pub endpoint: String,
    pub model: String,
    /// Per-request limit; a stalled request fails with `ai_failed`.
    pub timeout_secs: u64,
    /// Only ever taken from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_AI_ENDPOINT.to_string(),
            model: DEFAULT_AI_MODEL.to_string(),
            timeout_secs: 60,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub fees: FeeSettings,
    pub ai: AiSettings,
}

impl Settings {
    /// Reads the workspace settings entry. Anything unusable yields defaults.
    pub fn load(kv: &impl KvStore) -> Self {
        match kv.get(SETTINGS_KEY) {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(error = %e, "settings entry is corrupt; using defaults");
                Settings::default()
            }),
            Ok(None) => Settings::default(),
            Err(e) => {
                warn!(error = %e, "failed to read settings; using defaults");
                Settings::default()
            }
        }
    }

    pub fn save(&self, kv: &mut impl KvStore) -> anyhow::Result<()> {
        kv.set(SETTINGS_KEY, &serde_json::to_vec(self)?)?;
        Ok(())
    }

    pub fn from_env() -> Self {
        let mut s = Settings::default();
        s.apply_env(|k| std::env::var(k).ok());
        s
    }

    /// Applies `GEMINI_API_KEY` (falling back to `API_KEY`),
    /// `SCHOOLD_AI_ENDPOINT` and `SCHOOLD_AI_MODEL`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        self.ai.api_key = non_empty("GEMINI_API_KEY").or_else(|| non_empty("API_KEY"));
        if let Some(v) = non_empty("SCHOOLD_AI_ENDPOINT") {
            self.ai.endpoint = v.trim().trim_end_matches('/').to_string();
        }
        if let Some(v) = non_empty("SCHOOLD_AI_MODEL") {
            self.ai.model = v.trim().to_string();
        }
    }

    pub fn apply_patch(&mut self, section: &str, patch: &Map<String, Value>) -> Result<(), String> {
        match section {
            "fees" => self.fees.apply_patch(patch),
            "ai" => self.ai.apply_patch(patch),
            _ => Err(format!("unknown settings section: {}", section)),
        }
    }
}

impl FeeSettings {
    fn apply_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        for (k, v) in patch {
            match k.as_str() {
                "allowStatusRevert" => self.allow_status_revert = parse_bool(v, k)?,
                "enforceUniquePeriod" => self.enforce_unique_period = parse_bool(v, k)?,
                _ => return Err(format!("unknown fees field: {}", k)),
            }
        }
        Ok(())
    }
}

impl AiSettings {
    fn apply_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        for (k, v) in patch {
            match k.as_str() {
                "endpoint" => {
                    let s = parse_string_max(v, k, 200)?;
                    if !s.starts_with("http://") && !s.starts_with("https://") {
                        return Err("endpoint must be an http(s) URL".into());
                    }
                    self.endpoint = s.trim_end_matches('/').to_string();
                }
                "model" => {
                    let s = parse_string_max(v, k, 80)?;
                    if s.is_empty() {
                        return Err("model must not be empty".into());
                    }
                    self.model = s;
                }
                "timeoutSecs" => self.timeout_secs = parse_u64_range(v, k, 1, 600)?,
                _ => return Err(format!("unknown ai field: {}", k)),
            }
        }
        Ok(())
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_u64_range(v: &Value, key: &str, min: u64, max: u64) -> Result<u64, String> {
    let n = v
        .as_u64()
        .ok_or_else(|| format!("{} must be a non-negative integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}
