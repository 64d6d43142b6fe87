use crate::config::Settings;
use crate::views::{FeeRecord, Memo};
use crate::workspace::SchoolData;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Work that runs off the request loop; yields the response when done.
pub type Job = Box<dyn FnOnce() -> serde_json::Value + Send + 'static>;

pub enum Reply {
    Ready(serde_json::Value),
    Deferred(Job),
}

pub struct AppState {
    pub data: Option<SchoolData>,
    /// Workspace settings with environment overrides applied.
    pub settings: Settings,
    pub fee_records: Memo<Vec<FeeRecord>>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            data: None,
            settings,
            fee_records: Memo::new(),
        }
    }
}
