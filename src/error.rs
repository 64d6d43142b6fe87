use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is still loading")]
    Loading,
    #[error("generated student id {0} already exists")]
    DuplicateId(String),
    #[error("fee amount must be a non-negative number, got {0}")]
    InvalidAmount(f64),
    #[error("fee month must not be empty")]
    EmptyMonth,
    #[error("a fee for {student_id} {month} {year} already exists")]
    DuplicatePeriod {
        student_id: String,
        month: String,
        year: i32,
    },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Loading => "loading",
            StoreError::DuplicateId(_) => "duplicate_id",
            StoreError::InvalidAmount(_) | StoreError::EmptyMonth => "invalid_fee",
            StoreError::DuplicatePeriod { .. } => "duplicate_fee_period",
        }
    }
}

#[derive(Debug, Error)]
pub enum KvError {
    #[error("storage backend: {0}")]
    Backend(#[from] rusqlite::Error),
    #[error("storage quota exceeded writing {key}")]
    QuotaExceeded { key: String },
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("no API key configured for the text-generation service")]
    MissingCredential,
    #[error("text-generation request timed out")]
    Timeout,
    #[error("text-generation request failed: {0}")]
    Transport(String),
    #[error("text-generation service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("text-generation response was malformed: {0}")]
    Malformed(String),
}

impl AiError {
    pub fn code(&self) -> &'static str {
        match self {
            AiError::MissingCredential => "ai_unavailable",
            _ => "ai_failed",
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AiError::Timeout
        } else {
            AiError::Transport(e.to_string())
        }
    }
}
