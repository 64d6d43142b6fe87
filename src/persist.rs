use crate::kv::KvStore;
use crate::model::{default_fees, default_students, Fee, Student};
use crate::store::{Snapshot, StoreChange, StoreListener};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

pub const STUDENTS_KEY: &str = "school_students";
pub const FEES_KEY: &str = "school_fees";

/// Where one collection came from on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Stored,
    Missing,
    Corrupt,
    Unreadable,
}

impl LoadSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadSource::Stored => "stored",
            LoadSource::Missing => "missing",
            LoadSource::Corrupt => "corrupt",
            LoadSource::Unreadable => "unreadable",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Loaded {
    pub students: Vec<Student>,
    pub fees: Vec<Fee>,
    pub students_source: LoadSource,
    pub fees_source: LoadSource,
    /// Stored records that `add_student`/`add_fee` would have refused.
    /// They are kept as loaded.
    pub anomalies: Vec<String>,
}

/// Lists duplicate student ids and fees with a negative, non-finite amount or
/// an empty month.
pub fn audit(students: &[Student], fees: &[Fee]) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for s in students {
        if !seen.insert(s.id.as_str()) {
            out.push(format!("duplicate student id {}", s.id));
        }
    }
    for (i, f) in fees.iter().enumerate() {
        if !f.amount.is_finite() || f.amount < 0.0 {
            out.push(format!("fee #{i} for {} has invalid amount {}", f.student_id, f.amount));
        }
        if f.month.trim().is_empty() {
            out.push(format!("fee #{i} for {} has an empty month", f.student_id));
        }
    }
    out
}

/// Reads and writes the two persisted collections. Never fails outward:
/// unusable entries fall back to the seed, failed writes are logged.
pub struct Persistence<K: KvStore> {
    kv: K,
}

impl<K: KvStore> Persistence<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    pub fn load(&self) -> Loaded {
        let (students, students_source) = self.load_entry(STUDENTS_KEY, default_students);
        let (fees, fees_source) = self.load_entry(FEES_KEY, default_fees);
        let anomalies = audit(&students, &fees);
        for issue in &anomalies {
            warn!(issue = %issue, "loaded data breaks a store invariant");
        }
        Loaded {
            students,
            fees,
            students_source,
            fees_source,
            anomalies,
        }
    }

    fn load_entry<T: DeserializeOwned>(
        &self,
        key: &str,
        fallback: fn() -> Vec<T>,
    ) -> (Vec<T>, LoadSource) {
        let bytes = match self.kv.get(key) {
            Ok(Some(b)) => b,
            Ok(None) => {
                debug!(key, "no persisted entry; seeding defaults");
                return (fallback(), LoadSource::Missing);
            }
            Err(e) => {
                warn!(key, error = %e, "failed to read persisted entry; seeding defaults");
                return (fallback(), LoadSource::Unreadable);
            }
        };
        match serde_json::from_slice::<Vec<T>>(&bytes) {
            Ok(v) => (v, LoadSource::Stored),
            Err(e) => {
                warn!(key, error = %e, "persisted entry is corrupt; seeding defaults");
                (fallback(), LoadSource::Corrupt)
            }
        }
    }

    /// Overwrites `key` with the full collection. Returns whether it was written.
    pub fn save<T: Serialize>(&mut self, key: &str, collection: &[T]) -> bool {
        let bytes = match serde_json::to_vec(collection) {
            Ok(b) => b,
            Err(e) => {
                warn!(key, error = %e, "failed to encode collection");
                return false;
            }
        };
        match self.kv.set(key, &bytes) {
            Ok(()) => {
                debug!(key, bytes = bytes.len(), "persisted collection");
                true
            }
            Err(e) => {
                warn!(key, error = %e, "failed to persist collection; keeping in-memory state");
                false
            }
        }
    }
}

impl<K: KvStore> StoreListener for Persistence<K> {
    fn on_change(&mut self, change: StoreChange, snapshot: &Snapshot<'_>) {
        if snapshot.loading {
            return;
        }
        match change {
            StoreChange::Students => {
                self.save(STUDENTS_KEY, snapshot.students);
            }
            StoreChange::Fees => {
                self.save(FEES_KEY, snapshot.fees);
            }
            StoreChange::Reloaded => {}
        }
    }
}
