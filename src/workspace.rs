use crate::config::Settings;
use crate::kv::{KvStore, SqliteKv};
use crate::persist::{LoadSource, Persistence};
use crate::store::EntityStore;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::info;

/// Entity store bound to one workspace's key-value file.
///
/// The store's persistence listener and settings/backup code share the same
/// `SqliteKv` handle.
pub struct SchoolData {
    pub path: PathBuf,
    pub kv: Rc<RefCell<SqliteKv>>,
    pub store: EntityStore,
    pub students_source: LoadSource,
    pub fees_source: LoadSource,
}

impl SchoolData {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let kv = Rc::new(RefCell::new(SqliteKv::open(path)?));
        let mut store = EntityStore::new();
        store.subscribe(Box::new(Persistence::new(kv.clone())));

        let mut data = Self {
            path: path.to_path_buf(),
            kv,
            store,
            students_source: LoadSource::Missing,
            fees_source: LoadSource::Missing,
        };
        data.reload();
        Ok(data)
    }

    /// Re-reads both collections from the key-value store.
    pub fn reload(&mut self) {
        self.store.begin_load();
        let loaded = Persistence::new(self.kv.clone()).load();
        self.students_source = loaded.students_source;
        self.fees_source = loaded.fees_source;
        info!(
            workspace = %self.path.to_string_lossy(),
            students = loaded.students.len(),
            fees = loaded.fees.len(),
            students_source = loaded.students_source.as_str(),
            fees_source = loaded.fees_source.as_str(),
            anomalies = loaded.anomalies.len(),
            "school data loaded"
        );
        self.store.finish_load(loaded.students, loaded.fees);
    }

    pub fn load_settings(&self) -> Settings {
        Settings::load(&self.kv)
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        self.store
            .set_unique_periods(settings.fees.enforce_unique_period);
    }

    pub fn save_settings(&self, settings: &Settings) -> anyhow::Result<()> {
        let mut kv = self.kv.clone();
        settings.save(&mut kv)
    }

    pub fn read_entry(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.kv.get(key)?)
    }

    pub fn write_entry(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let mut kv = self.kv.clone();
        kv.set(key, bytes)?;
        Ok(())
    }
}
