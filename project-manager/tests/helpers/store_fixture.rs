use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use project_manager_lib::store::{Config, ProjectStore};

/// Open (phase one only) a store rooted at `runtime`
pub fn open_unloaded(runtime: &Path) -> ProjectStore {
    ProjectStore::open(Config::new(runtime))
}

/// Open and load a store rooted at `runtime`
pub fn open_store(runtime: &Path) -> ProjectStore {
    let mut store = open_unloaded(runtime);
    store.load();
    store
}

/// Write a file relative to the store's data directory, creating parents
pub fn write_data_file(store: &ProjectStore, relative: &str, contents: &str) -> PathBuf {
    let path = store.data_paths().root().join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 1, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}
