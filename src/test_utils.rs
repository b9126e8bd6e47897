//! Shared test utilities for appcensus.
//!
//! This module provides common setup functions used across test modules.

#![cfg(test)]

use crate::db::{migrations, Database};
use crate::error::PlatformError;
use crate::platform::{CapabilityProvider, IntegrityLevel};
use crate::tracker::snapshot::{ProcessInfo, ProcessSnapshot};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

/// Fixed "now" for classification and ledger tests (epoch seconds).
pub const TEST_NOW: i64 = 1_700_000_000;

/// Start time given to processes built with [`proc_info`]; far enough
/// before [`TEST_NOW`] that the window grace period has elapsed.
pub const TEST_STARTED_AT: u64 = 1_000;

/// Create a temporary test database with migrations applied.
///
/// Returns a tuple of (Database, TempDir). The TempDir must be kept alive
/// for the duration of the test to prevent the database file from being deleted.
pub fn setup_test_db() -> (Database, TempDir) {
    let dir = tempdir().expect("Failed to create temp directory for test DB");
    let db_path = dir.path().join("test.db");
    let db = Database::open(&db_path).expect("Failed to open test database");
    migrations::run(db.connection()).expect("Failed to run migrations on test DB");
    (db, dir)
}

/// Build a process record. An empty `exe` yields an empty path, which the
/// classifier treats as missing metadata.
pub fn proc_info(pid: u32, name: &str, exe: &str, parent: Option<&str>) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: name.to_string(),
        exe_path: Some(PathBuf::from(exe)),
        parent_name: parent.map(str::to_string),
        started_at: TEST_STARTED_AT,
    }
}

/// Snapshot of windowed applications under `C:\Apps\`, one per `(pid, name)`.
pub fn snapshot_of(apps: &[(u32, &str)]) -> ProcessSnapshot {
    apps.iter()
        .map(|&(pid, name)| proc_info(pid, name, &format!("C:\\Apps\\{name}"), Some("explorer.exe")))
        .collect()
}

/// Scriptable capability provider.
///
/// Every pid has a window and medium integrity unless listed otherwise.
#[derive(Debug, Default, Clone)]
pub struct FakeProvider {
    pub windowless: HashSet<u32>,
    pub integrity: HashMap<u32, IntegrityLevel>,
    pub product_names: HashMap<PathBuf, String>,
    pub self_pid: Option<u32>,
}

impl CapabilityProvider for FakeProvider {
    fn has_visible_window(&self, pid: u32) -> bool {
        !self.windowless.contains(&pid)
    }

    fn integrity_level(&self, pid: u32) -> Result<IntegrityLevel, PlatformError> {
        Ok(self
            .integrity
            .get(&pid)
            .copied()
            .unwrap_or(IntegrityLevel::Medium))
    }

    fn product_name(&self, exe_path: &Path) -> Result<String, PlatformError> {
        self.product_names
            .get(exe_path)
            .cloned()
            .ok_or(PlatformError::Unsupported)
    }

    fn publisher(&self, _exe_path: &Path) -> Result<String, PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn is_vendor_signed(&self, _exe_path: &Path) -> bool {
        false
    }

    fn is_self(&self, pid: u32) -> bool {
        self.self_pid == Some(pid)
    }
}
