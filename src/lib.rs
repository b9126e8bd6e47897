pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod filter;
pub mod models;
pub mod platform;
#[cfg(test)]
mod test_utils;
pub mod tracker;
pub mod validation;
pub mod writer;

pub use config::MonitorConfig;
pub use error::{InitError, MonitorError, PlatformError};
pub use filter::{Classification, Classifier, FilterRules};
pub use models::AppEvent;
pub use platform::{CapabilityProvider, IntegrityLevel, NativeProvider};
pub use tracker::{Ledger, MonitorService, ResetHandle, SysinfoSource};
pub use writer::{WriteQueue, WriteRequest};

use crate::constants::{CONFIG_FILE_NAME, DB_FILE_NAME};
use crate::db::{migrations, Database};
use directories::ProjectDirs;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

fn project_dirs() -> Result<ProjectDirs, InitError> {
    ProjectDirs::from("com", "appcensus", "AppCensus").ok_or(InitError::NoProjectDirs)
}

fn get_db_path(dirs: &ProjectDirs, config: &MonitorConfig) -> Result<PathBuf, InitError> {
    let path = config
        .db_path
        .clone()
        .unwrap_or_else(|| dirs.data_dir().join(DB_FILE_NAME));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(InitError::DataDirCreation)?;
    }
    Ok(path)
}

/// A running census: the monitor thread and the writer thread behind it.
///
/// Dropping a `Daemon` detaches both threads; call [`stop`](Self::stop)
/// and [`wait`](Self::wait) to shut down cleanly.
pub struct Daemon {
    monitor: MonitorService,
    monitor_thread: JoinHandle<()>,
    writer_thread: JoinHandle<()>,
}

impl Daemon {
    /// Start with the config file and database under the platform
    /// project directories.
    pub fn start() -> Result<Self, InitError> {
        let dirs = project_dirs()?;
        let config = MonitorConfig::load(&dirs.config_dir().join(CONFIG_FILE_NAME)).map_err(InitError::Config)?;
        let db_path = get_db_path(&dirs, &config)?;
        Self::start_at(&db_path, &config)
    }

    /// Open the store at `db_path`, start the writer thread and then the
    /// monitor thread.
    pub fn start_at(db_path: &Path, config: &MonitorConfig) -> Result<Self, InitError> {
        info!("Recording application sessions to {}", db_path.display());

        let writer_db = Database::open(db_path).map_err(InitError::DatabaseOpen)?;
        migrations::run(writer_db.connection()).map_err(InitError::Migration)?;
        let reader_db = Database::open(db_path).map_err(InitError::DatabaseOpen)?;

        let (queue, writer_thread) = WriteQueue::start(writer_db.into_connection(), config.queue_capacity)
            .map_err(|source| InitError::Spawn {
                name: "writer",
                source,
            })?;

        let mut monitor = MonitorService::new(
            reader_db,
            queue,
            Box::new(NativeProvider::new()),
            Box::new(SysinfoSource::new()),
            FilterRules::for_current_os(),
            config,
        );
        let monitor_thread = monitor.start().map_err(InitError::Monitor)?;
        info!(
            "Monitoring processes every {} ms",
            config.poll_interval_ms
        );

        Ok(Self {
            monitor,
            monitor_thread,
            writer_thread,
        })
    }

    /// Handle for clearing tracking state from another thread, e.g. a
    /// signal handler or an IPC endpoint.
    pub fn reset_handle(&self) -> ResetHandle {
        self.monitor.reset_handle()
    }

    pub fn stop(&self) {
        self.monitor.stop();
    }

    /// Block until the monitor loop exits and the writer has drained.
    pub fn wait(self) {
        if self.monitor_thread.join().is_err() {
            error!("Monitor thread panicked");
        }
        // The loop thread owned the queue; once it is gone the writer drains
        // what is left and exits.
        if self.writer_thread.join().is_err() {
            error!("Writer thread panicked");
        }
    }
}

/// Run the census daemon until the monitor loop exits.
pub fn run() -> Result<(), InitError> {
    Daemon::start()?.wait();
    Ok(())
}
