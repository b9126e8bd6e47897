use crate::error::PlatformError;
use serde::Serialize;
use std::path::Path;

/// Privilege tier of a process, ordered from least to most trusted.
///
/// Mirrors the Windows mandatory integrity levels; other platforms map
/// onto the same scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IntegrityLevel {
    Untrusted,
    Low,
    Medium,
    High,
    System,
}

/// OS facts consumed by classification. Every query is read-only and
/// fails independently of the others.
pub trait CapabilityProvider: Send {
    /// Called once at the start of every tick, before any query.
    fn refresh(&mut self) {}

    fn has_visible_window(&self, pid: u32) -> bool;

    fn integrity_level(&self, pid: u32) -> Result<IntegrityLevel, PlatformError>;

    fn product_name(&self, exe_path: &Path) -> Result<String, PlatformError>;

    fn publisher(&self, exe_path: &Path) -> Result<String, PlatformError>;

    /// Signed by the OS vendor (Microsoft on Windows).
    fn is_vendor_signed(&self, exe_path: &Path) -> bool;

    fn is_self(&self, pid: u32) -> bool {
        pid == std::process::id()
    }
}
