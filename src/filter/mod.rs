//! Decides whether a process is a user-facing application worth a
//! lifecycle event.

pub mod rules;

pub use rules::FilterRules;

use crate::platform::{CapabilityProvider, IntegrityLevel};
use crate::tracker::snapshot::ProcessInfo;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Track(TrackReason),
    /// Ignored for as long as this pid lives.
    Exclude(ExclusionReason),
    /// Not decidable this tick; evaluated again on the next one.
    Defer(DeferReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackReason {
    ShellLaunched,
    VisibleWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    SelfProcess,
    Noise,
    SystemLocation,
    SystemIntegrity,
    VendorComponent,
    NonInteractiveShell,
    NoWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    MissingMetadata,
    AwaitingWindow,
}

pub struct Classifier {
    rules: FilterRules,
    window_grace_secs: u64,
}

fn file_name_of(path_lower: &str) -> &str {
    path_lower
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(path_lower)
}

impl Classifier {
    pub fn new(rules: FilterRules, window_grace_secs: u64) -> Self {
        Self {
            rules,
            window_grace_secs,
        }
    }

    pub fn rules(&self) -> &FilterRules {
        &self.rules
    }

    /// Classify one process. The first matching rule wins.
    pub fn classify(
        &self,
        process: &ProcessInfo,
        provider: &dyn CapabilityProvider,
        now: i64,
    ) -> Classification {
        let exe_path = match process.exe_path.as_deref() {
            Some(path) if !process.name.is_empty() && !path.as_os_str().is_empty() => path,
            _ => return Classification::Defer(DeferReason::MissingMetadata),
        };
        let path_lower = exe_path.to_string_lossy().to_lowercase();
        let name_lower = process.name.to_lowercase();

        if self.is_self(process.pid, exe_path, &path_lower, provider) {
            return Classification::Exclude(ExclusionReason::SelfProcess);
        }

        if self.rules.is_noise(file_name_of(&path_lower)) {
            return Classification::Exclude(ExclusionReason::Noise);
        }

        if self.rules.in_system_dir(&path_lower) {
            return Classification::Exclude(ExclusionReason::SystemLocation);
        }

        // A failed integrity lookup is not evidence of a system process.
        if let Ok(level) = provider.integrity_level(process.pid) {
            if level >= IntegrityLevel::System {
                return Classification::Exclude(ExclusionReason::SystemIntegrity);
            }
        }

        if let Some(branding) = self.rules.vendor_branding.as_deref() {
            if let Ok(product) = provider.product_name(exe_path) {
                if product.contains(branding) {
                    return Classification::Exclude(ExclusionReason::VendorComponent);
                }
            }
        }

        if self.rules.is_interpreter(&name_lower) {
            let from_shell = process
                .parent_name
                .as_deref()
                .is_some_and(|parent| self.rules.is_desktop_shell(parent));
            return if from_shell {
                Classification::Track(TrackReason::ShellLaunched)
            } else {
                Classification::Exclude(ExclusionReason::NonInteractiveShell)
            };
        }

        if provider.has_visible_window(process.pid) {
            return Classification::Track(TrackReason::VisibleWindow);
        }

        if self.is_young(process.started_at, now) {
            Classification::Defer(DeferReason::AwaitingWindow)
        } else {
            Classification::Exclude(ExclusionReason::NoWindow)
        }
    }

    fn is_self(
        &self,
        pid: u32,
        exe_path: &Path,
        path_lower: &str,
        provider: &dyn CapabilityProvider,
    ) -> bool {
        provider.is_self(pid)
            || self.rules.self_exe.as_deref() == Some(exe_path)
            || path_lower.contains(self.rules.self_marker.as_str())
    }

    fn is_young(&self, started_at: u64, now: i64) -> bool {
        let now = u64::try_from(now).unwrap_or(0);
        now.saturating_sub(started_at) < self.window_grace_secs
    }
}
