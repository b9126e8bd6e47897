use super::{CapabilityProvider, IntegrityLevel};
use crate::error::PlatformError;
use std::path::Path;

/// Permissive answers for platforms without a real backend.
///
/// Every process looks like a medium-integrity process with a window, so
/// classification falls through to its default "track" branch instead of
/// failing.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubProvider;

impl StubProvider {
    pub fn new() -> Self {
        Self
    }
}

impl CapabilityProvider for StubProvider {
    fn has_visible_window(&self, _pid: u32) -> bool {
        true
    }

    fn integrity_level(&self, _pid: u32) -> Result<IntegrityLevel, PlatformError> {
        Ok(IntegrityLevel::Medium)
    }

    fn product_name(&self, _exe_path: &Path) -> Result<String, PlatformError> {
        Ok(String::new())
    }

    fn publisher(&self, _exe_path: &Path) -> Result<String, PlatformError> {
        Ok(String::new())
    }

    fn is_vendor_signed(&self, _exe_path: &Path) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_is_permissive() {
        let provider = StubProvider::new();
        let exe = Path::new("/opt/editor/editor");

        assert!(provider.has_visible_window(1234));
        assert_eq!(provider.integrity_level(1234).unwrap(), IntegrityLevel::Medium);
        assert_eq!(provider.product_name(exe).unwrap(), "");
        assert_eq!(provider.publisher(exe).unwrap(), "");
        assert!(!provider.is_vendor_signed(exe));
    }

    #[test]
    fn test_is_self_matches_own_pid() {
        let provider = StubProvider::new();
        assert!(provider.is_self(std::process::id()));
        assert!(!provider.is_self(std::process::id().wrapping_add(1)));
    }

    #[test]
    fn test_integrity_levels_are_ordered() {
        assert!(IntegrityLevel::Untrusted < IntegrityLevel::Low);
        assert!(IntegrityLevel::Medium < IntegrityLevel::High);
        assert!(IntegrityLevel::High < IntegrityLevel::System);
    }
}
