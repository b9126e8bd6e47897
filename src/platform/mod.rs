pub mod stub;
pub mod types;

pub use stub::StubProvider;
pub use types::{CapabilityProvider, IntegrityLevel};

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use linux::LinuxProvider as NativeProvider;

// macOS, Windows and the rest run on permissive answers until they get a
// backend of their own.
#[cfg(not(target_os = "linux"))]
pub use stub::StubProvider as NativeProvider;
