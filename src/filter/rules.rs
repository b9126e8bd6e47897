use std::path::PathBuf;

/// Per-OS tables consulted by the classifier.
///
/// All strings are lowercase; matching lowercases the process data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRules {
    /// Any executable path containing this marker belongs to the monitor.
    pub self_marker: String,
    /// The monitor's own executable, when it can be resolved.
    pub self_exe: Option<PathBuf>,
    /// Executable file names that are helper noise (console hosts).
    pub noise_names: Vec<String>,
    /// Path fragments of protected OS directories.
    pub system_dirs: Vec<String>,
    /// Product name of the OS vendor's own components (case-sensitive).
    pub vendor_branding: Option<String>,
    /// Command and script interpreters.
    pub interpreters: Vec<String>,
    /// Parents that mark an interpreter as opened by the user.
    pub desktop_shells: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl FilterRules {
    pub fn windows() -> Self {
        Self {
            self_marker: "appcensus".into(),
            self_exe: None,
            noise_names: owned(&["conhost.exe"]),
            system_dirs: owned(&["\\windows\\system32\\", "\\windows\\syswow64\\"]),
            vendor_branding: Some("Microsoft® Windows® Operating System".into()),
            interpreters: owned(&["cmd.exe", "powershell.exe", "pwsh.exe"]),
            desktop_shells: owned(&["explorer.exe"]),
        }
    }

    pub fn linux() -> Self {
        Self {
            self_marker: "appcensus".into(),
            self_exe: None,
            noise_names: Vec::new(),
            system_dirs: owned(&[
                "/usr/libexec/",
                "/usr/sbin/",
                "/sbin/",
                "/usr/lib/systemd/",
                "/lib/systemd/",
            ]),
            vendor_branding: None,
            interpreters: owned(&["sh", "bash", "dash", "zsh", "fish"]),
            desktop_shells: owned(&["gnome-shell", "plasmashell", "xfce4-panel", "cinnamon"]),
        }
    }

    pub fn macos() -> Self {
        Self {
            self_marker: "appcensus".into(),
            self_exe: None,
            noise_names: Vec::new(),
            system_dirs: owned(&["/system/", "/usr/libexec/", "/usr/sbin/", "/library/apple/"]),
            vendor_branding: None,
            interpreters: owned(&["sh", "bash", "zsh"]),
            desktop_shells: owned(&["finder"]),
        }
    }

    /// Rules for the OS this binary was built for, with the running
    /// executable filled in.
    pub fn for_current_os() -> Self {
        let rules = if cfg!(target_os = "windows") {
            Self::windows()
        } else if cfg!(target_os = "macos") {
            Self::macos()
        } else {
            Self::linux()
        };

        Self {
            self_exe: std::env::current_exe().ok(),
            ..rules
        }
    }

    pub fn is_noise(&self, file_name_lower: &str) -> bool {
        self.noise_names.iter().any(|n| n == file_name_lower)
    }

    pub fn in_system_dir(&self, path_lower: &str) -> bool {
        self.system_dirs.iter().any(|dir| path_lower.contains(dir.as_str()))
    }

    pub fn is_interpreter(&self, name_lower: &str) -> bool {
        self.interpreters.iter().any(|i| i == name_lower)
    }

    pub fn is_desktop_shell(&self, name: &str) -> bool {
        self.desktop_shells.iter().any(|s| s.eq_ignore_ascii_case(name))
    }
}
