use super::{CapabilityProvider, IntegrityLevel};
use crate::error::PlatformError;
use std::collections::HashSet;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt, Window};
use x11rb::rust_connection::RustConnection;

/// Linux capability backend.
///
/// Window ownership comes from the EWMH client list of the X server;
/// privilege comes from the owner of `/proc/<pid>`. Without an X server
/// (Wayland, headless) every process counts as windowed.
pub struct LinuxProvider {
    x11: Option<X11Clients>,
    window_pids: HashSet<u32>,
}

struct X11Clients {
    conn: RustConnection,
    root: Window,
    client_list: Atom,
    wm_pid: Atom,
}

impl Default for LinuxProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxProvider {
    pub fn new() -> Self {
        let x11 = match X11Clients::connect() {
            Ok(clients) => Some(clients),
            Err(e) => {
                log::warn!("X11 unavailable ({e}); window checks disabled, every process counts as windowed");
                None
            }
        };

        Self {
            x11,
            window_pids: HashSet::new(),
        }
    }
}

fn x11_err(e: impl std::fmt::Display) -> PlatformError {
    PlatformError::X11(e.to_string())
}

impl X11Clients {
    fn connect() -> Result<Self, PlatformError> {
        let (conn, screen_num) = x11rb::connect(None).map_err(x11_err)?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| PlatformError::X11(format!("invalid screen number {screen_num}")))?;

        let client_list = Self::intern(&conn, "_NET_CLIENT_LIST")?;
        let wm_pid = Self::intern(&conn, "_NET_WM_PID")?;

        Ok(Self {
            conn,
            root,
            client_list,
            wm_pid,
        })
    }

    fn intern(conn: &RustConnection, name: &str) -> Result<Atom, PlatformError> {
        Ok(conn
            .intern_atom(false, name.as_bytes())
            .map_err(x11_err)?
            .reply()
            .map_err(x11_err)?
            .atom)
    }

    /// PIDs owning at least one managed top-level window.
    fn window_pids(&self) -> Result<HashSet<u32>, PlatformError> {
        let reply = self
            .conn
            .get_property(false, self.root, self.client_list, AtomEnum::WINDOW, 0, u32::MAX)
            .map_err(x11_err)?
            .reply()
            .map_err(x11_err)?;
        let clients: Vec<Window> = reply.value32().map(|v| v.collect()).unwrap_or_default();

        // Send every request before waiting on the first reply.
        let cookies = clients
            .iter()
            .map(|&window| {
                self.conn
                    .get_property(false, window, self.wm_pid, AtomEnum::CARDINAL, 0, 1)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(x11_err)?;

        let mut pids = HashSet::with_capacity(cookies.len());
        for cookie in cookies {
            // A client may have been destroyed since the list was read.
            let Ok(reply) = cookie.reply() else {
                continue;
            };
            if let Some(pid) = reply.value32().and_then(|mut values| values.next()) {
                pids.insert(pid);
            }
        }
        Ok(pids)
    }
}

impl CapabilityProvider for LinuxProvider {
    fn refresh(&mut self) {
        let Some(x11) = self.x11.as_ref() else {
            return;
        };

        match x11.window_pids() {
            Ok(pids) => self.window_pids = pids,
            Err(e) => log::warn!("Failed to list X11 client windows, keeping previous set: {e}"),
        }
    }

    fn has_visible_window(&self, pid: u32) -> bool {
        self.x11.is_none() || self.window_pids.contains(&pid)
    }

    fn integrity_level(&self, pid: u32) -> Result<IntegrityLevel, PlatformError> {
        let meta = std::fs::metadata(format!("/proc/{pid}")).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlatformError::NotFound { pid }
            } else {
                PlatformError::Io(e)
            }
        })?;

        if meta.uid() == 0 {
            Ok(IntegrityLevel::System)
        } else {
            Ok(IntegrityLevel::Medium)
        }
    }

    fn product_name(&self, _exe_path: &Path) -> Result<String, PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn publisher(&self, _exe_path: &Path) -> Result<String, PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn is_vendor_signed(&self, _exe_path: &Path) -> bool {
        false
    }
}
