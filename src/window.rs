//! Top-level window enumeration and liveness checks.
//!
//! Windows are never held as live references. A [`WindowHandle`] is an OS
//! identifier plus a descriptive snapshot, and liveness is re-checked on
//! demand with [`WindowRegistry::is_valid`].

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An OS window identifier with descriptive fields captured at enumeration.
///
/// Equality and hashing use `id` only; the other fields may go stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowHandle {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub process_name: String,
}

impl WindowHandle {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            title: String::new(),
            class_name: String::new(),
            process_name: String::new(),
        }
    }

    /// Label for pickers: `[process] title`.
    pub fn display_name(&self) -> String {
        if self.process_name.is_empty() {
            self.title.clone()
        } else {
            format!("[{}] {}", self.process_name, self.title)
        }
    }
}

impl PartialEq for WindowHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WindowHandle {}

impl Hash for WindowHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Observational queries against OS window state.
pub trait WindowRegistry: Send + Sync {
    /// Visible, titled top-level windows, optionally filtered by title.
    fn list_windows(&self, filter: Option<&str>) -> Result<Vec<WindowHandle>>;

    /// Whether `handle` still names a live, visible window. Never fails.
    fn is_valid(&self, handle: &WindowHandle) -> bool;
}

/// Keep windows whose title contains `filter` (case-insensitive), then
/// order them by title and id so repeated listings are stable.
pub fn filter_windows(mut windows: Vec<WindowHandle>, filter: Option<&str>) -> Vec<WindowHandle> {
    if let Some(keyword) = filter.map(str::trim).filter(|k| !k.is_empty()) {
        let keyword = keyword.to_lowercase();
        windows.retain(|w| w.title.to_lowercase().contains(&keyword));
    }
    windows.sort_by(|a, b| {
        a.title
            .to_lowercase()
            .cmp(&b.title.to_lowercase())
            .then(a.id.cmp(&b.id))
    });
    windows
}

/// Registry backed by the running desktop.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeWindowRegistry;

impl NativeWindowRegistry {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(windows)]
impl WindowRegistry for NativeWindowRegistry {
    fn list_windows(&self, filter: Option<&str>) -> Result<Vec<WindowHandle>> {
        let raw = win32::enumerate()?;
        let mut names = crate::process::ProcessNames::new();
        let owners = names.snapshot();
        let windows = raw
            .into_iter()
            .map(|w| WindowHandle {
                id: w.id,
                title: w.title,
                class_name: w.class_name,
                process_name: owners.get(&w.pid).cloned().unwrap_or_default(),
            })
            .collect();
        let windows = filter_windows(windows, filter);
        tracing::debug!(count = windows.len(), ?filter, "enumerated windows");
        Ok(windows)
    }

    fn is_valid(&self, handle: &WindowHandle) -> bool {
        if !win32::is_live(handle.id) {
            return false;
        }
        // A recycled handle would report a different class.
        if handle.class_name.is_empty() {
            return true;
        }
        win32::class_name(handle.id).is_some_and(|c| c == handle.class_name)
    }
}

#[cfg(not(windows))]
impl WindowRegistry for NativeWindowRegistry {
    fn list_windows(&self, _filter: Option<&str>) -> Result<Vec<WindowHandle>> {
        Err(crate::error::RepeaterError::unsupported_platform(
            "window enumeration requires Windows",
        ))
    }

    fn is_valid(&self, _handle: &WindowHandle) -> bool {
        false
    }
}

#[cfg(windows)]
pub(crate) mod win32 {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;

    use winapi::shared::minwindef::{BOOL, DWORD, LPARAM, TRUE};
    use winapi::shared::windef::HWND;
    use winapi::um::winuser::{
        EnumWindows, GetClassNameW, GetWindowTextLengthW, GetWindowTextW,
        GetWindowThreadProcessId, IsWindow, IsWindowVisible,
    };

    use crate::error::{RepeaterError, Result};

    pub struct RawWindow {
        pub id: u64,
        pub title: String,
        pub class_name: String,
        pub pid: u32,
    }

    pub fn to_hwnd(id: u64) -> HWND {
        id as usize as HWND
    }

    pub fn enumerate() -> Result<Vec<RawWindow>> {
        let mut windows: Vec<RawWindow> = Vec::new();
        let ok = unsafe {
            EnumWindows(
                Some(enum_window_callback),
                &mut windows as *mut Vec<RawWindow> as LPARAM,
            )
        };
        if ok == 0 {
            return Err(RepeaterError::Io(std::io::Error::last_os_error()));
        }
        Ok(windows)
    }

    unsafe extern "system" fn enum_window_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let windows = &mut *(lparam as *mut Vec<RawWindow>);

        if IsWindowVisible(hwnd) == 0 {
            return TRUE;
        }

        let title = match window_title(hwnd) {
            Some(title) if !title.trim().is_empty() => title,
            _ => return TRUE,
        };

        let mut pid: DWORD = 0;
        GetWindowThreadProcessId(hwnd, &mut pid);

        windows.push(RawWindow {
            id: hwnd as usize as u64,
            title,
            class_name: class_name(hwnd as usize as u64).unwrap_or_default(),
            pid,
        });

        TRUE
    }

    unsafe fn window_title(hwnd: HWND) -> Option<String> {
        let len = GetWindowTextLengthW(hwnd);
        if len <= 0 {
            return None;
        }
        let mut buf: Vec<u16> = vec![0; (len + 1) as usize];
        let copied = GetWindowTextW(hwnd, buf.as_mut_ptr(), buf.len() as i32);
        if copied <= 0 {
            return None;
        }
        buf.truncate(copied as usize);
        Some(OsString::from_wide(&buf).to_string_lossy().into_owned())
    }

    pub fn class_name(id: u64) -> Option<String> {
        let mut buf: Vec<u16> = vec![0; 256];
        let copied = unsafe { GetClassNameW(to_hwnd(id), buf.as_mut_ptr(), buf.len() as i32) };
        if copied <= 0 {
            return None;
        }
        buf.truncate(copied as usize);
        Some(OsString::from_wide(&buf).to_string_lossy().into_owned())
    }

    pub fn is_live(id: u64) -> bool {
        let hwnd = to_hwnd(id);
        unsafe { IsWindow(hwnd) != 0 && IsWindowVisible(hwnd) != 0 }
    }
}
