//! Process name lookup for window snapshots.
//!
//! Window enumeration only yields the owning PID; this module turns PIDs
//! into executable names using `sysinfo`.

use std::collections::HashMap;

use sysinfo::{ProcessesToUpdate, System};

/// Resolves process IDs to executable names.
///
/// One refresh is done per [`ProcessNames::snapshot`] call, so resolving the
/// owners of many windows costs a single process-table walk.
pub struct ProcessNames {
    system: System,
}

impl Default for ProcessNames {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessNames {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Refresh the process table and return a PID -> name map.
    pub fn snapshot(&mut self) -> HashMap<u32, String> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        self.system
            .processes()
            .iter()
            .map(|(pid, process)| {
                (
                    pid.as_u32(),
                    process.name().to_string_lossy().into_owned(),
                )
            })
            .collect()
    }
}
