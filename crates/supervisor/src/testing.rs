//! In-memory process table for exercising supervisor logic without real
//! processes.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::liveness::{Liveness, ProcessProbe};

#[derive(Debug, Default)]
pub struct FakeProbe {
    table: Mutex<HashMap<u32, (Liveness, bool)>>,
    reaped: Mutex<Vec<u32>>,
}

impl FakeProbe {
    /// Register a live process; `is_mission` controls the identity check.
    pub fn alive(self, pid: u32, is_mission: bool) -> Self {
        self.set(pid, Liveness::Alive, is_mission);
        self
    }

    pub fn zombie(self, pid: u32) -> Self {
        self.set(pid, Liveness::Zombie, true);
        self
    }

    pub fn set(&self, pid: u32, liveness: Liveness, is_mission: bool) {
        if let Ok(mut table) = self.table.lock() {
            table.insert(pid, (liveness, is_mission));
        }
    }

    /// Make `pid` disappear from the table.
    pub fn kill(&self, pid: u32) {
        if let Ok(mut table) = self.table.lock() {
            table.remove(&pid);
        }
    }

    /// PIDs passed to [`ProcessProbe::reap`], in call order.
    pub fn reaped(&self) -> Vec<u32> {
        self.reaped.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn entry(&self, pid: u32) -> Option<(Liveness, bool)> {
        self.table.lock().ok()?.get(&pid).copied()
    }
}

impl ProcessProbe for FakeProbe {
    fn probe(&self, pid: u32) -> Liveness {
        self.entry(pid)
            .map(|(liveness, _)| liveness)
            .unwrap_or(Liveness::Absent)
    }

    fn identity_matches(&self, pid: u32) -> bool {
        self.entry(pid).map(|(_, mission)| mission).unwrap_or(false)
    }

    fn reap(&self, pid: u32) {
        if let Ok(mut reaped) = self.reaped.lock() {
            reaped.push(pid);
        }
        self.kill(pid);
    }
}
