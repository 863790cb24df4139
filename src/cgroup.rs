//! Scoped cgroup-v2 handles.
//!
//! Every supervised child is placed into its own group under
//! `/sys/fs/cgroup/judgebox_<key>/`, which provides the memory ceiling
//! (`memory.max`), an advisory CPU quota (`cpu.max`), and the counters the
//! verdict machine reads back: `cpu.stat`, `memory.peak`, `memory.events`.
//!
//! Group names are reserved in a process-wide registry so that concurrent
//! judging runs never race on the same directory, and the directory is
//! removed when the handle drops.

use crate::error::{JudgeError, Result};
use crate::utils;
use nix::unistd::Pid;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use uuid::Uuid;

const CGROUP_ROOT: &str = "/sys/fs/cgroup";
const GROUP_PREFIX: &str = "judgebox_";

/// `cpu.max` period; quotas are expressed against a fixed 100 ms window.
const CPU_PERIOD_US: u64 = 100_000;

fn registry() -> &'static Mutex<HashSet<String>> {
    static NAMES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    NAMES.get_or_init(|| Mutex::new(HashSet::new()))
}

fn reserve_name(name: &str) -> bool {
    registry()
        .lock()
        .map(|mut names| names.insert(name.to_string()))
        .unwrap_or(false)
}

fn release_name(name: &str) {
    if let Ok(mut names) = registry().lock() {
        names.remove(name);
    }
}

/// Clear the process-wide name registry. Intended for tests that simulate
/// crashed runs; never call while groups are live.
pub fn reset_name_registry() {
    if let Ok(mut names) = registry().lock() {
        names.clear();
    }
}

/// One cgroup-v2 directory, exclusively owned. Removed on drop.
#[derive(Debug)]
pub struct ResourceGroup {
    name: String,
    path: PathBuf,
    time_limit_us: Option<u64>,
    mem_limit_bytes: Option<u64>,
}

impl ResourceGroup {
    /// Create a fresh group for `key` (typically the basename of the program
    /// about to run). A unique suffix keeps concurrent runs of identically
    /// named programs apart.
    pub fn acquire(key: &str) -> Result<Self> {
        Self::acquire_under(Path::new(CGROUP_ROOT), key)
    }

    /// Create a group below an explicit cgroupfs mount point.
    pub fn acquire_under(root: &Path, key: &str) -> Result<Self> {
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!("{}{}_{}", GROUP_PREFIX, utils::file_name(key), &suffix[..8]);
        if !reserve_name(&name) {
            return Err(JudgeError::Cgroup(format!("group name {name} already in use")));
        }

        let path = root.join(&name);
        let mut attempts = 0;
        loop {
            match fs::create_dir(&path) {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && attempts < 3 => {
                    attempts += 1;
                    log::warn!("stale cgroup {}, removing and retrying", path.display());
                    if let Err(rm) = fs::remove_dir(&path) {
                        release_name(&name);
                        return Err(JudgeError::Cgroup(format!(
                            "cannot reclaim stale cgroup {}: {}",
                            path.display(),
                            rm
                        )));
                    }
                }
                Err(e) => {
                    release_name(&name);
                    return Err(JudgeError::Cgroup(format!(
                        "mkdir {}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        }

        log::debug!("created cgroup {}", path.display());
        Ok(Self {
            name,
            path,
            time_limit_us: None,
            mem_limit_bytes: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time_limit_us(&self) -> Option<u64> {
        self.time_limit_us
    }

    pub fn mem_limit_bytes(&self) -> Option<u64> {
        self.mem_limit_bytes
    }

    /// Move a process into this group.
    pub fn add_process(&self, pid: Pid) -> Result<()> {
        let procs = self.path.join("cgroup.procs");
        fs::write(&procs, pid.to_string())
            .map_err(|e| JudgeError::Cgroup(format!("attach pid {pid} to {}: {}", self.name, e)))
    }

    /// Hard memory ceiling; the kernel OOM-kills the group past this point.
    pub fn set_mem_limit(&mut self, bytes: u64) -> Result<()> {
        fs::write(self.path.join("memory.max"), bytes.to_string())
            .map_err(|e| JudgeError::Cgroup(format!("memory.max for {}: {}", self.name, e)))?;
        self.mem_limit_bytes = Some(bytes);
        Ok(())
    }

    /// Advisory CPU bandwidth quota. Time enforcement is done by the
    /// supervisor polling [`Self::cpu_time_ms`]; this merely caps scheduling.
    pub fn set_time_limit_ms(&mut self, time_ms: u64) -> Result<()> {
        self.set_time_limit_us(time_ms.saturating_mul(1000))
    }

    pub fn set_time_limit_us(&mut self, time_us: u64) -> Result<()> {
        fs::write(
            self.path.join("cpu.max"),
            format!("{time_us} {CPU_PERIOD_US}"),
        )
        .map_err(|e| JudgeError::Cgroup(format!("cpu.max for {}: {}", self.name, e)))?;
        self.time_limit_us = Some(time_us);
        Ok(())
    }

    /// Accumulated CPU time from `cpu.stat`, or `None` when unreadable.
    pub fn cpu_time_us(&self) -> Option<u64> {
        let content = fs::read_to_string(self.path.join("cpu.stat")).ok()?;
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            if let (Some("usage_usec"), Some(value)) = (parts.next(), parts.next()) {
                return value.parse().ok();
            }
        }
        None
    }

    pub fn cpu_time_ms(&self) -> Option<u64> {
        self.cpu_time_us().map(|us| us / 1000)
    }

    /// High watermark from `memory.peak`, 0 when unreadable.
    pub fn peak_memory(&self) -> u64 {
        fs::read_to_string(self.path.join("memory.peak"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    /// True when `memory.events` records any `oom` or `oom_kill` event.
    pub fn is_oom(&self) -> bool {
        let content = match fs::read_to_string(self.path.join("memory.events")) {
            Ok(content) => content,
            Err(_) => return false,
        };
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
                if (key == "oom" || key == "oom_kill") && value.parse::<u64>().unwrap_or(0) > 0 {
                    return true;
                }
            }
        }
        false
    }
}

impl Drop for ResourceGroup {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir(&self.path) {
            log::warn!("failed to remove cgroup {}: {}", self.path.display(), e);
        } else {
            log::debug!("removed cgroup {}", self.path.display());
        }
        release_name(&self.name);
    }
}
