//! OS-level memory and disk statistics

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use sysinfo::{Disks, ProcessesToUpdate, System};

use super::error::ProbeError;
use crate::{DiskMetrics, MemoryMetrics};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Blocking reads of host statistics. Called from `spawn_blocking`.
pub trait SystemStats: Send + Sync {
    fn memory(&self) -> Result<MemoryMetrics, ProbeError>;

    fn disk(&self, path: &Path) -> Result<DiskMetrics, ProbeError>;
}

/// [`SystemStats`] backed by `sysinfo`
pub struct SysinfoStats {
    system: Mutex<System>,
    memory_limit_mb: Option<u64>,
    peak_bytes: AtomicU64,
}

impl SysinfoStats {
    pub fn new(memory_limit_mb: Option<u64>) -> Self {
        Self {
            system: Mutex::new(System::new()),
            memory_limit_mb,
            peak_bytes: AtomicU64::new(0),
        }
    }
}

fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Usage figures for a disk of `total` bytes with `available` bytes free.
pub fn disk_metrics(path: &Path, total: u64, available: u64) -> Result<DiskMetrics, ProbeError> {
    if total == 0 {
        return Err(ProbeError::Unavailable(format!(
            "disk for {} reports zero capacity",
            path.display()
        )));
    }

    let available = available.min(total);
    let used = total - available;

    Ok(DiskMetrics {
        used_percent: used as f64 / total as f64 * 100.0,
        free_mb: to_mb(available),
        total_mb: to_mb(total),
        path: path.display().to_string(),
    })
}

/// Mount point with the longest prefix match for `path`.
fn best_mount<'a>(mounts: impl IntoIterator<Item = &'a Path>, path: &Path) -> Option<&'a Path> {
    mounts
        .into_iter()
        .filter(|mount| path.starts_with(mount))
        .max_by_key(|mount| mount.as_os_str().len())
}

impl SystemStats for SysinfoStats {
    fn memory(&self) -> Result<MemoryMetrics, ProbeError> {
        let pid = sysinfo::get_current_pid().map_err(|e| ProbeError::Unavailable(e.to_string()))?;

        let mut system = self
            .system
            .lock()
            .map_err(|_| ProbeError::Failed("system statistics lock poisoned".to_string()))?;
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        let current = system
            .process(pid)
            .map(|process| process.memory())
            .ok_or_else(|| ProbeError::Unavailable(format!("process {pid} not found")))?;
        let peak = self.peak_bytes.fetch_max(current, Ordering::Relaxed).max(current);

        let limit_mb = match self.memory_limit_mb {
            Some(limit) => Some(limit as f64),
            None => {
                system.refresh_memory();
                let total = system.total_memory();
                (total > 0).then(|| to_mb(total))
            }
        };

        Ok(MemoryMetrics {
            current_mb: to_mb(current),
            peak_mb: to_mb(peak),
            limit_mb,
        })
    }

    fn disk(&self, path: &Path) -> Result<DiskMetrics, ProbeError> {
        let path: PathBuf = std::fs::canonicalize(path).map_err(|e| {
            ProbeError::Unavailable(format!("cannot resolve {}: {e}", path.display()))
        })?;

        let disks = Disks::new_with_refreshed_list();
        let mount = best_mount(disks.list().iter().map(|disk| disk.mount_point()), &path)
            .ok_or_else(|| {
                ProbeError::Unavailable(format!("no disk mounted for {}", path.display()))
            })?;

        let disk = disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == mount)
            .ok_or_else(|| ProbeError::Failed(format!("disk for {} vanished", mount.display())))?;

        disk_metrics(&path, disk.total_space(), disk.available_space())
    }
}
