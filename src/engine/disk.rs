//! Per-disk I/O scheduler assignment.
//!
//! Each block device exposes a selector file at
//! `/sys/block/<dev>/queue/scheduler` listing the available elevators with
//! the active one bracketed. Requested names are validated against that
//! list before anything is written.

use crate::engine::snapshot::Session;
use crate::error::TargetFailure;
use crate::models::{ApplicationResult, DirectiveGroup, Outcome};
use crate::system::fs::{SelectorFile, TunableFs};
use crate::log_info;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Root of the block device sysfs tree.
pub const BLOCK_SYSFS_ROOT: &str = "/sys/block";

/// Selector file controlling a device's I/O scheduler.
pub fn scheduler_path(device: &str) -> PathBuf {
    Path::new(BLOCK_SYSFS_ROOT).join(device).join("queue/scheduler")
}

/// Apply every device directive, one outcome per device.
pub fn apply_disks<F: TunableFs>(
    fs: &F,
    session: &mut Session,
    disks: &BTreeMap<String, String>,
    result: &mut ApplicationResult,
) {
    if disks.is_empty() {
        return;
    }
    log_info!("[disk] applying I/O scheduler to {} device(s)", disks.len());
    for (device, scheduler) in disks {
        let outcome = write_scheduler(fs, Some(&mut *session), device, scheduler);
        result.record(DirectiveGroup::Disk, device.as_str(), outcome);
    }
}

fn write_scheduler<F: TunableFs>(
    fs: &F,
    session: Option<&mut Session>,
    device: &str,
    scheduler: &str,
) -> Outcome {
    let path = scheduler_path(device);
    if !fs.exists(&path) {
        return Outcome::Failed(TargetFailure::DeviceNotFound);
    }
    if !fs.is_writable(&path) {
        return Outcome::Failed(TargetFailure::NotWritable);
    }
    let content = match fs.read_to_string(&path) {
        Ok(content) => content,
        Err(e) => return Outcome::Failed(TargetFailure::WriteError(e.to_string())),
    };
    let selector = match SelectorFile::parse(&content) {
        Some(selector) => selector,
        None => {
            return Outcome::Failed(TargetFailure::WriteError(
                "empty scheduler selector file".to_string(),
            ))
        }
    };
    if selector.current == scheduler {
        return Outcome::Skipped(format!("'{}' already active", scheduler));
    }
    if let Some(session) = session {
        // Availability is only validated on the apply path. A snapshotted
        // value was advertised by this device when it was captured; replay
        // writes it back without re-checking.
        if !selector.available.iter().any(|s| s == scheduler) {
            return Outcome::Failed(TargetFailure::SchedulerUnavailable {
                requested: scheduler.to_string(),
                available: selector.available,
            });
        }
        session.snapshot.record_disk(device, &selector.current);
    }
    match fs.write(&path, scheduler) {
        Ok(()) => Outcome::Applied,
        Err(e) => Outcome::Failed(TargetFailure::WriteError(e.to_string())),
    }
}

/// Rewrite one device's snapshotted scheduler; no snapshot capture.
pub(crate) fn restore_disk<F: TunableFs>(fs: &F, device: &str, scheduler: &str) -> Outcome {
    write_scheduler(fs, None, device, scheduler)
}
