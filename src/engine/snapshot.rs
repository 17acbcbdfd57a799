//! Session-scoped snapshot store and the revert path.
//!
//! Each distinct target (core governor file, scheduler-active flag, disk
//! scheduler file, kernel parameter file) is captured at most once per
//! session, immediately before its first mutating write. First write wins:
//! revert always restores the value that existed before this engine ever
//! touched the target, never an intermediate value from a later profile
//! switch. A session lasts for the lifetime of the engine value; nothing is
//! persisted across reboots.

use crate::engine::{cpu, disk, kparams};
use crate::log_info;
use crate::models::{ApplicationResult, DirectiveGroup, Outcome};
use crate::system::fs::TunableFs;
use crate::system::process::{Pid, ProcessControl};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Pre-mutation values, keyed by target identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    governors: BTreeMap<String, String>,
    scheduler_was_running: Option<bool>,
    disk_schedulers: BTreeMap<String, String>,
    kernel_values: BTreeMap<PathBuf, String>,
}

impl Snapshot {
    pub fn record_governor(&mut self, core: &str, value: &str) {
        self.governors
            .entry(core.to_string())
            .or_insert_with(|| value.to_string());
    }

    pub fn record_scheduler_running(&mut self, running: bool) {
        self.scheduler_was_running.get_or_insert(running);
    }

    pub fn record_disk(&mut self, device: &str, scheduler: &str) {
        self.disk_schedulers
            .entry(device.to_string())
            .or_insert_with(|| scheduler.to_string());
    }

    pub fn record_kernel(&mut self, path: &Path, value: &str) {
        self.kernel_values
            .entry(path.to_path_buf())
            .or_insert_with(|| value.to_string());
    }

    pub fn governors(&self) -> &BTreeMap<String, String> {
        &self.governors
    }

    pub fn scheduler_was_running(&self) -> Option<bool> {
        self.scheduler_was_running
    }

    pub fn disk_schedulers(&self) -> &BTreeMap<String, String> {
        &self.disk_schedulers
    }

    pub fn kernel_values(&self) -> &BTreeMap<PathBuf, String> {
        &self.kernel_values
    }

    pub fn is_empty(&self) -> bool {
        self.governors.is_empty()
            && self.scheduler_was_running.is_none()
            && self.disk_schedulers.is_empty()
            && self.kernel_values.is_empty()
    }
}

/// A scheduler process launched by this session; the owned PID is the only
/// process revert will terminate, so unrelated same-named processes are
/// never matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedScheduler {
    pub pid: Pid,
    pub name: String,
}

/// Mutable per-session state: the snapshot plus the owned scheduler handle.
#[derive(Debug, Default)]
pub struct Session {
    pub snapshot: Snapshot,
    pub started_scheduler: Option<StartedScheduler>,
}

/// Replay snapshotted values through the managers.
///
/// Targets are independent; failures are reported per target with the usual
/// taxonomy. A scheduler started this session is terminated, but whatever
/// scheduler ran before the session began is deliberately not restarted:
/// "previously running" does not imply "still startable".
pub fn revert_session<F: TunableFs, P: ProcessControl>(
    fs: &F,
    procs: &P,
    session: &mut Session,
) -> ApplicationResult {
    let mut result = ApplicationResult::new();

    if let Some(started) = session.started_scheduler.take() {
        log_info!("[revert] stopping scheduler '{}' (pid {})", started.name, started.pid);
        cpu::terminate_process(procs, started.pid);
        result.record(DirectiveGroup::Cpu, "scheduler", Outcome::Applied);
    } else if session.snapshot.scheduler_was_running() == Some(true) {
        result.record(
            DirectiveGroup::Cpu,
            "scheduler",
            Outcome::Skipped("pre-session scheduler is not restarted".to_string()),
        );
    }

    for (core, governor) in session.snapshot.governors() {
        result.record(
            DirectiveGroup::Cpu,
            core.as_str(),
            cpu::restore_governor(fs, core, governor),
        );
    }

    for (device, scheduler) in session.snapshot.disk_schedulers() {
        result.record(
            DirectiveGroup::Disk,
            device.as_str(),
            disk::restore_disk(fs, device, scheduler),
        );
    }

    for (path, value) in session.snapshot.kernel_values() {
        result.record(
            DirectiveGroup::Kernel,
            path.display().to_string(),
            kparams::restore_value(fs, path, value),
        );
    }

    result
}
