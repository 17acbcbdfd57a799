//! CPU governor application and pluggable scheduler lifecycle.
//!
//! Governor writes fan out over every per-core `scaling_governor` file and
//! aggregate per-core outcomes; a failing core never blocks the rest.
//! Scheduler replacement is strictly drain-then-start: two pluggable
//! schedulers attached at once is undefined behavior, so every previously
//! running match is fully terminated before the requested one is launched.

use crate::engine::snapshot::{Session, StartedScheduler};
use crate::error::TargetFailure;
use crate::models::{ApplicationResult, DirectiveGroup, GovernorSetting, Outcome, SchedulerSetting};
use crate::system::fs::TunableFs;
use crate::system::process::{Pid, ProcessControl, SchedSignal, SchedulerProcess};
use crate::{log_info, log_warn};
use lazy_static::lazy_static;
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root of the per-core cpufreq tree.
pub const CPU_SYSFS_ROOT: &str = "/sys/devices/system/cpu";

/// Grace period after the interrupt signal.
pub const INTERRUPT_GRACE: Duration = Duration::from_millis(500);
/// Grace period after the terminate signal.
pub const TERMINATE_GRACE: Duration = Duration::from_millis(500);
/// Settling period after the kill signal; no liveness check follows it.
pub const KILL_GRACE: Duration = Duration::from_millis(200);

lazy_static! {
    static ref CPU_DIR: Regex = Regex::new(r"^cpu[0-9]+$").expect("invalid cpu dir regex");
}

/// Discover every per-core governor control file, ordered by core number.
pub fn governor_paths<F: TunableFs>(fs: &F) -> Vec<(String, PathBuf)> {
    let root = Path::new(CPU_SYSFS_ROOT);
    let mut cores: Vec<String> = match fs.list_dir(root) {
        Ok(entries) => entries.into_iter().filter(|n| CPU_DIR.is_match(n)).collect(),
        Err(_) => return Vec::new(),
    };
    cores.sort_by_key(|n| n[3..].parse::<u32>().unwrap_or(u32::MAX));

    let mut paths = Vec::new();
    for core in cores {
        let path = root.join(&core).join("cpufreq/scaling_governor");
        if fs.exists(&path) {
            paths.push((core, path));
        }
    }
    paths
}

/// Write a governor to every discovered core, one outcome per core.
pub fn apply_governor<F: TunableFs>(
    fs: &F,
    session: &mut Session,
    governor: &GovernorSetting,
    result: &mut ApplicationResult,
) {
    let value = match governor {
        GovernorSetting::Unset => {
            result.record(
                DirectiveGroup::Cpu,
                "governor",
                Outcome::Skipped("unset".to_string()),
            );
            return;
        }
        GovernorSetting::Governor(value) => value,
    };

    let targets = governor_paths(fs);
    if targets.is_empty() {
        log_warn!("[cpu] no cpufreq governor files found under {}", CPU_SYSFS_ROOT);
        result.record(
            DirectiveGroup::Cpu,
            "governor",
            Outcome::Skipped("no cpufreq governor files found".to_string()),
        );
        return;
    }

    log_info!("[cpu] applying governor '{}' to {} core(s)", value, targets.len());
    for (core, path) in &targets {
        let outcome = write_governor(fs, Some(&mut *session), core, path, value);
        result.record(DirectiveGroup::Cpu, core.as_str(), outcome);
    }
}

fn write_governor<F: TunableFs>(
    fs: &F,
    session: Option<&mut Session>,
    core: &str,
    path: &Path,
    value: &str,
) -> Outcome {
    if !fs.is_writable(path) {
        return Outcome::Failed(TargetFailure::NotWritable);
    }
    if let Some(session) = session {
        if let Ok(previous) = fs.read_to_string(path) {
            session.snapshot.record_governor(core, previous.trim());
        }
    }
    match fs.write(path, value) {
        Ok(()) => Outcome::Applied,
        Err(e) => Outcome::Failed(TargetFailure::WriteError(e.to_string())),
    }
}

/// Rewrite one core's snapshotted governor; no snapshot capture.
pub(crate) fn restore_governor<F: TunableFs>(fs: &F, core: &str, value: &str) -> Outcome {
    let path = Path::new(CPU_SYSFS_ROOT)
        .join(core)
        .join("cpufreq/scaling_governor");
    if !fs.exists(&path) {
        return Outcome::Failed(TargetFailure::NotWritable);
    }
    write_governor(fs, None, core, &path, value)
}

/// Scheduler termination escalation states.
///
/// The transition guard at each stage is "still alive after the previous
/// signal plus its grace period"; the kill stage has no guard afterwards
/// because SIGKILL is treated as unconditionally effective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationState {
    Running,
    InterruptSent,
    TerminateSent,
    KillSent,
    Dead,
}

// Signal delivery errors split two ways: the process vanished between the
// liveness check and the signal (NotFound, from ESRCH), or delivery was
// refused for a live process (e.g. EPERM). Only the former means dead;
// the latter keeps escalating through the remaining stages.
fn signal_found_target<P: ProcessControl>(procs: &P, pid: Pid, signal: SchedSignal) -> bool {
    match procs.signal(pid, signal) {
        Ok(()) => true,
        Err(e) => e.kind() != io::ErrorKind::NotFound,
    }
}

/// Drive one process through the escalating termination sequence.
///
/// Worst case blocks for `INTERRUPT_GRACE + TERMINATE_GRACE + KILL_GRACE`
/// (~1.2s).
pub fn terminate_process<P: ProcessControl>(procs: &P, pid: Pid) -> TerminationState {
    let mut state = TerminationState::Running;
    loop {
        state = match state {
            TerminationState::Running => {
                if !procs.is_alive(pid) || !signal_found_target(procs, pid, SchedSignal::Interrupt)
                {
                    TerminationState::Dead
                } else {
                    procs.wait(INTERRUPT_GRACE);
                    TerminationState::InterruptSent
                }
            }
            TerminationState::InterruptSent => {
                if !procs.is_alive(pid) || !signal_found_target(procs, pid, SchedSignal::Terminate)
                {
                    TerminationState::Dead
                } else {
                    procs.wait(TERMINATE_GRACE);
                    TerminationState::TerminateSent
                }
            }
            TerminationState::TerminateSent => {
                if !procs.is_alive(pid) {
                    TerminationState::Dead
                } else {
                    let _ = procs.signal(pid, SchedSignal::Kill);
                    procs.wait(KILL_GRACE);
                    TerminationState::KillSent
                }
            }
            TerminationState::KillSent | TerminationState::Dead => {
                return TerminationState::Dead;
            }
        };
    }
}

/// Terminate every running scheduler match plus the session-owned PID.
fn drain_schedulers<P: ProcessControl>(procs: &P, session: &mut Session) {
    let mut targets = procs.running_schedulers();
    // Pre-mutation state for the snapshot: was anything attached at all?
    session.snapshot.record_scheduler_running(!targets.is_empty());

    if let Some(started) = session.started_scheduler.take() {
        if !targets.iter().any(|p| p.pid == started.pid) {
            targets.push(SchedulerProcess {
                pid: started.pid,
                name: started.name,
            });
        }
    }

    for process in targets {
        log_info!("[cpu] terminating scheduler '{}' (pid {})", process.name, process.pid);
        terminate_process(procs, process.pid);
    }
}

/// Stop and/or replace the active pluggable scheduler.
///
/// `Unset` touches nothing, not even process enumeration. `Stop` drains.
/// `Start` resolves the executable first (an unresolvable name must not
/// cost us the running scheduler), then drains, then launches detached and
/// records the owned PID in the session.
pub fn handle_scheduler<P: ProcessControl>(
    procs: &P,
    session: &mut Session,
    scheduler: &SchedulerSetting,
    result: &mut ApplicationResult,
) {
    match scheduler {
        SchedulerSetting::Unset => {
            result.record(
                DirectiveGroup::Cpu,
                "scheduler",
                Outcome::Skipped("unset".to_string()),
            );
        }
        SchedulerSetting::Stop => {
            drain_schedulers(procs, session);
            log_info!("[cpu] scheduler stopped, none started");
            result.record(DirectiveGroup::Cpu, "scheduler", Outcome::Applied);
        }
        SchedulerSetting::Start(name) => {
            let executable = match procs.resolve_scheduler(name) {
                Some(path) => path,
                None => {
                    result.record(
                        DirectiveGroup::Cpu,
                        "scheduler",
                        Outcome::Failed(TargetFailure::SchedulerNotFound(name.clone())),
                    );
                    return;
                }
            };
            drain_schedulers(procs, session);
            match procs.spawn_scheduler(&executable) {
                Ok(pid) => {
                    log_info!("[cpu] scheduler '{}' started (pid {})", name, pid);
                    session.started_scheduler = Some(StartedScheduler {
                        pid,
                        name: name.clone(),
                    });
                    result.record(DirectiveGroup::Cpu, "scheduler", Outcome::Applied);
                }
                Err(e) => {
                    result.record(
                        DirectiveGroup::Cpu,
                        "scheduler",
                        Outcome::Failed(TargetFailure::WriteError(format!(
                            "failed to launch '{}': {}",
                            name, e
                        ))),
                    );
                }
            }
        }
    }
}
