//! End-to-end engine tests against the in-memory system doubles.

use std::str::FromStr;
use volt_engine::engine::SettingsEngine;
use volt_engine::models::{
    CpuDirective, DirectiveBundle, DirectiveGroup, DiskDirective, KernelDirective, OverallStatus,
};
use volt_engine::system::fs::MemoryFs;
use volt_engine::system::process::ScriptedProcesses;

const GOVERNOR_PATH: &str = "/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor";
const SDA_SCHEDULER: &str = "/sys/block/sda/queue/scheduler";
const SWAPPINESS: &str = "/proc/sys/vm/swappiness";

fn single_core_machine() -> MemoryFs {
    let fs = MemoryFs::new();
    fs.add(GOVERNOR_PATH, "powersave\n");
    fs.add(SDA_SCHEDULER, "none [mq-deadline] bfq\n");
    fs.add(SWAPPINESS, "60\n");
    fs
}

fn full_bundle() -> DirectiveBundle {
    let mut bundle = DirectiveBundle::default();
    bundle.cpu = Some(CpuDirective::from_tokens("performance", "unset").unwrap());
    bundle
        .add_disk(DiskDirective::from_str("sda:bfq").unwrap())
        .unwrap();
    bundle.push_kernel(KernelDirective::from_str("/proc/sys/vm/swappiness:10").unwrap());
    bundle
}

#[test]
fn test_full_bundle_application() {
    let mut engine = SettingsEngine::new(single_core_machine(), ScriptedProcesses::new());
    let result = engine.apply_bundle(&full_bundle());

    assert_eq!(result.overall_status(), OverallStatus::Success);
    assert_eq!(engine.fs().contents(GOVERNOR_PATH).unwrap(), "performance");
    assert_eq!(engine.fs().contents(SDA_SCHEDULER).unwrap(), "bfq");
    assert_eq!(engine.fs().contents(SWAPPINESS).unwrap(), "10");
    assert_eq!(engine.fs().write_count(), 3);
    // Scheduler slot is unset: no process was enumerated, signaled or spawned.
    assert!(engine.procs().events().is_empty());
}

#[test]
fn test_reapplication_is_idempotent() {
    let mut engine = SettingsEngine::new(single_core_machine(), ScriptedProcesses::new());
    let bundle = full_bundle();

    let first = engine.apply_bundle(&bundle);
    let second = engine.apply_bundle(&bundle);

    assert_eq!(first.overall_status(), OverallStatus::Success);
    assert_eq!(second.overall_status(), OverallStatus::Success);
    assert_eq!(engine.fs().contents(GOVERNOR_PATH).unwrap(), "performance");
    // The disk scheduler is already bfq on the second pass and is skipped.
    let disk_outcome = second
        .outcomes()
        .iter()
        .find(|o| o.group == DirectiveGroup::Disk)
        .unwrap();
    assert!(format!("{}", disk_outcome.outcome).starts_with("skipped"));
}

#[test]
fn test_revert_restores_first_seen_values() {
    let mut engine = SettingsEngine::new(single_core_machine(), ScriptedProcesses::new());

    // Two successive writes to the same parameter; the snapshot must keep
    // the value seen before the first one.
    let mut first = DirectiveBundle::default();
    first.push_kernel(KernelDirective::from_str("/proc/sys/vm/swappiness:10").unwrap());
    let mut second = DirectiveBundle::default();
    second.push_kernel(KernelDirective::from_str("/proc/sys/vm/swappiness:25").unwrap());

    engine.apply_bundle(&first);
    engine.apply_bundle(&second);
    assert_eq!(engine.fs().contents(SWAPPINESS).unwrap(), "25");

    let revert = engine.revert_session();
    assert!(revert.is_success());
    assert_eq!(engine.fs().contents(SWAPPINESS).unwrap(), "60");
    assert!(engine.session().snapshot.is_empty());
}

#[test]
fn test_revert_covers_every_group() {
    let mut engine = SettingsEngine::new(single_core_machine(), ScriptedProcesses::new());
    engine.apply_bundle(&full_bundle());
    let revert = engine.revert_session();

    assert!(revert.is_success());
    assert_eq!(engine.fs().contents(GOVERNOR_PATH).unwrap(), "powersave");
    assert_eq!(engine.fs().contents(SDA_SCHEDULER).unwrap(), "mq-deadline");
    assert_eq!(engine.fs().contents(SWAPPINESS).unwrap(), "60");
}

#[test]
fn test_scheduler_lifecycle_through_sessions() {
    let fs = MemoryFs::new();
    let procs = ScriptedProcesses::new();
    procs.set_installed(&["scx_bpfland"]);
    let mut engine = SettingsEngine::new(fs, procs);

    let mut bundle = DirectiveBundle::default();
    bundle.cpu = Some(CpuDirective::from_tokens("unset", "scx_bpfland").unwrap());
    let result = engine.apply_bundle(&bundle);
    assert!(result.is_success());
    assert_eq!(engine.procs().running_names(), vec!["scx_bpfland"]);

    // Revert terminates the scheduler the session started.
    let revert = engine.revert_session();
    assert!(revert.is_success());
    assert!(engine.procs().running_names().is_empty());
}

#[test]
fn test_partial_disk_failure_does_not_block_other_groups() {
    let fs = single_core_machine();
    fs.add("/sys/block/sdb/queue/scheduler", "[none] mq-deadline\n");
    let mut engine = SettingsEngine::new(fs, ScriptedProcesses::new());

    let mut bundle = full_bundle();
    // bfq is not advertised on sdb.
    bundle
        .add_disk(DiskDirective::from_str("sdb:bfq").unwrap())
        .unwrap();
    let result = engine.apply_bundle(&bundle);

    assert_eq!(result.overall_status(), OverallStatus::PartialFailure);
    assert_eq!(result.counts_for(DirectiveGroup::Disk), (1, 1, 2));
    // The kernel parameter after the failing disk still landed.
    assert_eq!(engine.fs().contents(SWAPPINESS).unwrap(), "10");
}

#[test]
fn test_all_targets_failing_is_fatal() {
    let fs = MemoryFs::new();
    fs.add_readonly(SWAPPINESS, "60\n");
    let mut engine = SettingsEngine::new(fs, ScriptedProcesses::new());

    let mut bundle = DirectiveBundle::default();
    bundle.push_kernel(KernelDirective::from_str("/proc/sys/vm/swappiness:10").unwrap());
    let result = engine.apply_bundle(&bundle);

    assert_eq!(result.overall_status(), OverallStatus::Fatal);
    assert_eq!(engine.fs().write_count(), 0);
    // Nothing was captured, so revert has nothing to do.
    assert!(engine.revert_session().outcomes().is_empty());
}
