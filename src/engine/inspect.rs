//! Read-only system state queries backing the listing surfaces.

use crate::engine::cpu::CPU_SYSFS_ROOT;
use crate::engine::disk::{self, BLOCK_SYSFS_ROOT};
use crate::models::{NONE, UNSET};
use crate::system::fs::{SelectorFile, TunableFs};
use crate::system::process::ProcessControl;
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// Kconfig line proving the kernel carries the extensible scheduler class.
const SCX_CONFIG_LINE: &str = "CONFIG_SCHED_CLASS_EXT=y";

/// Governors accepted on this machine, with the no-op spelling first.
///
/// Per-core lists are identical in practice, so cpu0's advertisement stands
/// for all of them.
pub fn available_governors<F: TunableFs>(fs: &F) -> Vec<String> {
    let path = Path::new(CPU_SYSFS_ROOT).join("cpu0/cpufreq/scaling_available_governors");
    let mut governors = vec![UNSET.to_string()];
    if let Ok(content) = fs.read_to_string(&path) {
        governors.extend(content.split_whitespace().map(|s| s.to_string()));
    }
    governors
}

/// Governor currently active on cpu0.
pub fn current_governor<F: TunableFs>(fs: &F) -> Option<String> {
    let path = Path::new(CPU_SYSFS_ROOT).join("cpu0/cpufreq/scaling_governor");
    fs.read_to_string(&path).ok().map(|s| s.trim().to_string())
}

/// Name of the first running pluggable scheduler, if any.
pub fn running_scheduler<P: ProcessControl>(procs: &P) -> Option<String> {
    procs.running_schedulers().into_iter().next().map(|p| p.name)
}

/// Scheduler choices: the two directive spellings plus installed binaries.
pub fn available_schedulers<P: ProcessControl>(procs: &P) -> Vec<String> {
    let mut schedulers = vec![UNSET.to_string(), NONE.to_string()];
    schedulers.extend(procs.installed_schedulers());
    schedulers
}

/// I/O scheduler selector state for every physical block device.
///
/// Loop and ram devices have no meaningful elevator choice and are skipped.
pub fn disk_scheduler_info<F: TunableFs>(fs: &F) -> BTreeMap<String, SelectorFile> {
    let mut info = BTreeMap::new();
    let devices = match fs.list_dir(Path::new(BLOCK_SYSFS_ROOT)) {
        Ok(devices) => devices,
        Err(_) => return info,
    };
    for device in devices {
        if device.starts_with("loop") || device.starts_with("ram") {
            continue;
        }
        let path = disk::scheduler_path(&device);
        if let Ok(content) = fs.read_to_string(&path) {
            if let Some(selector) = SelectorFile::parse(&content) {
                info.insert(device, selector);
            }
        }
    }
    info
}

/// Whether the running kernel was built with sched_ext support.
///
/// Reads the gzipped build config at `/proc/config.gz`; kernels without
/// `CONFIG_IKCONFIG_PROC` report `false` rather than erroring.
pub fn kernel_supports_scx<F: TunableFs>(fs: &F) -> bool {
    let bytes = match fs.read_bytes(Path::new("/proc/config.gz")) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut config = String::new();
    if GzDecoder::new(bytes.as_slice()).read_to_string(&mut config).is_err() {
        return false;
    }
    config.lines().any(|line| line.trim() == SCX_CONFIG_LINE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::fs::MemoryFs;
    use crate::system::process::ScriptedProcesses;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(content: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_available_governors_lead_with_unset() {
        let fs = MemoryFs::new();
        fs.add(
            "/sys/devices/system/cpu/cpu0/cpufreq/scaling_available_governors",
            "performance powersave\n",
        );
        assert_eq!(
            available_governors(&fs),
            vec!["unset", "performance", "powersave"]
        );
    }

    #[test]
    fn test_governor_listing_survives_missing_cpufreq() {
        let fs = MemoryFs::new();
        assert_eq!(available_governors(&fs), vec!["unset"]);
        assert!(current_governor(&fs).is_none());
    }

    #[test]
    fn test_scheduler_listing_includes_directive_spellings() {
        let procs = ScriptedProcesses::new();
        procs.set_installed(&["scx_bpfland", "scx_rusty"]);
        assert_eq!(
            available_schedulers(&procs),
            vec!["unset", "none", "scx_bpfland", "scx_rusty"]
        );
    }

    #[test]
    fn test_disk_info_skips_virtual_devices() {
        let fs = MemoryFs::new();
        fs.add("/sys/block/sda/queue/scheduler", "none [mq-deadline] bfq\n");
        fs.add("/sys/block/loop0/queue/scheduler", "[none]\n");
        fs.add("/sys/block/ram0/queue/scheduler", "[none]\n");
        let info = disk_scheduler_info(&fs);
        assert_eq!(info.len(), 1);
        assert_eq!(info["sda"].current, "mq-deadline");
        assert_eq!(info["sda"].available, vec!["none", "mq-deadline", "bfq"]);
    }

    #[test]
    fn test_scx_detection_from_gzipped_config() {
        let fs = MemoryFs::new();
        fs.add_bytes(
            "/proc/config.gz",
            gzip("CONFIG_SMP=y\nCONFIG_SCHED_CLASS_EXT=y\n"),
        );
        assert!(kernel_supports_scx(&fs));
    }

    #[test]
    fn test_scx_detection_negative_cases() {
        let fs = MemoryFs::new();
        assert!(!kernel_supports_scx(&fs));
        fs.add_bytes("/proc/config.gz", gzip("CONFIG_SMP=y\n"));
        assert!(!kernel_supports_scx(&fs));
        // Commented-out option must not count.
        let fs = MemoryFs::new();
        fs.add_bytes("/proc/config.gz", gzip("# CONFIG_SCHED_CLASS_EXT is not set\n"));
        assert!(!kernel_supports_scx(&fs));
    }
}
