//! Kernel parameter writes under `/proc/sys` and `/sys`.
//!
//! Paths come in absolute from the directive layer; this module validates
//! writability, captures the prior value for reversion, and writes. The
//! [`KNOWN_TUNABLES`] catalog carries the parameters the inspection surface
//! advertises, with their control-file paths.

use crate::engine::snapshot::Session;
use crate::error::TargetFailure;
use crate::log_info;
use crate::models::{ApplicationResult, DirectiveGroup, KernelDirective, Outcome};
use crate::system::fs::{effective_value, TunableFs};
use lazy_static::lazy_static;
use std::path::Path;

/// Apply every kernel parameter directive, one outcome per path.
pub fn apply_kernel<F: TunableFs>(
    fs: &F,
    session: &mut Session,
    directives: &[KernelDirective],
    result: &mut ApplicationResult,
) {
    if directives.is_empty() {
        return;
    }
    log_info!("[kernel] applying {} parameter(s)", directives.len());
    for directive in directives {
        let outcome = write_value(fs, Some(&mut *session), &directive.path, &directive.value);
        result.record(
            DirectiveGroup::Kernel,
            directive.path.display().to_string(),
            outcome,
        );
    }
}

fn write_value<F: TunableFs>(
    fs: &F,
    session: Option<&mut Session>,
    path: &Path,
    value: &str,
) -> Outcome {
    if !fs.exists(path) || !fs.is_writable(path) {
        return Outcome::Failed(TargetFailure::NotWritable);
    }
    if let Some(session) = session {
        if let Ok(content) = fs.read_to_string(path) {
            session.snapshot.record_kernel(path, &effective_value(&content));
        }
    }
    match fs.write(path, value) {
        Ok(()) => Outcome::Applied,
        Err(e) => Outcome::Failed(TargetFailure::WriteError(e.to_string())),
    }
}

/// Rewrite one snapshotted parameter; no snapshot capture.
pub(crate) fn restore_value<F: TunableFs>(fs: &F, path: &Path, value: &str) -> Outcome {
    write_value(fs, None, path, value)
}

/// Catalog entry for a kernel tunable the inspection surface knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunableInfo {
    pub name: &'static str,
    pub path: &'static str,
    pub summary: &'static str,
    /// Choice files list every accepted value with the live one bracketed.
    pub is_dynamic: bool,
}

lazy_static! {
    /// Curated kernel tunables, ordered roughly by subsystem.
    pub static ref KNOWN_TUNABLES: Vec<TunableInfo> = vec![
        TunableInfo {
            name: "compaction_proactiveness",
            path: "/proc/sys/vm/compaction_proactiveness",
            summary: "How aggressively the kernel compacts memory in the background",
            is_dynamic: false,
        },
        TunableInfo {
            name: "watermark_boost_factor",
            path: "/proc/sys/vm/watermark_boost_factor",
            summary: "Reclaim boost on memory fragmentation events",
            is_dynamic: false,
        },
        TunableInfo {
            name: "min_free_kbytes",
            path: "/proc/sys/vm/min_free_kbytes",
            summary: "Minimum free memory reserve in kilobytes",
            is_dynamic: false,
        },
        TunableInfo {
            name: "max_map_count",
            path: "/proc/sys/vm/max_map_count",
            summary: "Maximum memory map areas per process",
            is_dynamic: false,
        },
        TunableInfo {
            name: "swappiness",
            path: "/proc/sys/vm/swappiness",
            summary: "Preference for swapping out anonymous pages",
            is_dynamic: false,
        },
        TunableInfo {
            name: "dirty_ratio",
            path: "/proc/sys/vm/dirty_ratio",
            summary: "Dirty page ceiling before writers block, percent of RAM",
            is_dynamic: false,
        },
        TunableInfo {
            name: "dirty_background_ratio",
            path: "/proc/sys/vm/dirty_background_ratio",
            summary: "Dirty page level that starts background writeback",
            is_dynamic: false,
        },
        TunableInfo {
            name: "dirty_expire_centisecs",
            path: "/proc/sys/vm/dirty_expire_centisecs",
            summary: "Age at which dirty data must be written out",
            is_dynamic: false,
        },
        TunableInfo {
            name: "dirty_writeback_centisecs",
            path: "/proc/sys/vm/dirty_writeback_centisecs",
            summary: "Interval between periodic writeback wakeups",
            is_dynamic: false,
        },
        TunableInfo {
            name: "vfs_cache_pressure",
            path: "/proc/sys/vm/vfs_cache_pressure",
            summary: "Reclaim pressure on dentry and inode caches",
            is_dynamic: false,
        },
        TunableInfo {
            name: "thp_enabled",
            path: "/sys/kernel/mm/transparent_hugepage/enabled",
            summary: "Transparent hugepage allocation policy",
            is_dynamic: true,
        },
        TunableInfo {
            name: "thp_shmem_enabled",
            path: "/sys/kernel/mm/transparent_hugepage/shmem_enabled",
            summary: "Transparent hugepage policy for shmem and tmpfs",
            is_dynamic: true,
        },
        TunableInfo {
            name: "thp_defrag",
            path: "/sys/kernel/mm/transparent_hugepage/defrag",
            summary: "Defragmentation effort for hugepage allocation",
            is_dynamic: true,
        },
        TunableInfo {
            name: "zone_reclaim_mode",
            path: "/proc/sys/vm/zone_reclaim_mode",
            summary: "NUMA zone reclaim behavior",
            is_dynamic: false,
        },
        TunableInfo {
            name: "page_lock_unfairness",
            path: "/proc/sys/vm/page_lock_unfairness",
            summary: "Times the page lock may be stolen from a waiter",
            is_dynamic: false,
        },
        TunableInfo {
            name: "sched_cfs_bandwidth_slice_us",
            path: "/proc/sys/kernel/sched_cfs_bandwidth_slice_us",
            summary: "CFS bandwidth slice transferred per pool grab",
            is_dynamic: false,
        },
        TunableInfo {
            name: "sched_autogroup_enabled",
            path: "/proc/sys/kernel/sched_autogroup_enabled",
            summary: "Automatic per-session task grouping",
            is_dynamic: false,
        },
        TunableInfo {
            name: "watchdog",
            path: "/proc/sys/kernel/watchdog",
            summary: "Soft and hard lockup detectors",
            is_dynamic: false,
        },
        TunableInfo {
            name: "nmi_watchdog",
            path: "/proc/sys/kernel/nmi_watchdog",
            summary: "Hard lockup detector on the NMI",
            is_dynamic: false,
        },
        TunableInfo {
            name: "laptop_mode",
            path: "/proc/sys/vm/laptop_mode",
            summary: "Batch disk writes to extend spin-down intervals",
            is_dynamic: false,
        },
    ];
}

/// The whole catalog.
pub fn known_tunables() -> &'static [TunableInfo] {
    &KNOWN_TUNABLES
}

/// Look up a catalog entry by name.
pub fn find_tunable(name: &str) -> Option<&'static TunableInfo> {
    KNOWN_TUNABLES.iter().find(|t| t.name == name)
}

/// Live value of a cataloged tunable, brackets resolved for choice files.
pub fn current_value<F: TunableFs>(fs: &F, info: &TunableInfo) -> Option<String> {
    let content = fs.read_to_string(Path::new(info.path)).ok()?;
    Some(effective_value(&content))
}

/// Accepted values of a choice-file tunable, brackets stripped.
///
/// Plain tunables accept free-form numbers, so this returns `None` for them.
pub fn possible_values<F: TunableFs>(fs: &F, info: &TunableInfo) -> Option<Vec<String>> {
    if !info.is_dynamic {
        return None;
    }
    let content = fs.read_to_string(Path::new(info.path)).ok()?;
    let values = content
        .split_whitespace()
        .map(|token| token.trim_matches(|c| c == '[' || c == ']').to_string())
        .collect();
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::fs::MemoryFs;
    use std::path::PathBuf;

    #[test]
    fn test_write_captures_prior_value() {
        let fs = MemoryFs::new();
        fs.add("/proc/sys/vm/swappiness", "60\n");
        let mut session = Session::default();
        let outcome = write_value(
            &fs,
            Some(&mut session),
            Path::new("/proc/sys/vm/swappiness"),
            "10",
        );
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(
            session.snapshot.kernel_values()[Path::new("/proc/sys/vm/swappiness")],
            "60"
        );
        assert_eq!(fs.contents("/proc/sys/vm/swappiness").unwrap(), "10");
    }

    #[test]
    fn test_choice_file_snapshot_strips_brackets() {
        let fs = MemoryFs::new();
        let path = "/sys/kernel/mm/transparent_hugepage/enabled";
        fs.add(path, "always [madvise] never\n");
        let mut session = Session::default();
        write_value(&fs, Some(&mut session), Path::new(path), "never");
        assert_eq!(session.snapshot.kernel_values()[Path::new(path)], "madvise");
    }

    #[test]
    fn test_missing_file_is_not_writable() {
        let fs = MemoryFs::new();
        let mut session = Session::default();
        let outcome = write_value(
            &fs,
            Some(&mut session),
            Path::new("/proc/sys/vm/nonexistent"),
            "1",
        );
        assert_eq!(outcome, Outcome::Failed(TargetFailure::NotWritable));
        assert!(session.snapshot.is_empty());
    }

    #[test]
    fn test_apply_kernel_records_path_targets() {
        let fs = MemoryFs::new();
        fs.add("/proc/sys/vm/swappiness", "60\n");
        let mut session = Session::default();
        let mut result = ApplicationResult::new();
        let directives = vec![KernelDirective {
            path: PathBuf::from("/proc/sys/vm/swappiness"),
            value: "10".to_string(),
        }];
        apply_kernel(&fs, &mut session, &directives, &mut result);
        assert_eq!(result.outcomes()[0].target, "/proc/sys/vm/swappiness");
        assert!(result.is_success());
    }

    #[test]
    fn test_catalog_lookup() {
        let info = find_tunable("swappiness").unwrap();
        assert_eq!(info.path, "/proc/sys/vm/swappiness");
        assert!(!info.is_dynamic);
        assert!(find_tunable("no_such_tunable").is_none());
    }

    #[test]
    fn test_possible_values_only_for_choice_files() {
        let fs = MemoryFs::new();
        fs.add(
            "/sys/kernel/mm/transparent_hugepage/enabled",
            "always [madvise] never\n",
        );
        fs.add("/proc/sys/vm/swappiness", "60\n");

        let thp = find_tunable("thp_enabled").unwrap();
        assert_eq!(
            possible_values(&fs, thp).unwrap(),
            vec!["always", "madvise", "never"]
        );

        let swap = find_tunable("swappiness").unwrap();
        assert!(possible_values(&fs, swap).is_none());
    }
}
