//! Core data types for the volt settings engine.
//!
//! The wire encoding crossing the privileged execution channel is a set of
//! positional `name:value` tokens (split on the first colon only) plus two
//! bare tokens for the CPU directive. Parsing lives here; the `cli` module
//! only walks flags and feeds tokens into these constructors.

use crate::error::{DirectiveError, TargetFailure};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Sentinel spelling for "leave current state untouched".
pub const UNSET: &str = "unset";

/// Sentinel spelling for "stop the running scheduler, start nothing".
pub const NONE: &str = "none";

/// CPU frequency-scaling governor selection.
///
/// `Unset` is never written to any governor file and never enters the
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GovernorSetting {
    #[default]
    Unset,
    Governor(String),
}

impl GovernorSetting {
    pub fn parse(token: &str) -> Result<Self, DirectiveError> {
        match token {
            "" => Err(DirectiveError::EmptyField(token.to_string(), "governor")),
            UNSET => Ok(GovernorSetting::Unset),
            name => Ok(GovernorSetting::Governor(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GovernorSetting::Unset => UNSET,
            GovernorSetting::Governor(name) => name,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, GovernorSetting::Unset)
    }
}

impl fmt::Display for GovernorSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for GovernorSetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for GovernorSetting {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct GovernorVisitor;

        impl<'de> Visitor<'de> for GovernorVisitor {
            type Value = GovernorSetting;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a governor name or \"unset\"")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<GovernorSetting, E> {
                GovernorSetting::parse(value).map_err(|e| de::Error::custom(e.to_string()))
            }
        }

        deserializer.deserialize_str(GovernorVisitor)
    }
}

/// Pluggable scheduler selection, the three-way semantics of the original
/// `"unset"`/`"none"` strings as distinct variants:
/// leave untouched / stop without replacement / replace with the named one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SchedulerSetting {
    #[default]
    Unset,
    Stop,
    Start(String),
}

impl SchedulerSetting {
    pub fn parse(token: &str) -> Result<Self, DirectiveError> {
        match token {
            "" => Err(DirectiveError::EmptyField(token.to_string(), "scheduler")),
            UNSET => Ok(SchedulerSetting::Unset),
            NONE => Ok(SchedulerSetting::Stop),
            name => Ok(SchedulerSetting::Start(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SchedulerSetting::Unset => UNSET,
            SchedulerSetting::Stop => NONE,
            SchedulerSetting::Start(name) => name,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, SchedulerSetting::Unset)
    }
}

impl fmt::Display for SchedulerSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for SchedulerSetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SchedulerSetting {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SchedulerVisitor;

        impl<'de> Visitor<'de> for SchedulerVisitor {
            type Value = SchedulerSetting;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a scheduler name, \"unset\" or \"none\"")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<SchedulerSetting, E> {
                SchedulerSetting::parse(value).map_err(|e| de::Error::custom(e.to_string()))
            }
        }

        deserializer.deserialize_str(SchedulerVisitor)
    }
}

/// Governor plus scheduler selection, always carried as a pair.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CpuDirective {
    pub governor: GovernorSetting,
    pub scheduler: SchedulerSetting,
}

impl CpuDirective {
    pub fn from_tokens(governor: &str, scheduler: &str) -> Result<Self, DirectiveError> {
        Ok(CpuDirective {
            governor: GovernorSetting::parse(governor)?,
            scheduler: SchedulerSetting::parse(scheduler)?,
        })
    }

    pub fn is_noop(&self) -> bool {
        self.governor.is_unset() && self.scheduler.is_unset()
    }
}

/// I/O scheduler assignment for one block device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskDirective {
    pub device: String,
    pub scheduler: String,
}

impl FromStr for DiskDirective {
    type Err = DirectiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (device, scheduler) = s
            .split_once(':')
            .ok_or_else(|| DirectiveError::MissingSeparator(s.to_string()))?;
        if device.is_empty() {
            return Err(DirectiveError::EmptyField(s.to_string(), "device name"));
        }
        if scheduler.is_empty() {
            return Err(DirectiveError::EmptyField(s.to_string(), "scheduler name"));
        }
        Ok(DiskDirective {
            device: device.to_string(),
            scheduler: scheduler.to_string(),
        })
    }
}

/// One kernel tunable write: absolute file path plus the value to write.
///
/// The wire token splits on the first colon only; values may contain colons,
/// paths may not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelDirective {
    pub path: PathBuf,
    pub value: String,
}

impl FromStr for KernelDirective {
    type Err = DirectiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, value) = s
            .split_once(':')
            .ok_or_else(|| DirectiveError::MissingSeparator(s.to_string()))?;
        if path.is_empty() {
            return Err(DirectiveError::EmptyField(s.to_string(), "path"));
        }
        if value.is_empty() {
            return Err(DirectiveError::EmptyField(s.to_string(), "value"));
        }
        if !path.starts_with('/') {
            return Err(DirectiveError::RelativePath(path.to_string()));
        }
        Ok(KernelDirective {
            path: PathBuf::from(path),
            value: value.to_string(),
        })
    }
}

/// The three directive collections applied together in one request. Any of
/// them may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectiveBundle {
    #[serde(default)]
    pub cpu: Option<CpuDirective>,
    /// Keyed by device name; uniqueness enforced on insertion.
    #[serde(default)]
    pub disks: BTreeMap<String, String>,
    /// Ordered; order matters only for reporting, each write is independent.
    #[serde(default)]
    pub kernel: Vec<KernelDirective>,
}

impl DirectiveBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.disks.is_empty() && self.kernel.is_empty()
    }

    pub fn add_disk(&mut self, directive: DiskDirective) -> Result<(), DirectiveError> {
        if self.disks.contains_key(&directive.device) {
            return Err(DirectiveError::DuplicateDevice(directive.device));
        }
        self.disks.insert(directive.device, directive.scheduler);
        Ok(())
    }

    pub fn push_kernel(&mut self, directive: KernelDirective) {
        self.kernel.push(directive);
    }
}

fn default_revert_on_exit() -> bool {
    true
}

/// A named, persistable bundle plus the revert-on-exit preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub bundle: DirectiveBundle,
    #[serde(default = "default_revert_on_exit")]
    pub revert_on_exit: bool,
}

impl Profile {
    pub fn new(name: impl Into<String>, bundle: DirectiveBundle) -> Self {
        Profile {
            name: name.into(),
            bundle,
            revert_on_exit: true,
        }
    }
}

/// Which manager a target outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveGroup {
    Cpu,
    Disk,
    Kernel,
}

impl fmt::Display for DirectiveGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectiveGroup::Cpu => write!(f, "cpu"),
            DirectiveGroup::Disk => write!(f, "disk"),
            DirectiveGroup::Kernel => write!(f, "kernel"),
        }
    }
}

/// Per-target application outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped(String),
    Failed(TargetFailure),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Applied => write!(f, "applied"),
            Outcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            Outcome::Failed(failure) => write!(f, "failed ({})", failure),
        }
    }
}

/// Binary-or-better verdict over a whole bundle application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallStatus {
    Success,
    PartialFailure,
    Fatal,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Success => write!(f, "success"),
            OverallStatus::PartialFailure => write!(f, "partial failure"),
            OverallStatus::Fatal => write!(f, "failure"),
        }
    }
}

/// One recorded target outcome, tagged with its manager group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub group: DirectiveGroup,
    pub target: String,
    pub outcome: Outcome,
}

/// Ordered per-target outcomes plus the derived overall verdict.
///
/// Insertion order is preserved so progress reporting is deterministic:
/// CPU targets first, then disk, then kernel, in the order they were
/// attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationResult {
    outcomes: Vec<TargetOutcome>,
}

impl ApplicationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, group: DirectiveGroup, target: impl Into<String>, outcome: Outcome) {
        self.outcomes.push(TargetOutcome {
            group,
            target: target.into(),
            outcome,
        });
    }

    pub fn outcomes(&self) -> &[TargetOutcome] {
        &self.outcomes
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// `(applied, failed, total)` for one manager group. Skipped targets
    /// count toward total but neither applied nor failed.
    pub fn counts_for(&self, group: DirectiveGroup) -> (usize, usize, usize) {
        let mut applied = 0;
        let mut failed = 0;
        let mut total = 0;
        for entry in self.outcomes.iter().filter(|o| o.group == group) {
            total += 1;
            match entry.outcome {
                Outcome::Applied => applied += 1,
                Outcome::Failed(_) => failed += 1,
                Outcome::Skipped(_) => {}
            }
        }
        (applied, failed, total)
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_failure()).count()
    }

    /// All targets fine: `Success`. Every target failed: `Fatal`. Anything
    /// else with at least one failure: `PartialFailure`. Skipped targets
    /// count as fine.
    pub fn overall_status(&self) -> OverallStatus {
        let failed = self.failed_count();
        if failed == 0 {
            OverallStatus::Success
        } else if failed == self.outcomes.len() {
            OverallStatus::Fatal
        } else {
            OverallStatus::PartialFailure
        }
    }

    pub fn is_success(&self) -> bool {
        self.overall_status() == OverallStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_governor_sentinel_parses_to_unset() {
        assert_eq!(GovernorSetting::parse("unset").unwrap(), GovernorSetting::Unset);
        assert_eq!(
            GovernorSetting::parse("performance").unwrap(),
            GovernorSetting::Governor("performance".to_string())
        );
    }

    #[test]
    fn test_scheduler_three_way_semantics() {
        assert_eq!(SchedulerSetting::parse("unset").unwrap(), SchedulerSetting::Unset);
        assert_eq!(SchedulerSetting::parse("none").unwrap(), SchedulerSetting::Stop);
        assert_eq!(
            SchedulerSetting::parse("scx_bpfland").unwrap(),
            SchedulerSetting::Start("scx_bpfland".to_string())
        );
    }

    #[test]
    fn test_kernel_directive_splits_on_first_colon_only() {
        let directive: KernelDirective = "/proc/sys/kernel/core_pattern:|/usr/bin/handler %p:%s"
            .parse()
            .unwrap();
        assert_eq!(directive.path, PathBuf::from("/proc/sys/kernel/core_pattern"));
        assert_eq!(directive.value, "|/usr/bin/handler %p:%s");
    }

    #[test]
    fn test_kernel_directive_without_colon_is_malformed() {
        let err = "novalue".parse::<KernelDirective>().unwrap_err();
        assert_eq!(err, DirectiveError::MissingSeparator("novalue".to_string()));
    }

    #[test]
    fn test_kernel_directive_rejects_relative_path() {
        let err = "proc/sys/vm/swappiness:10".parse::<KernelDirective>().unwrap_err();
        assert_eq!(err, DirectiveError::RelativePath("proc/sys/vm/swappiness".to_string()));
    }

    #[test]
    fn test_disk_directive_parse() {
        let directive: DiskDirective = "sda:bfq".parse().unwrap();
        assert_eq!(directive.device, "sda");
        assert_eq!(directive.scheduler, "bfq");
        assert!("sda".parse::<DiskDirective>().is_err());
        assert!(":bfq".parse::<DiskDirective>().is_err());
        assert!("sda:".parse::<DiskDirective>().is_err());
    }

    #[test]
    fn test_bundle_rejects_duplicate_device() {
        let mut bundle = DirectiveBundle::new();
        bundle.add_disk("sda:bfq".parse().unwrap()).unwrap();
        let err = bundle.add_disk("sda:none".parse().unwrap()).unwrap_err();
        assert_eq!(err, DirectiveError::DuplicateDevice("sda".to_string()));
    }

    #[test]
    fn test_overall_status_all_applied() {
        let mut result = ApplicationResult::new();
        result.record(DirectiveGroup::Disk, "sda", Outcome::Applied);
        result.record(DirectiveGroup::Kernel, "/proc/sys/vm/swappiness", Outcome::Applied);
        assert_eq!(result.overall_status(), OverallStatus::Success);
    }

    #[test]
    fn test_overall_status_mixed_is_partial() {
        let mut result = ApplicationResult::new();
        result.record(DirectiveGroup::Disk, "sda", Outcome::Applied);
        result.record(
            DirectiveGroup::Disk,
            "sdb",
            Outcome::Failed(TargetFailure::DeviceNotFound),
        );
        assert_eq!(result.overall_status(), OverallStatus::PartialFailure);
    }

    #[test]
    fn test_overall_status_all_failed_is_fatal() {
        let mut result = ApplicationResult::new();
        result.record(
            DirectiveGroup::Disk,
            "sda",
            Outcome::Failed(TargetFailure::NotWritable),
        );
        assert_eq!(result.overall_status(), OverallStatus::Fatal);
    }

    #[test]
    fn test_skipped_counts_as_success() {
        let mut result = ApplicationResult::new();
        result.record(DirectiveGroup::Cpu, "governor", Outcome::Skipped("unset".to_string()));
        assert_eq!(result.overall_status(), OverallStatus::Success);
        assert_eq!(result.counts_for(DirectiveGroup::Cpu), (0, 0, 1));
    }

    #[test]
    fn test_profile_json_keeps_sentinel_spellings() {
        let mut bundle = DirectiveBundle::new();
        bundle.cpu = Some(CpuDirective::from_tokens("performance", "none").unwrap());
        let profile = Profile::new("gaming", bundle);
        let json = serde_json::to_string(&profile).unwrap();
        assert!(json.contains("\"governor\":\"performance\""));
        assert!(json.contains("\"scheduler\":\"none\""));

        let back: Profile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);
    }

    proptest! {
        #[test]
        fn prop_kernel_directive_parse_never_panics(s in ".{0,64}") {
            let _ = s.parse::<KernelDirective>();
        }

        #[test]
        fn prop_kernel_directive_preserves_colons_in_value(
            path in "/[a-z][a-z/_]{0,24}",
            value in "[ -~]{1,24}",
        ) {
            let token = format!("{}:{}", path, value);
            let directive: KernelDirective = token.parse().unwrap();
            prop_assert_eq!(directive.path, PathBuf::from(path));
            prop_assert_eq!(directive.value, value);
        }
    }
}
