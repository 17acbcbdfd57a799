//! Privileged Linux settings application and reversion engine.
//!
//! `volt_engine` applies CPU frequency governors, pluggable (`sched_ext`)
//! CPU schedulers, per-disk I/O schedulers and kernel parameters, records
//! the pre-change values in a session snapshot, and can revert the whole
//! session in one call. The `volt-helper` binary wraps the engine in the
//! rigid argument format the unprivileged front end speaks over
//! `pkexec`.
//!
//! The engine itself is privilege-agnostic: it reports unwritable targets
//! per the failure taxonomy instead of pre-checking for root.

pub mod cli;
pub mod engine;
pub mod error;
pub mod models;
pub mod system;

// Re-exported for the log_* macros, which expand to `$crate::log::...`.
pub use log;

pub use engine::{system_engine, SettingsEngine};
pub use error::{DirectiveError, ProfileError, TargetFailure};
pub use models::{
    ApplicationResult, CpuDirective, DirectiveBundle, DirectiveGroup, DiskDirective,
    GovernorSetting, KernelDirective, Outcome, OverallStatus, Profile, SchedulerSetting,
    TargetOutcome,
};
