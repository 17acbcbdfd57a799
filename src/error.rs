//! Error type hierarchy for the volt settings engine.
//!
//! Parse-time problems (`DirectiveError`) are fatal for the one directive
//! they describe. Apply-time problems (`TargetFailure`) are scoped to a
//! single target and never abort sibling targets in the same bundle.

use std::io;
use thiserror::Error;

/// Wire-encoding and directive validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("malformed directive '{0}': expected '<name>:<value>'")]
    MissingSeparator(String),

    #[error("malformed directive '{0}': empty {1}")]
    EmptyField(String, &'static str),

    #[error("cpu directive requires exactly '<governor> <scheduler>'")]
    IncompleteCpu,

    #[error("cpu directive given more than once")]
    DuplicateCpu,

    #[error("duplicate disk directive for device '{0}'")]
    DuplicateDevice(String),

    #[error("kernel parameter path '{0}' must be absolute")]
    RelativePath(String),

    #[error("unknown argument '{0}'")]
    UnknownArgument(String),

    #[error("flag '{0}' expects at least one '<name>:<value>' operand")]
    MissingOperands(&'static str),
}

/// Target-scoped application failures.
///
/// One variant per failure class of the apply path; each is attached to the
/// target it concerns via `Outcome::Failed` and reported without aborting
/// the rest of the bundle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetFailure {
    #[error("not writable")]
    NotWritable,

    #[error("write failed: {0}")]
    WriteError(String),

    #[error("device not found")]
    DeviceNotFound,

    #[error("scheduler '{requested}' not available (available: {})", available.join(" "))]
    SchedulerUnavailable {
        requested: String,
        available: Vec<String>,
    },

    #[error("scheduler executable '{0}' not found")]
    SchedulerNotFound(String),
}

/// Profile CRUD and profile-store errors.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("profile '{0}' already exists")]
    AlreadyExists(String),

    #[error("profile '{0}' not found")]
    NotFound(String),

    #[error("profile store I/O error: {0}")]
    Store(#[from] io::Error),

    #[error("profile store parse error: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_separator_display() {
        let err = DirectiveError::MissingSeparator("novalue".to_string());
        assert_eq!(
            err.to_string(),
            "malformed directive 'novalue': expected '<name>:<value>'"
        );
    }

    #[test]
    fn test_scheduler_unavailable_lists_advertised_set() {
        let err = TargetFailure::SchedulerUnavailable {
            requested: "bfq".to_string(),
            available: vec!["none".to_string(), "mq-deadline".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "scheduler 'bfq' not available (available: none mq-deadline)"
        );
    }

    #[test]
    fn test_profile_not_found_display() {
        let err = ProfileError::NotFound("gaming".to_string());
        assert_eq!(err.to_string(), "profile 'gaming' not found");
    }
}
