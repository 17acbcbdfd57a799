//! Argument parsing for the privileged helper.
//!
//! The wire format is deliberately rigid so the unprivileged front end can
//! build an invocation mechanically: `-c/--cpu` takes exactly two bare
//! tokens (governor, scheduler), `-d/--disk` and `-k/--kernel` each take a
//! run of `name:value` tokens. Parsing is all-or-nothing; a malformed
//! directive rejects the whole invocation before anything is applied.

use crate::error::DirectiveError;
use crate::models::{CpuDirective, DirectiveBundle, DiskDirective, KernelDirective};
use std::str::FromStr;

pub const USAGE: &str = "\
usage: volt-helper [OPTIONS]

  -c, --cpu GOVERNOR SCHEDULER   set the CPU frequency governor and the
                                 pluggable scheduler; either slot may be
                                 'unset' to leave it alone, and the
                                 scheduler slot accepts 'none' to stop
                                 whatever scheduler is running
  -d, --disk DEV:SCHED [...]     set the I/O scheduler of each named
                                 block device
  -k, --kernel PATH:VALUE [...]  write each value to its absolute
                                 kernel parameter path
  -h, --help                     show this help

exit status: 0 all directives applied, 1 any target failed,
2 malformed invocation";

/// A parsed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliRequest {
    Help,
    Apply(DirectiveBundle),
}

fn is_flag(token: &str) -> bool {
    token.starts_with('-') && token.len() > 1
}

/// Parse the arguments after the program name.
pub fn parse_args(args: &[String]) -> Result<CliRequest, DirectiveError> {
    if args.iter().any(|a| a == "-h" || a == "--help") {
        return Ok(CliRequest::Help);
    }

    let mut bundle = DirectiveBundle::default();
    let mut tokens = args.iter().peekable();

    while let Some(token) = tokens.next() {
        match token.as_str() {
            "-c" | "--cpu" => {
                if bundle.cpu.is_some() {
                    return Err(DirectiveError::DuplicateCpu);
                }
                let governor = tokens
                    .next()
                    .filter(|t| !is_flag(t))
                    .ok_or(DirectiveError::IncompleteCpu)?;
                let scheduler = tokens
                    .next()
                    .filter(|t| !is_flag(t))
                    .ok_or(DirectiveError::IncompleteCpu)?;
                bundle.cpu = Some(CpuDirective::from_tokens(governor, scheduler)?);
            }
            "-d" | "--disk" => {
                let mut consumed = 0;
                while tokens.peek().is_some_and(|t| !is_flag(t)) {
                    if let Some(operand) = tokens.next() {
                        bundle.add_disk(DiskDirective::from_str(operand)?)?;
                        consumed += 1;
                    }
                }
                if consumed == 0 {
                    return Err(DirectiveError::MissingOperands("-d/--disk"));
                }
            }
            "-k" | "--kernel" => {
                let mut consumed = 0;
                while tokens.peek().is_some_and(|t| !is_flag(t)) {
                    if let Some(operand) = tokens.next() {
                        bundle.push_kernel(KernelDirective::from_str(operand)?);
                        consumed += 1;
                    }
                }
                if consumed == 0 {
                    return Err(DirectiveError::MissingOperands("-k/--kernel"));
                }
            }
            other => {
                return Err(DirectiveError::UnknownArgument(other.to_string()));
            }
        }
    }

    Ok(CliRequest::Apply(bundle))
}
