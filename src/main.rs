//! `volt-helper`: the privileged settings applier.
//!
//! Invoked by the unprivileged front end through `pkexec` with the rigid
//! argument format parsed in [`volt_engine::cli`]. Progress lines go to
//! stdout, logging to stderr. Exit status: 0 when every directive applied
//! (skips included), 1 when any target failed, 2 for a malformed
//! invocation.

use std::process::ExitCode;
use volt_engine::cli::{self, CliRequest};
use volt_engine::engine::system_engine;
use volt_engine::log_warn;
use volt_engine::models::DirectiveGroup;
use volt_engine::system::initialize_logging;

fn main() -> ExitCode {
    initialize_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let bundle = match cli::parse_args(&args) {
        Ok(CliRequest::Help) => {
            println!("{}", cli::USAGE);
            return ExitCode::SUCCESS;
        }
        Ok(CliRequest::Apply(bundle)) => bundle,
        Err(e) => {
            eprintln!("volt-helper: {}", e);
            eprintln!("{}", cli::USAGE);
            return ExitCode::from(2);
        }
    };

    if bundle.is_empty() {
        println!("nothing to apply");
        return ExitCode::SUCCESS;
    }

    if !nix::unistd::geteuid().is_root() {
        log_warn!("running without root; most targets will not be writable");
    }

    let mut engine = system_engine();
    let result = engine.apply_bundle(&bundle);

    for outcome in result.outcomes() {
        println!("[{}] {}: {}", outcome.group, outcome.target, outcome.outcome);
    }
    for group in [DirectiveGroup::Cpu, DirectiveGroup::Disk, DirectiveGroup::Kernel] {
        let (applied, _, total) = result.counts_for(group);
        if total > 0 {
            println!("{}: {}/{} applied", group, applied, total);
        }
    }

    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
