//! Settings application engine.
//!
//! [`SettingsEngine`] owns the filesystem and process seams plus the
//! session snapshot, and drives the per-group managers in a fixed order:
//! CPU governor, CPU scheduler, disks, kernel parameters. Reversion replays
//! the snapshot through the same managers.

pub mod cpu;
pub mod disk;
pub mod inspect;
pub mod kparams;
pub mod profile;
pub mod snapshot;

use crate::models::{ApplicationResult, DirectiveBundle};
use crate::system::fs::{SysFs, TunableFs};
use crate::system::process::{ProcessControl, SystemProcesses};
use snapshot::{revert_session, Session};

pub struct SettingsEngine<F: TunableFs, P: ProcessControl> {
    fs: F,
    procs: P,
    session: Session,
}

impl<F: TunableFs, P: ProcessControl> SettingsEngine<F, P> {
    pub fn new(fs: F, procs: P) -> Self {
        SettingsEngine {
            fs,
            procs,
            session: Session::default(),
        }
    }

    /// Apply every directive in the bundle, continuing past failures.
    pub fn apply_bundle(&mut self, bundle: &DirectiveBundle) -> ApplicationResult {
        let mut result = ApplicationResult::new();
        if let Some(cpu_directive) = &bundle.cpu {
            cpu::apply_governor(
                &self.fs,
                &mut self.session,
                &cpu_directive.governor,
                &mut result,
            );
            cpu::handle_scheduler(
                &self.procs,
                &mut self.session,
                &cpu_directive.scheduler,
                &mut result,
            );
        }
        disk::apply_disks(&self.fs, &mut self.session, &bundle.disks, &mut result);
        kparams::apply_kernel(&self.fs, &mut self.session, &bundle.kernel, &mut result);
        result
    }

    /// Revert everything this session changed and clear the snapshot.
    pub fn revert_session(&mut self) -> ApplicationResult {
        let result = revert_session(&self.fs, &self.procs, &mut self.session);
        self.session = Session::default();
        result
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn procs(&self) -> &P {
        &self.procs
    }
}

/// Engine wired to the live system.
pub fn system_engine() -> SettingsEngine<SysFs, SystemProcesses> {
    SettingsEngine::new(SysFs::new(), SystemProcesses::new())
}
