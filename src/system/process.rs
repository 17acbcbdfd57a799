//! Process control seam for the pluggable scheduler lifecycle.
//!
//! [`SystemProcesses`] enumerates live processes via `sysinfo` and delivers
//! signals via `nix`; [`ScriptedProcesses`] is a deterministic double whose
//! processes die on a scripted signal, used by the test suite to assert
//! escalation ordering and wait bounds without real sleeps.

use crate::log_info;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Process-name prefix identifying pluggable (sched-ext) schedulers.
pub const SCHEDULER_PREFIX: &str = "scx_";

/// Directories searched for scheduler executables.
pub const SCHEDULER_SEARCH_PATHS: &[&str] = &["/usr/bin", "/usr/local/bin"];

pub type Pid = u32;

/// The three escalation signals, in severity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchedSignal {
    Interrupt,
    Terminate,
    Kill,
}

/// A running process matched by the scheduler naming convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerProcess {
    pub pid: Pid,
    pub name: String,
}

/// Enumeration, signaling, liveness and launch of scheduler processes.
pub trait ProcessControl {
    /// Running processes whose name carries the scheduler prefix.
    fn running_schedulers(&self) -> Vec<SchedulerProcess>;

    fn signal(&self, pid: Pid, signal: SchedSignal) -> io::Result<()>;

    fn is_alive(&self, pid: Pid) -> bool;

    /// Resolve a scheduler name to an executable in the search paths.
    fn resolve_scheduler(&self, name: &str) -> Option<PathBuf>;

    /// Launch a scheduler detached; the engine keeps only the PID.
    fn spawn_scheduler(&self, path: &Path) -> io::Result<Pid>;

    /// Names of scheduler executables installed in the search paths.
    fn installed_schedulers(&self) -> Vec<String>;

    /// Block for a termination grace period.
    fn wait(&self, grace: Duration);
}

/// Real process control backed by `sysinfo` and `nix`.
#[derive(Debug, Clone, Default)]
pub struct SystemProcesses;

impl SystemProcesses {
    pub fn new() -> Self {
        SystemProcesses
    }

    fn is_executable(path: &Path) -> bool {
        match std::fs::metadata(path) {
            Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
            Err(_) => false,
        }
    }
}

impl ProcessControl for SystemProcesses {
    fn running_schedulers(&self) -> Vec<SchedulerProcess> {
        use sysinfo::{ProcessesToUpdate, System};

        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        let mut matches = Vec::new();
        for (pid, process) in sys.processes() {
            let name = process.name().to_string_lossy();
            if name.starts_with(SCHEDULER_PREFIX) {
                matches.push(SchedulerProcess {
                    pid: pid.as_u32(),
                    name: name.into_owned(),
                });
            }
        }
        matches
    }

    fn signal(&self, pid: Pid, signal: SchedSignal) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid as NixPid;

        let sig = match signal {
            SchedSignal::Interrupt => Signal::SIGINT,
            SchedSignal::Terminate => Signal::SIGTERM,
            SchedSignal::Kill => Signal::SIGKILL,
        };
        // ESRCH maps to NotFound so callers can tell "already gone" apart
        // from delivery failures like EPERM on a live process.
        kill(NixPid::from_raw(pid as i32), sig).map_err(|errno| match errno {
            Errno::ESRCH => io::Error::new(io::ErrorKind::NotFound, "no such process"),
            other => io::Error::from_raw_os_error(other as i32),
        })
    }

    fn is_alive(&self, pid: Pid) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
        use nix::unistd::Pid as NixPid;

        // A scheduler we spawned lingers as a zombie after exit and would
        // keep answering the signal probe. Reap it first; pids that are not
        // our children fail with ECHILD and fall through to the probe.
        match waitpid(NixPid::from_raw(pid as i32), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => return false,
            Ok(_) | Err(_) => {}
        }

        // Signal 0 probes existence; EPERM still means the process exists.
        match kill(NixPid::from_raw(pid as i32), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn resolve_scheduler(&self, name: &str) -> Option<PathBuf> {
        for dir in SCHEDULER_SEARCH_PATHS {
            let candidate = Path::new(dir).join(name);
            if Self::is_executable(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    fn spawn_scheduler(&self, path: &Path) -> io::Result<Pid> {
        let child = Command::new(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let pid = child.id();
        log_info!("[process] launched scheduler {} (pid {})", path.display(), pid);
        // The Child handle is dropped; the scheduler outlives this process.
        // If it exits first, is_alive reaps the zombie on its next probe.
        Ok(pid)
    }

    fn installed_schedulers(&self) -> Vec<String> {
        let mut names = Vec::new();
        for dir in SCHEDULER_SEARCH_PATHS {
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if name.starts_with(SCHEDULER_PREFIX)
                        && Self::is_executable(&entry.path())
                        && !names.contains(&name)
                    {
                        names.push(name);
                    }
                }
            }
        }
        names.sort();
        names
    }

    fn wait(&self, grace: Duration) {
        std::thread::sleep(grace);
    }
}

/// Observable process-control events, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Enumerated,
    Signaled(Pid, SchedSignal),
    Spawned(String),
}

#[derive(Debug, Default)]
struct ScriptedInner {
    running: Vec<SchedulerProcess>,
    /// Weakest signal that kills each process; SIGKILL is always lethal.
    lethal: HashMap<Pid, SchedSignal>,
    /// Processes that refuse delivery with a permission error but stay up.
    protected: HashSet<Pid>,
    installed: Vec<String>,
    events: Vec<ProcessEvent>,
    waited: Duration,
    next_pid: Pid,
}

/// Deterministic [`ProcessControl`] double recording every call.
#[derive(Debug)]
pub struct ScriptedProcesses {
    inner: RefCell<ScriptedInner>,
}

impl Default for ScriptedProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProcesses {
    pub fn new() -> Self {
        ScriptedProcesses {
            inner: RefCell::new(ScriptedInner {
                next_pid: 100,
                ..Default::default()
            }),
        }
    }

    /// Add a cooperative running process; it exits on the interrupt signal.
    pub fn add_running(&self, name: &str) -> Pid {
        self.add_stubborn(name, SchedSignal::Interrupt)
    }

    /// Add a running process that survives anything weaker than `dies_on`.
    pub fn add_stubborn(&self, name: &str, dies_on: SchedSignal) -> Pid {
        let mut inner = self.inner.borrow_mut();
        let pid = inner.next_pid;
        inner.next_pid += 1;
        inner.running.push(SchedulerProcess {
            pid,
            name: name.to_string(),
        });
        inner.lethal.insert(pid, dies_on);
        pid
    }

    /// Add a running process that rejects every signal with a permission
    /// error and never dies.
    pub fn add_protected(&self, name: &str) -> Pid {
        let pid = self.add_stubborn(name, SchedSignal::Kill);
        self.inner.borrow_mut().protected.insert(pid);
        pid
    }

    pub fn set_installed(&self, names: &[&str]) {
        self.inner.borrow_mut().installed = names.iter().map(|s| s.to_string()).collect();
    }

    pub fn events(&self) -> Vec<ProcessEvent> {
        self.inner.borrow().events.clone()
    }

    pub fn signals_sent(&self) -> Vec<(Pid, SchedSignal)> {
        self.inner
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                ProcessEvent::Signaled(pid, sig) => Some((*pid, *sig)),
                _ => None,
            })
            .collect()
    }

    pub fn total_waited(&self) -> Duration {
        self.inner.borrow().waited
    }

    pub fn running_names(&self) -> Vec<String> {
        self.inner
            .borrow()
            .running
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }
}

impl ProcessControl for ScriptedProcesses {
    fn running_schedulers(&self) -> Vec<SchedulerProcess> {
        let mut inner = self.inner.borrow_mut();
        inner.events.push(ProcessEvent::Enumerated);
        inner
            .running
            .iter()
            .filter(|p| p.name.starts_with(SCHEDULER_PREFIX))
            .cloned()
            .collect()
    }

    fn signal(&self, pid: Pid, signal: SchedSignal) -> io::Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.events.push(ProcessEvent::Signaled(pid, signal));
        if !inner.running.iter().any(|p| p.pid == pid) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such process"));
        }
        if inner.protected.contains(&pid) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "operation not permitted",
            ));
        }
        let lethal = inner.lethal.get(&pid).copied().unwrap_or(SchedSignal::Kill);
        if signal >= lethal {
            inner.running.retain(|p| p.pid != pid);
        }
        Ok(())
    }

    fn is_alive(&self, pid: Pid) -> bool {
        self.inner.borrow().running.iter().any(|p| p.pid == pid)
    }

    fn resolve_scheduler(&self, name: &str) -> Option<PathBuf> {
        let inner = self.inner.borrow();
        if inner.installed.iter().any(|n| n == name) {
            Some(Path::new("/usr/bin").join(name))
        } else {
            None
        }
    }

    fn spawn_scheduler(&self, path: &Path) -> io::Result<Pid> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut inner = self.inner.borrow_mut();
        inner.events.push(ProcessEvent::Spawned(name.clone()));
        let pid = inner.next_pid;
        inner.next_pid += 1;
        inner.running.push(SchedulerProcess { pid, name });
        inner.lethal.insert(pid, SchedSignal::Interrupt);
        Ok(pid)
    }

    fn installed_schedulers(&self) -> Vec<String> {
        self.inner.borrow().installed.clone()
    }

    fn wait(&self, grace: Duration) {
        self.inner.borrow_mut().waited += grace;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_process_dies_on_lethal_signal() {
        let procs = ScriptedProcesses::new();
        let pid = procs.add_stubborn("scx_rusty", SchedSignal::Terminate);
        procs.signal(pid, SchedSignal::Interrupt).unwrap();
        assert!(procs.is_alive(pid));
        procs.signal(pid, SchedSignal::Terminate).unwrap();
        assert!(!procs.is_alive(pid));
    }

    #[test]
    fn test_kill_is_always_lethal() {
        let procs = ScriptedProcesses::new();
        let pid = procs.add_stubborn("scx_lavd", SchedSignal::Kill);
        procs.signal(pid, SchedSignal::Terminate).unwrap();
        assert!(procs.is_alive(pid));
        procs.signal(pid, SchedSignal::Kill).unwrap();
        assert!(!procs.is_alive(pid));
    }

    #[test]
    fn test_enumeration_matches_prefix_only() {
        let procs = ScriptedProcesses::new();
        procs.add_running("scx_bpfland");
        procs.add_running("systemd");
        let matches = procs.running_schedulers();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "scx_bpfland");
    }

    #[test]
    fn test_signal_severity_order() {
        assert!(SchedSignal::Interrupt < SchedSignal::Terminate);
        assert!(SchedSignal::Terminate < SchedSignal::Kill);
    }

    #[test]
    fn test_protected_process_rejects_signals_but_stays_alive() {
        let procs = ScriptedProcesses::new();
        let pid = procs.add_protected("scx_rusty");
        let err = procs.signal(pid, SchedSignal::Kill).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(procs.is_alive(pid));
    }

    #[test]
    fn test_exited_child_is_reaped_and_reported_dead() {
        use std::time::Instant;

        let procs = SystemProcesses::new();
        let pid = procs.spawn_scheduler(Path::new("/bin/true")).unwrap();
        // The child exits on its own; the liveness probe must reap the
        // zombie and report it dead instead of seeing it alive forever.
        let deadline = Instant::now() + Duration::from_secs(5);
        while procs.is_alive(pid) {
            assert!(Instant::now() < deadline, "exited child still reported alive");
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}
