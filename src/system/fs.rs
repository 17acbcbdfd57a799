//! Filesystem access seam for restricted tunable files.
//!
//! [`SysFs`] is the real implementation backed by `/sys` and `/proc`;
//! [`MemoryFs`] is an in-memory implementation that records every write,
//! used by the test suite to verify which files the engine touches.

use lazy_static::lazy_static;
use regex::Regex;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref BRACKETED: Regex = Regex::new(r"\[([^\]]+)\]").expect("invalid bracket regex");
}

/// Restricted-file access used by all managers.
pub trait TunableFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write(&self, path: &Path, value: &str) -> io::Result<()>;
    fn is_writable(&self, path: &Path) -> bool;
    fn exists(&self, path: &Path) -> bool;
    /// Immediate child names of a directory.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>>;
}

/// Current + advertised values of a sysfs choice file such as
/// `/sys/block/sda/queue/scheduler` (`none [mq-deadline] kyber bfq`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorFile {
    pub current: String,
    pub available: Vec<String>,
}

impl SelectorFile {
    /// Parse a choice-file line, tolerating missing brackets.
    ///
    /// Without brackets the first token is taken as current, matching what
    /// the kernel shows for single-scheduler queues. Returns `None` for
    /// empty content.
    pub fn parse(content: &str) -> Option<SelectorFile> {
        let tokens: Vec<&str> = content.split_whitespace().collect();
        if tokens.is_empty() {
            return None;
        }

        let mut available = Vec::new();
        let mut current = None;
        for token in &tokens {
            if let Some(captures) = BRACKETED.captures(token) {
                let name = captures[1].to_string();
                available.push(name.clone());
                current = Some(name);
            } else {
                available.push((*token).to_string());
            }
        }

        let current = current.unwrap_or_else(|| available[0].clone());

        // Dedupe while preserving order.
        let mut seen = std::collections::HashSet::new();
        available.retain(|name| seen.insert(name.clone()));

        Some(SelectorFile { current, available })
    }
}

/// Extract the live value from raw tunable-file content.
///
/// Choice files advertise their current value in brackets; plain tunables
/// are just the value. Snapshot capture uses this so revert writes a token
/// the kernel accepts rather than the whole advertisement line.
pub fn effective_value(content: &str) -> String {
    match BRACKETED.captures(content) {
        Some(captures) => captures[1].to_string(),
        None => content.trim().to_string(),
    }
}

/// Real `/sys` + `/proc` access.
#[derive(Debug, Clone, Default)]
pub struct SysFs;

impl SysFs {
    pub fn new() -> Self {
        SysFs
    }
}

impl TunableFs for SysFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, value: &str) -> io::Result<()> {
        fs::write(path, value)
    }

    fn is_writable(&self, path: &Path) -> bool {
        // Permission-bit inspection lies for virtual files; ask the kernel.
        nix::unistd::access(path, nix::unistd::AccessFlags::W_OK).is_ok()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

#[derive(Debug, Default)]
struct MemoryFile {
    data: Vec<u8>,
    writable: bool,
}

#[derive(Debug, Default)]
struct MemoryInner {
    files: BTreeMap<PathBuf, MemoryFile>,
    writes: Vec<(PathBuf, String)>,
}

/// In-memory [`TunableFs`] recording every write, for tests.
#[derive(Debug, Default)]
pub struct MemoryFs {
    inner: RefCell<MemoryInner>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a writable file.
    pub fn add(&self, path: impl Into<PathBuf>, content: &str) {
        self.inner.borrow_mut().files.insert(
            path.into(),
            MemoryFile {
                data: content.as_bytes().to_vec(),
                writable: true,
            },
        );
    }

    /// Add a file whose writes will fail with permission denied.
    pub fn add_readonly(&self, path: impl Into<PathBuf>, content: &str) {
        self.inner.borrow_mut().files.insert(
            path.into(),
            MemoryFile {
                data: content.as_bytes().to_vec(),
                writable: false,
            },
        );
    }

    /// Add raw bytes (e.g. a gzip blob standing in for /proc/config.gz).
    pub fn add_bytes(&self, path: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.inner.borrow_mut().files.insert(
            path.into(),
            MemoryFile {
                data: bytes,
                writable: true,
            },
        );
    }

    /// Current content of a file, if present.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.inner
            .borrow()
            .files
            .get(path.as_ref())
            .map(|f| String::from_utf8_lossy(&f.data).into_owned())
    }

    /// Every `(path, value)` write in order.
    pub fn writes(&self) -> Vec<(PathBuf, String)> {
        self.inner.borrow().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.inner.borrow().writes.len()
    }
}

impl TunableFs for MemoryFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let inner = self.inner.borrow();
        let file = inner
            .files
            .get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))?;
        String::from_utf8(file.data.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "not utf-8"))
    }

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        let inner = self.inner.borrow();
        inner
            .files
            .get(path)
            .map(|f| f.data.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn write(&self, path: &Path, value: &str) -> io::Result<()> {
        let mut inner = self.inner.borrow_mut();
        let file = inner
            .files
            .get_mut(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))?;
        if !file.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read-only file",
            ));
        }
        file.data = value.as_bytes().to_vec();
        inner.writes.push((path.to_path_buf(), value.to_string()));
        Ok(())
    }

    fn is_writable(&self, path: &Path) -> bool {
        self.inner
            .borrow()
            .files
            .get(path)
            .map(|f| f.writable)
            .unwrap_or(false)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.borrow().files.contains_key(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let inner = self.inner.borrow();
        let mut names: Vec<String> = Vec::new();
        for file_path in inner.files.keys() {
            if let Ok(rest) = file_path.strip_prefix(path) {
                if let Some(first) = rest.components().next() {
                    let name = first.as_os_str().to_string_lossy().into_owned();
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        if names.is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory"));
        }
        Ok(names)
    }
}
