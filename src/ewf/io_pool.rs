//! Bounded file-descriptor pool shared by every segment file in an image.
//!
//! Large acquisitions can span thousands of segment files (EWF-S01 alone
//! allows 4831 of them); keeping all of them open simultaneously risks
//! hitting the OS descriptor limit. The pool opens lazily and closes the
//! least-recently-used descriptor once `capacity` is exceeded. Callers
//! address segments by a stable [`PoolHandle`] and must not assume the
//! underlying `File` stays open across calls — every access goes back
//! through the pool.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::ewf::error::Result;

/// Opaque handle into the pool. Stable for the lifetime of the pool entry;
/// never reused even if the entry's descriptor is closed and reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle(pub usize);

struct Entry {
    path: PathBuf,
    writable: bool,
    file: Option<File>,
}

/// Default number of simultaneously open descriptors before the pool
/// starts closing the least-recently-used one.
pub const DEFAULT_CAPACITY: usize = 64;

pub struct FileIoPool {
    entries: Vec<Entry>,
    /// Indices into `entries` with a live `file`, ordered oldest-used first.
    open_order: VecDeque<usize>,
    capacity: usize,
}

impl FileIoPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            open_order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a path for later access without opening it yet. Returns
    /// the handle to address it through the rest of this API.
    pub fn register(&mut self, path: impl Into<PathBuf>, writable: bool) -> PoolHandle {
        self.entries.push(Entry {
            path: path.into(),
            writable,
            file: None,
        });
        PoolHandle(self.entries.len() - 1)
    }

    pub fn path(&self, handle: PoolHandle) -> &Path {
        &self.entries[handle.0].path
    }

    fn ensure_open(&mut self, handle: PoolHandle) -> Result<()> {
        if self.entries[handle.0].file.is_some() {
            // Bump to most-recently-used.
            self.open_order.retain(|&i| i != handle.0);
            self.open_order.push_back(handle.0);
            return Ok(());
        }

        while self.open_order.len() >= self.capacity {
            if let Some(victim) = self.open_order.pop_front() {
                self.entries[victim].file = None;
            } else {
                break;
            }
        }

        let entry = &mut self.entries[handle.0];
        let file = if entry.writable {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&entry.path)?
        } else {
            OpenOptions::new().read(true).open(&entry.path)?
        };
        entry.file = Some(file);
        self.open_order.push_back(handle.0);
        Ok(())
    }

    pub fn read_at(&mut self, handle: PoolHandle, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.ensure_open(handle)?;
        let file = self.entries[handle.0].file.as_mut().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_at(&mut self, handle: PoolHandle, offset: u64, buf: &[u8]) -> Result<()> {
        self.ensure_open(handle)?;
        let file = self.entries[handle.0].file.as_mut().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    pub fn append(&mut self, handle: PoolHandle, buf: &[u8]) -> Result<u64> {
        self.ensure_open(handle)?;
        let file = self.entries[handle.0].file.as_mut().unwrap();
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(buf)?;
        Ok(offset)
    }

    pub fn len(&mut self, handle: PoolHandle) -> Result<u64> {
        self.ensure_open(handle)?;
        let file = self.entries[handle.0].file.as_mut().unwrap();
        Ok(file.metadata()?.len())
    }

    pub fn flush(&mut self, handle: PoolHandle) -> Result<()> {
        if let Some(file) = self.entries[handle.0].file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    pub fn close(&mut self, handle: PoolHandle) {
        self.entries[handle.0].file = None;
        self.open_order.retain(|&i| i != handle.0);
    }

    pub fn handle_count(&self) -> usize {
        self.entries.len()
    }
}
