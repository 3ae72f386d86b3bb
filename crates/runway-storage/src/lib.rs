#![deny(warnings)]

//! Column storage for per-agent arrays.
//!
//! A [`Column`] is a fixed-length buffer of plain-old-data values that
//! dereferences to a slice, whether it lives on the heap ([`Resident`]) or in
//! a memory-mapped file ([`FileMapped`]). Engine code only ever sees the
//! slice, so both backends read and write identically. File-mapped columns
//! stay on disk after the process exits, which lets populations exceed
//! resident memory.

use bytemuck::Pod;
use memmap2::MmapMut;
use std::fs::{self, OpenOptions};
use std::io;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// File extension used for mapped columns.
pub const COLUMN_EXTENSION: &str = "dat";

/// Errors raised while allocating or syncing a column.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Columns are never resized, so a zero-length request is a caller bug.
    #[error("column `{0}` must have at least one element")]
    EmptyColumn(String),
    /// Heap allocation failed or the byte size overflowed.
    #[error("cannot allocate {len} elements for column `{name}`")]
    Allocation { name: String, len: usize },
    /// Backing file or directory could not be created, sized, mapped or flushed.
    #[error("storage io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

enum Repr<T> {
    Resident(Vec<T>),
    Mapped {
        map: MmapMut,
        path: PathBuf,
        len: usize,
    },
}

/// Fixed-length array of `T` backed by heap memory or a mapped file.
pub struct Column<T: Pod> {
    name: String,
    repr: Repr<T>,
}

impl<T: Pod> Column<T> {
    /// Column name, also the stem of the backing file when mapped.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.repr {
            Repr::Resident(_) => None,
            Repr::Mapped { path, .. } => Some(path),
        }
    }

    /// Whether the contents outlive the process.
    pub fn is_persistent(&self) -> bool {
        matches!(self.repr, Repr::Mapped { .. })
    }

    /// Write dirty pages back to disk. A no-op for resident columns.
    pub fn flush(&self) -> Result<(), StorageError> {
        match &self.repr {
            Repr::Resident(_) => Ok(()),
            Repr::Mapped { map, path, .. } => {
                map.flush().map_err(|e| StorageError::io(path, e))
            }
        }
    }
}

impl<T: Pod> Deref for Column<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match &self.repr {
            Repr::Resident(v) => v,
            // Mappings are page aligned, which satisfies any Pod alignment.
            Repr::Mapped { map, len, .. } => {
                bytemuck::cast_slice(&map[..len * mem::size_of::<T>()])
            }
        }
    }
}

impl<T: Pod> DerefMut for Column<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match &mut self.repr {
            Repr::Resident(v) => v,
            Repr::Mapped { map, len, .. } => {
                bytemuck::cast_slice_mut(&mut map[..*len * mem::size_of::<T>()])
            }
        }
    }
}

impl<T: Pod> std::fmt::Debug for Column<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("path", &self.path())
            .finish()
    }
}

/// Allocator of zero-initialized columns.
pub trait ColumnBackend {
    /// Allocate `len` zeroed elements under `name`.
    fn allocate<T: Pod>(&self, name: &str, len: usize) -> Result<Column<T>, StorageError>;

    /// Whether allocated columns persist after the process exits.
    fn is_persistent(&self) -> bool;
}

fn byte_len<T: Pod>(name: &str, len: usize) -> Result<usize, StorageError> {
    if len == 0 {
        return Err(StorageError::EmptyColumn(name.to_string()));
    }
    len.checked_mul(mem::size_of::<T>())
        .ok_or_else(|| StorageError::Allocation {
            name: name.to_string(),
            len,
        })
}

/// Heap-backed columns, released with the process.
#[derive(Clone, Copy, Debug, Default)]
pub struct Resident;

impl ColumnBackend for Resident {
    fn allocate<T: Pod>(&self, name: &str, len: usize) -> Result<Column<T>, StorageError> {
        byte_len::<T>(name, len)?;
        let mut v: Vec<T> = Vec::new();
        v.try_reserve_exact(len)
            .map_err(|_| StorageError::Allocation {
                name: name.to_string(),
                len,
            })?;
        v.resize(len, T::zeroed());
        debug!(column = name, len, "allocated resident column");
        Ok(Column {
            name: name.to_string(),
            repr: Repr::Resident(v),
        })
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

/// Columns mapped from `{dir}/{name}.dat`, left on disk afterwards.
///
/// Allocation truncates any existing file of the same name.
#[derive(Clone, Debug)]
pub struct FileMapped {
    dir: PathBuf,
}

impl FileMapped {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Backing file path for a column name.
    pub fn column_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{COLUMN_EXTENSION}"))
    }
}

impl ColumnBackend for FileMapped {
    fn allocate<T: Pod>(&self, name: &str, len: usize) -> Result<Column<T>, StorageError> {
        let bytes = byte_len::<T>(name, len)?;
        fs::create_dir_all(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;

        let path = self.column_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| StorageError::io(&path, e))?;
        file.set_len(bytes as u64)
            .map_err(|e| StorageError::io(&path, e))?;

        // SAFETY: the file was just truncated and sized by us; nothing else in
        // this process maps it, and the mapping is owned by the column.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|e| StorageError::io(&path, e))?;
        debug!(column = name, len, path = %path.display(), "mapped column");
        Ok(Column {
            name: name.to_string(),
            repr: Repr::Mapped { map, path, len },
        })
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

/// Per-run backend selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StorageKind {
    /// Heap memory.
    #[default]
    Resident,
    /// Memory-mapped files under `dir`.
    FileMapped { dir: PathBuf },
}

impl StorageKind {
    pub fn is_persistent(&self) -> bool {
        matches!(self, StorageKind::FileMapped { .. })
    }
}
