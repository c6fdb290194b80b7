//! Sparse-mapped logical arrays.
//!
//! A `SparseRegion` is a fixed logical size backed either by a sparse file
//! under the database directory, or by anonymous shared memory for the
//! `memory` pseudo-database mode. The OS only allocates disk (or RAM)
//! pages that are actually touched, so a region can be declared at its
//! maximum logical size up front without paying for it.
//!
//! The mapped base address is never exposed as a stable pointer across
//! invocations; all cross-structure references into a region are stored
//! as integer offsets/indices, never as addresses.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::{Result, VexError};

pub struct SparseRegion {
    mmap: MmapMut,
    path: Option<PathBuf>,
}

impl SparseRegion {
    /// Opens (creating if absent) a sparse file of exactly `size` bytes
    /// and maps it read/write, shared.
    pub fn open_file(path: impl AsRef<Path>, size: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if size == 0 {
            return Err(VexError::Argument {
                message: format!("region size for {path:?} must be non-zero"),
            });
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| VexError::io(path.clone(), e))?;
        file.set_len(size).map_err(|e| VexError::io(path.clone(), e))?;
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| VexError::io(path.clone(), e))?;
        Ok(SparseRegion {
            mmap,
            path: Some(path),
        })
    }

    /// Maps an anonymous, zero-initialized region of `size` bytes not
    /// backed by any file. Used for the `memory` database mode.
    pub fn open_anon(size: u64) -> Result<Self> {
        if size == 0 {
            return Err(VexError::Argument {
                message: "anonymous region size must be non-zero".into(),
            });
        }
        let mmap = MmapMut::map_anon(size as usize)
            .map_err(|e| VexError::io(PathBuf::from("<anon>"), e))?;
        Ok(SparseRegion { mmap, path: None })
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    pub fn flush(&self) -> Result<()> {
        self.mmap.flush().map_err(|e| {
            VexError::io(
                self.path.clone().unwrap_or_else(|| PathBuf::from("<anon>")),
                e,
            )
        })
    }
}

/// Whether this database is file-backed (on disk) or process-scoped
/// shared memory (the `memory` CLI sentinel).
#[derive(Debug, Clone)]
pub enum Backing {
    Dir(PathBuf),
    Memory,
}

impl Backing {
    pub fn from_cli_arg(arg: &str) -> Self {
        if arg == "memory" {
            Backing::Memory
        } else {
            Backing::Dir(PathBuf::from(arg))
        }
    }

    pub fn region(&self, name: &str, size: u64) -> Result<SparseRegion> {
        match self {
            Backing::Dir(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| VexError::io(dir.clone(), e))?;
                SparseRegion::open_file(dir.join(name), size)
            }
            Backing::Memory => SparseRegion::open_anon(size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_backed_region_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut region = SparseRegion::open_file(dir.path().join("test.bin"), 4096).unwrap();
        region.as_mut_slice()[0..4].copy_from_slice(&[1, 2, 3, 4]);
        region.flush().unwrap();
        assert_eq!(&region.as_slice()[0..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn anon_region_is_zeroed() {
        let region = SparseRegion::open_anon(4096).unwrap();
        assert!(region.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_zero_size() {
        assert!(SparseRegion::open_anon(0).is_err());
    }
}
