//! Cross-process boolean flag backed by a shared file mapping.
//!
//! The supervisor creates the flag (a small temp file mapped read/write);
//! worker processes open the same path and map it too. Reads and writes go
//! through an `AtomicU8` placed at offset 0 of the mapping, so N readers and
//! one writer never observe a torn value.

use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use tempfile::NamedTempFile;

use crate::error::{HogError, HogResult};

const FLAG_LEN: u64 = 8;

pub struct SharedFlag {
    map: MmapMut,
    path: PathBuf,
    /// Present on the creating side; removes the backing file on drop.
    _owner: Option<NamedTempFile>,
}

impl SharedFlag {
    /// Creates a fresh, cleared flag in the system temp directory.
    pub fn create() -> HogResult<Self> {
        let file = tempfile::Builder::new()
            .prefix("hydra-hog-flag-")
            .tempfile()?;
        file.as_file().set_len(FLAG_LEN)?;

        let map = map_file(file.as_file())?;
        let flag = Self {
            map,
            path: file.path().to_path_buf(),
            _owner: Some(file),
        };
        flag.clear();
        Ok(flag)
    }

    /// Maps a flag created by another process.
    pub fn open(path: impl AsRef<Path>) -> HogResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len < FLAG_LEN {
            return Err(HogError::Flag(format!(
                "{} is {} bytes, expected at least {}",
                path.display(),
                len,
                FLAG_LEN
            )));
        }

        Ok(Self {
            map: map_file(&file)?,
            path: path.to_path_buf(),
            _owner: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set(&self) {
        self.cell().store(1, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.cell().store(0, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.cell().load(Ordering::SeqCst) != 0
    }

    fn cell(&self) -> &AtomicU8 {
        // SAFETY: the mapping is page aligned, at least FLAG_LEN bytes long and
        // lives as long as `self`. All access to byte 0 goes through atomics.
        unsafe { &*(self.map.as_ptr() as *const AtomicU8) }
    }
}

impl std::fmt::Debug for SharedFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFlag")
            .field("path", &self.path)
            .field("set", &self.is_set())
            .finish()
    }
}

fn map_file(file: &std::fs::File) -> HogResult<MmapMut> {
    // SAFETY: the file is only ever accessed through this atomic view.
    unsafe { MmapOptions::new().len(FLAG_LEN as usize).map_mut(file) }
        .map_err(|e| HogError::Flag(format!("mmap failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_starts_cleared() {
        let flag = SharedFlag::create().unwrap();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
        flag.clear();
        assert!(!flag.is_set());
    }

    #[test]
    fn test_second_mapping_sees_writes() {
        let owner = SharedFlag::create().unwrap();
        let reader = SharedFlag::open(owner.path()).unwrap();

        owner.set();
        assert!(reader.is_set());

        reader.clear();
        assert!(!owner.is_set());
    }

    #[test]
    fn test_backing_file_removed_with_owner() {
        let owner = SharedFlag::create().unwrap();
        let path = owner.path().to_path_buf();
        assert!(path.exists());
        drop(owner);
        assert!(!path.exists());
    }

    #[test]
    fn test_open_rejects_short_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = SharedFlag::open(file.path()).unwrap_err();
        assert!(matches!(err, HogError::Flag(_)));
    }
}
