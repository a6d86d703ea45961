//! RAM-backed storage medium
//!
//! Behaves like a freshly formatted card: only `/` exists after mount, files
//! need an existing parent directory, and `mkdir` refuses existing names.

use crate::storage::{MediumInfo, MediumKind, Storage, StorageError};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug)]
pub struct MemoryStorage {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    mounted: bool,
    medium_present: bool,
    fail_mount: bool,
    fail_mkdir: bool,
    short_writes: bool,
    /// Writes still allowed before every further write fails. `None` is unlimited.
    write_budget: Option<usize>,
    write_attempts: usize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            dirs: BTreeSet::new(),
            mounted: false,
            medium_present: true,
            fail_mount: false,
            fail_mkdir: false,
            short_writes: false,
            write_budget: None,
            write_attempts: 0,
        }
    }

    /// A medium that has already been mounted.
    pub fn mounted() -> Self {
        let mut storage = Self::new();
        storage.mounted = true;
        storage
    }

    /// A slot with no card in it; mount reports [`StorageError::NoMedium`].
    pub fn without_medium() -> Self {
        Self {
            medium_present: false,
            ..Self::new()
        }
    }

    pub fn fail_mount(&mut self, fail: bool) {
        self.fail_mount = fail;
    }

    pub fn fail_mkdir(&mut self, fail: bool) {
        self.fail_mkdir = fail;
    }

    /// Make writes transfer only part of their payload.
    pub fn short_writes(&mut self, enabled: bool) {
        self.short_writes = enabled;
    }

    /// Let the next `n` writes succeed and fail every one after them.
    pub fn fail_writes_after(&mut self, n: usize) {
        self.write_budget = Some(n);
    }

    /// Clear write fault injection.
    pub fn heal(&mut self) {
        self.write_budget = None;
        self.short_writes = false;
    }

    /// Pre-populate a directory, e.g. one left by an earlier boot.
    pub fn add_dir(&mut self, path: &str) {
        self.dirs.insert(normalize(path));
    }

    /// Remove a directory and everything below it.
    pub fn remove_dir(&mut self, path: &str) {
        let path = normalize(path);
        let prefix = format!("{}/", path);
        self.dirs.retain(|d| *d != path && !d.starts_with(&prefix));
        self.files.retain(|f, _| !f.starts_with(&prefix));
    }

    pub fn files(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn dirs(&self) -> Vec<String> {
        self.dirs.iter().cloned().collect()
    }

    pub fn read(&self, path: &str) -> Option<&[u8]> {
        self.files.get(&normalize(path)).map(Vec::as_slice)
    }

    /// Number of `write` calls seen so far, failed ones included.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn parent_exists(&self, path: &str) -> bool {
        match path.rsplit_once('/') {
            Some(("", _)) => true,
            Some((parent, _)) => self.dirs.contains(parent),
            None => false,
        }
    }

    fn check_writable(&mut self, path: &str) -> Result<String, StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        let path = normalize(path);
        if !self.parent_exists(&path) || self.dirs.contains(&path) {
            return Err(StorageError::Open {
                path,
                reason: "no such directory".to_string(),
            });
        }
        Ok(path)
    }

    fn consume_write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        if let Some(budget) = self.write_budget.as_mut() {
            if *budget == 0 {
                return Err(StorageError::Open {
                    path: path.to_string(),
                    reason: "card removed".to_string(),
                });
            }
            *budget -= 1;
        }
        if self.short_writes {
            return Err(StorageError::ShortWrite {
                path: path.to_string(),
                expected: data.len(),
                written: data.len() / 2,
            });
        }
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn mount(&mut self) -> Result<MediumInfo, StorageError> {
        if !self.medium_present {
            return Err(StorageError::NoMedium);
        }
        if self.fail_mount {
            return Err(StorageError::MountFailed("injected failure".to_string()));
        }
        self.mounted = true;
        let info = MediumInfo {
            kind: MediumKind::Memory,
            total_bytes: None,
            used_bytes: self.files.values().map(|f| f.len() as u64).sum(),
        };
        info.log_summary();
        Ok(info)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        self.write_attempts += 1;
        let path = self.check_writable(path)?;
        match self.consume_write(&path, data) {
            Ok(()) => {
                self.files.insert(path, data.to_vec());
                Ok(())
            }
            Err(e) => {
                if let StorageError::ShortWrite { written, .. } = &e {
                    self.files.insert(path, data[..*written].to_vec());
                }
                Err(e)
            }
        }
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.check_writable(path)?;
        self.consume_write(&path, data)?;
        self.files.entry(path).or_default().extend_from_slice(data);
        Ok(())
    }

    fn mkdir(&mut self, path: &str) -> Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        let path = normalize(path);
        if self.fail_mkdir || self.exists(&path) || !self.parent_exists(&path) {
            return Err(StorageError::Mkdir {
                path,
                reason: "mkdir refused".to_string(),
            });
        }
        self.dirs.insert(path);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        if !self.mounted {
            return false;
        }
        let path = normalize(path);
        path == "/" || self.dirs.contains(&path) || self.files.contains_key(&path)
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_states() {
        assert_eq!(MemoryStorage::without_medium().mount(), Err(StorageError::NoMedium));

        let mut storage = MemoryStorage::new();
        storage.fail_mount(true);
        assert!(matches!(storage.mount(), Err(StorageError::MountFailed(_))));
        storage.fail_mount(false);
        assert_eq!(storage.mount().unwrap().kind, MediumKind::Memory);
    }

    #[test]
    fn test_files_need_parent_directory() {
        let mut storage = MemoryStorage::mounted();
        assert!(storage.write("/lapse000/pic00000.jpg", b"x").is_err());
        storage.mkdir("/lapse000").unwrap();
        storage.write("/lapse000/pic00000.jpg", b"x").unwrap();
        assert_eq!(storage.read("/lapse000/pic00000.jpg"), Some(&b"x"[..]));
        assert_eq!(storage.write_attempts(), 2);
    }

    #[test]
    fn test_write_budget() {
        let mut storage = MemoryStorage::mounted();
        storage.fail_writes_after(1);
        storage.write("/a", b"1").unwrap();
        assert!(storage.write("/b", b"2").is_err());
        storage.heal();
        storage.write("/b", b"2").unwrap();
    }

    #[test]
    fn test_short_write_leaves_partial_file() {
        let mut storage = MemoryStorage::mounted();
        storage.short_writes(true);
        let err = storage.write("/a", b"abcd").unwrap_err();
        assert_eq!(
            err,
            StorageError::ShortWrite {
                path: "/a".to_string(),
                expected: 4,
                written: 2
            }
        );
        assert_eq!(storage.read("/a"), Some(&b"ab"[..]));
    }

    #[test]
    fn test_append_and_remove_dir() {
        let mut storage = MemoryStorage::mounted();
        storage.mkdir("/lapse000").unwrap();
        storage.append("/lapse000/log.txt", b"a").unwrap();
        storage.append("/lapse000/log.txt", b"b").unwrap();
        assert_eq!(storage.read("/lapse000/log.txt"), Some(&b"ab"[..]));

        storage.remove_dir("/lapse000");
        assert!(!storage.exists("/lapse000"));
        assert!(storage.files().is_empty());
    }

    #[test]
    fn test_mkdir_refuses_existing() {
        let mut storage = MemoryStorage::mounted();
        storage.add_dir("lapse000");
        assert!(storage.exists("/lapse000"));
        assert!(storage.mkdir("/lapse000").is_err());
    }
}
