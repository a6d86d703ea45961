//! Host-directory storage
//!
//! Maps medium paths onto a directory on the host filesystem, so that
//! `/lapse000/pic00000.jpg` lands at `<root>/lapse000/pic00000.jpg`. Used when
//! the card is exposed as a mounted filesystem, and for bench runs.

use super::{MediumInfo, MediumKind, Storage, StorageError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

#[derive(Debug)]
pub struct FsStorage {
    root: PathBuf,
    create_root: bool,
    mounted: bool,
}

impl FsStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            create_root: false,
            mounted: false,
        }
    }

    /// Create the root directory on mount instead of treating it as a missing card.
    pub fn create_root(mut self, create: bool) -> Self {
        self.create_root = create;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Resolve a medium path to a host path below the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(StorageError::InvalidPath(path.to_string())),
            }
        }
        Ok(resolved)
    }

    fn mounted_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        self.resolve(path)
    }

    fn write_with(&mut self, path: &str, data: &[u8], append: bool) -> Result<(), StorageError> {
        let target = self.mounted_path(path)?;
        let start = Instant::now();

        let opened = if append {
            OpenOptions::new().create(true).append(true).open(&target)
        } else {
            File::create(&target)
        };
        let mut file = opened.map_err(|e| {
            log::error!("Failed to open file for writing: {}", path);
            StorageError::Open {
                path: path.to_string(),
                reason: e.to_string(),
            }
        })?;

        let written = write_fully(&mut file, data);
        if written != data.len() {
            log::error!("Write failed: {} ({} of {} bytes)", path, written, data.len());
            return Err(StorageError::ShortWrite {
                path: path.to_string(),
                expected: data.len(),
                written,
            });
        }
        if let Err(e) = file.flush() {
            log::warn!("Flush failed for {}: {}", path, e);
        }

        let elapsed = start.elapsed();
        if elapsed.as_millis() > 1 {
            log::debug!("SD write {} took {}ms", path, elapsed.as_millis());
        }
        Ok(())
    }
}

impl Storage for FsStorage {
    fn mount(&mut self) -> Result<MediumInfo, StorageError> {
        if self.mounted {
            log::warn!("Storage at {:?} already mounted, re-validating", self.root);
        }

        if !self.root.exists() {
            if !self.create_root {
                log::error!("No card found at {:?}", self.root);
                return Err(StorageError::NoMedium);
            }
            fs::create_dir_all(&self.root)
                .map_err(|e| StorageError::MountFailed(format!("{:?}: {}", self.root, e)))?;
        }
        if !self.root.is_dir() {
            return Err(StorageError::MountFailed(format!(
                "{:?} is not a directory",
                self.root
            )));
        }

        let used_bytes = dir_size(&self.root)
            .map_err(|e| StorageError::MountFailed(format!("{:?}: {}", self.root, e)))?;

        self.mounted = true;
        log::info!("Card mount OK at {:?}", self.root);

        let info = MediumInfo {
            kind: MediumKind::HostDirectory,
            total_bytes: filesystem_capacity(&self.root),
            used_bytes,
        };
        info.log_summary();
        Ok(info)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        log::debug!("Writing file len={} path={}", data.len(), path);
        self.write_with(path, data, false)
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        log::debug!("Appending to file: {}", path);
        self.write_with(path, data, true)
    }

    fn mkdir(&mut self, path: &str) -> Result<(), StorageError> {
        let target = self.mounted_path(path)?;
        log::debug!("Creating dir: {}", path);
        fs::create_dir(&target).map_err(|e| {
            log::error!("mkdir failed: {}: {}", path, e);
            StorageError::Mkdir {
                path: path.to_string(),
                reason: e.to_string(),
            }
        })?;
        log::info!("Dir created dir={}", path);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        match self.mounted_path(path) {
            Ok(target) => target.exists(),
            Err(_) => false,
        }
    }
}

fn write_fully(file: &mut File, data: &[u8]) -> usize {
    let mut written = 0;
    while written < data.len() {
        match file.write(&data[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::error!("write error after {} bytes: {}", written, e);
                break;
            }
        }
    }
    written
}

fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += metadata.len();
        }
    }
    Ok(total)
}

/// Size of the filesystem holding `path`, if the host can report it.
fn filesystem_capacity(path: &Path) -> Option<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                log::warn!(
                    "statvfs failed for {:?}: {}",
                    path,
                    io::Error::last_os_error()
                );
                return None;
            }
            #[allow(clippy::unnecessary_cast)]
            let total = stat.f_blocks as u64 * stat.f_frsize as u64;
            Some(total)
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        None
    }
}
