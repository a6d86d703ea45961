//! Storage access for the capture medium
//!
//! A thin, synchronous contract over whatever holds the card's namespace:
//! write, append, mkdir, existence checks and a one-time mount. Paths are
//! absolute medium paths such as `/lapse000/pic00000.jpg`.

pub mod fs;

pub use fs::FsStorage;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("no storage medium attached")]
    NoMedium,
    #[error("mount failed: {0}")]
    MountFailed(String),
    #[error("storage medium is not mounted")]
    NotMounted,
    #[error("failed to open {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("short write to {path}: {written} of {expected} bytes")]
    ShortWrite {
        path: String,
        expected: usize,
        written: usize,
    },
    #[error("failed to create directory {path}: {reason}")]
    Mkdir { path: String, reason: String },
    #[error("invalid medium path: {0}")]
    InvalidPath(String),
}

/// Kind of medium reported at mount time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediumKind {
    Mmc,
    Sdsc,
    Sdhc,
    /// A host directory standing in for the card.
    HostDirectory,
    /// RAM-backed medium used for tests and dry runs.
    Memory,
    Unknown,
}

impl MediumKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediumKind::Mmc => "MMC",
            MediumKind::Sdsc => "SDSC",
            MediumKind::Sdhc => "SDHC",
            MediumKind::HostDirectory => "HOSTDIR",
            MediumKind::Memory => "MEMORY",
            MediumKind::Unknown => "UNKNOWN",
        }
    }
}

/// What a successful mount found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediumInfo {
    pub kind: MediumKind,
    /// Total capacity in bytes, when the medium can report it.
    pub total_bytes: Option<u64>,
    pub used_bytes: u64,
}

impl MediumInfo {
    /// Log the mount summary the way the card driver prints it.
    pub fn log_summary(&self) {
        log::info!("Card type: {}", self.kind.as_str());
        match self.total_bytes {
            Some(total) => log::info!("Total space: {}MB", total / (1024 * 1024)),
            None => log::info!("Total space: unknown"),
        }
        log::info!("Used space: {}MB", self.used_bytes / (1024 * 1024));
    }
}

/// Synchronous storage contract consumed by the session controller.
///
/// `mount` must succeed before anything else is called. Failure of any other
/// operation is only a signal; callers must not depend on which variant of
/// [`StorageError`] comes back.
pub trait Storage {
    fn mount(&mut self) -> Result<MediumInfo, StorageError>;

    /// Create or truncate `path` and write all of `data`.
    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Append all of `data` to `path`, creating it if absent.
    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    fn mkdir(&mut self, path: &str) -> Result<(), StorageError>;

    fn exists(&self, path: &str) -> bool;
}

impl<T: Storage + ?Sized> Storage for Box<T> {
    fn mount(&mut self) -> Result<MediumInfo, StorageError> {
        (**self).mount()
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        (**self).write(path, data)
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        (**self).append(path, data)
    }

    fn mkdir(&mut self, path: &str) -> Result<(), StorageError> {
        (**self).mkdir(path)
    }

    fn exists(&self, path: &str) -> bool {
        (**self).exists(path)
    }
}
