//! crablapse: timelapse capture sessions for camera-equipped devices
//!
//! Captures a numbered sequence of stills at a configurable interval and
//! stores each frame on removable storage under a per-session directory
//! (`/lapse007/pic00042.jpg`).
//!
//! # Features
//! - Session state machine with monotonic session and frame indices
//! - Storage and capture device traits with host and in-memory implementations
//! - Worker-thread service for hosts with real threads
//! - TOML configuration
//!
//! # Usage
//! ```rust
//! use crablapse::testing::{MemoryStorage, SyntheticCamera};
//! use crablapse::LapseController;
//!
//! let mut lapse = LapseController::new(MemoryStorage::new(), SyntheticCamera::raw(8, 8));
//! lapse.mount().unwrap();
//! lapse.start().unwrap();
//! let frame = lapse.process().unwrap();
//! assert_eq!(frame.path, "/lapse000/pic00000.jpg");
//! lapse.stop();
//! ```
pub mod config;
pub mod device;
pub mod errors;
pub mod paths;
pub mod service;
pub mod session;
pub mod storage;

// Testing utilities - in-memory collaborators for offline runs
pub mod testing;

// Re-exports for convenience
pub use config::LapseConfig;
pub use device::{CaptureDevice, CaptureError, FrameBuffer};
pub use errors::{LapseError, LapseErrorKind};
pub use service::{LapseHandle, LapseService};
pub use session::{FrameRecord, LapseController, LapseState, SessionStatus};
pub use storage::{FsStorage, MediumInfo, Storage, StorageError};

/// Initialize logging, defaulting to `crablapse=info` when `RUST_LOG` is unset
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crablapse=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
