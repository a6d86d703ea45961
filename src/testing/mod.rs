//! Testing utilities for crablapse
//!
//! In-memory stand-ins for the storage medium and the camera, with fault
//! injection, so sessions can be exercised without hardware.

pub mod memory_storage;
pub mod synthetic_camera;

pub use memory_storage::MemoryStorage;
pub use synthetic_camera::{synthetic_jpeg, synthetic_rgb, SyntheticCamera};
