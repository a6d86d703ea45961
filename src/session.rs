//! Timelapse session controller
//!
//! Owns the session state machine and drives one capture-then-store step per
//! tick. The controller is a plain owned value: every operation takes
//! `&mut self`, so ticks are serialized by construction. Hosts with real
//! threads should hand it to [`crate::service::LapseService`] instead of
//! sharing it.
//!
//! ```text
//!        start() ok            process() write-fail
//! IDLE ───────────────► RUNNING ───────────────────► IDLE
//!   ▲                     │  ▲
//!   │   stop()            │  │ process() ok (frame_index++)
//!   └─────────────────────┘  └──────────────┘
//! ```

use crate::config::{CaptureSettings, DEFAULT_FRAME_INTERVAL_MS};
use crate::device::CaptureDevice;
use crate::errors::LapseError;
use crate::paths::{self, MAX_SESSIONS};
use crate::storage::{MediumInfo, Storage};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LapseState {
    Idle,
    Running,
}

/// Result of one successful tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameRecord {
    pub path: String,
    pub session_index: u32,
    /// Index the frame was written under (before the increment).
    pub frame_index: u32,
    pub bytes: usize,
}

/// Read-only snapshot of the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: LapseState,
    pub session_index: u32,
    pub frame_index: u32,
    pub frame_interval_ms: u64,
    pub next_candidate: u32,
    pub session_dir: String,
}

#[derive(Debug, Clone)]
struct SessionState {
    session_index: u32,
    frame_index: u32,
    running: bool,
    frame_interval: Duration,
    /// Lowest index the next start may consider. Only ever moves forward.
    next_candidate: u32,
    max_sessions: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session_index: 0,
            frame_index: 0,
            running: false,
            frame_interval: Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS),
            next_candidate: 0,
            max_sessions: MAX_SESSIONS,
        }
    }
}

pub struct LapseController<S, C> {
    storage: S,
    camera: C,
    state: SessionState,
}

impl<S: Storage, C: CaptureDevice> LapseController<S, C> {
    pub fn new(storage: S, camera: C) -> Self {
        Self {
            storage,
            camera,
            state: SessionState::default(),
        }
    }

    pub fn with_config(storage: S, camera: C, settings: &CaptureSettings) -> Self {
        let mut controller = Self::new(storage, camera);
        controller.state.frame_interval = settings.frame_interval();
        controller.state.max_sessions = settings.max_sessions.min(MAX_SESSIONS);
        controller
    }

    /// Mount the storage medium. Call once before the first start.
    pub fn mount(&mut self) -> Result<MediumInfo, LapseError> {
        self.storage.mount().map_err(|e| {
            log::error!("Card mount failed: {}", e);
            LapseError::mount_failed(e)
        })
    }

    /// Change the frame spacing. Applies from the next tick, running or not.
    pub fn set_interval(&mut self, interval: Duration) {
        self.state.frame_interval = interval;
        log::info!("Updated frame interval to {}ms", interval.as_millis());
    }

    pub fn interval(&self) -> Duration {
        self.state.frame_interval
    }

    /// Start a new session in the lowest free directory at or above the scan cursor.
    ///
    /// Starting while a session runs is a no-op that returns the current index.
    pub fn start(&mut self) -> Result<u32, LapseError> {
        log::info!("Starting timelapse");
        if self.state.running {
            return Ok(self.state.session_index);
        }

        self.state.frame_index = 0;

        let bound = self.state.max_sessions;
        let storage = &self.storage;
        let free = (self.state.next_candidate..bound)
            .find(|&index| !storage.exists(&paths::session_dir(index)));

        let index = match free {
            Some(index) => index,
            None => {
                self.state.next_candidate = bound;
                log::error!("No free session directory below {}", bound);
                return Err(LapseError::namespace_exhausted(bound));
            }
        };
        self.state.next_candidate = index;

        let dir = paths::session_dir(index);
        self.storage
            .mkdir(&dir)
            .map_err(|e| LapseError::storage_write_failed(&dir, e))?;

        self.state.session_index = index;
        self.state.next_candidate = index + 1;
        self.state.running = true;
        log::info!("Timelapse session {} started in {}", index, dir);
        Ok(index)
    }

    /// Stop capturing. Always succeeds; indices stay readable until the next start.
    pub fn stop(&mut self) {
        log::info!("Stopping timelapse");
        self.state.running = false;
    }

    /// Capture one frame and store it under the current session.
    ///
    /// A capture failure leaves the session running. A write failure ends the
    /// session. The frame index only advances when the write succeeds.
    pub fn process(&mut self) -> Result<FrameRecord, LapseError> {
        if !self.state.running {
            log::warn!("Tick called while no session is running");
            return Err(LapseError::not_running());
        }

        let frame = self.camera.acquire_frame().map_err(|e| {
            log::warn!("Camera capture failed: {}", e);
            LapseError::capture_unavailable(e)
        })?;

        let session_index = self.state.session_index;
        let frame_index = self.state.frame_index;
        let path = paths::frame_path(session_index, frame_index);
        let bytes = frame.len();

        let written = self.storage.write(&path, frame.as_bytes());
        self.camera.release_frame(frame);

        if let Err(e) = written {
            self.state.running = false;
            log::error!("Frame write failed, session {} aborted: {}", session_index, e);
            return Err(LapseError::storage_write_failed(&path, e));
        }

        self.state.frame_index += 1;
        log::debug!("Stored frame {} ({} bytes)", path, bytes);
        Ok(FrameRecord {
            path,
            session_index,
            frame_index,
            bytes,
        })
    }

    /// Index the next start would pick, without creating anything.
    pub fn peek_next_session(&self) -> Option<u32> {
        (self.state.next_candidate..self.state.max_sessions)
            .find(|&index| !self.storage.exists(&paths::session_dir(index)))
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn state(&self) -> LapseState {
        if self.state.running {
            LapseState::Running
        } else {
            LapseState::Idle
        }
    }

    pub fn session_index(&self) -> u32 {
        self.state.session_index
    }

    pub fn frame_index(&self) -> u32 {
        self.state.frame_index
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state(),
            session_index: self.state.session_index,
            frame_index: self.state.frame_index,
            frame_interval_ms: u64::try_from(self.state.frame_interval.as_millis())
                .unwrap_or(u64::MAX),
            next_candidate: self.state.next_candidate,
            session_dir: paths::session_dir(self.state.session_index),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut C {
        &mut self.camera
    }

    pub fn into_parts(self) -> (S, C) {
        (self.storage, self.camera)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LapseErrorKind;
    use crate::testing::{MemoryStorage, SyntheticCamera};

    fn controller() -> LapseController<MemoryStorage, SyntheticCamera> {
        LapseController::new(MemoryStorage::mounted(), SyntheticCamera::raw(4, 4))
    }

    #[test]
    fn test_fresh_controller_is_idle() {
        let c = controller();
        assert_eq!(c.state(), LapseState::Idle);
        assert_eq!(c.frame_index(), 0);
        assert_eq!(c.interval(), Duration::from_millis(5000));
    }

    #[test]
    fn test_first_session_scenario() {
        let mut c = controller();
        assert_eq!(c.start(), Ok(0));
        assert!(c.storage().dirs().contains(&"/lapse000".to_string()));

        let paths: Vec<String> = (0..3).map(|_| c.process().unwrap().path).collect();
        assert_eq!(
            paths,
            vec![
                "/lapse000/pic00000.jpg",
                "/lapse000/pic00001.jpg",
                "/lapse000/pic00002.jpg",
            ]
        );
        assert_eq!(c.frame_index(), 3);

        c.stop();
        assert_eq!(c.start(), Ok(1));
        assert_eq!(c.session_index(), 1);
        assert_eq!(c.frame_index(), 0);
        assert!(c.storage().exists("/lapse001"));
    }

    #[test]
    fn test_start_while_running_is_noop() {
        let mut c = controller();
        c.start().unwrap();
        c.process().unwrap();
        c.process().unwrap();

        assert_eq!(c.start(), Ok(0));
        assert_eq!(c.session_index(), 0);
        assert_eq!(c.frame_index(), 2);
        assert_eq!(c.storage().dirs().len(), 1);
    }

    #[test]
    fn test_start_skips_existing_directories() {
        let mut storage = MemoryStorage::mounted();
        storage.add_dir("/lapse000");
        storage.add_dir("/lapse001");
        storage.add_dir("/lapse003");
        let mut c = LapseController::new(storage, SyntheticCamera::raw(4, 4));

        assert_eq!(c.start(), Ok(2));
        c.stop();
        assert_eq!(c.start(), Ok(4));
    }

    #[test]
    fn test_cursor_never_rewinds() {
        let mut c = controller();
        c.start().unwrap();
        c.stop();
        c.start().unwrap();
        c.stop();

        // Freeing an earlier directory does not make it eligible again.
        c.storage_mut().remove_dir("/lapse000");
        assert_eq!(c.start(), Ok(2));
    }

    #[test]
    fn test_namespace_exhaustion_is_permanent() {
        let settings = CaptureSettings {
            frame_interval_ms: 100,
            max_sessions: 2,
        };
        let mut c = LapseController::with_config(
            MemoryStorage::mounted(),
            SyntheticCamera::raw(4, 4),
            &settings,
        );
        assert_eq!(c.start(), Ok(0));
        c.stop();
        assert_eq!(c.start(), Ok(1));
        c.stop();

        let err = c.start().unwrap_err();
        assert_eq!(err.kind, LapseErrorKind::NamespaceExhausted);
        assert!(!c.is_running());

        c.storage_mut().remove_dir("/lapse000");
        c.storage_mut().remove_dir("/lapse001");
        assert_eq!(c.start().unwrap_err().kind, LapseErrorKind::NamespaceExhausted);
        assert_eq!(c.peek_next_session(), None);
    }

    #[test]
    fn test_mkdir_failure_aborts_start() {
        let mut c = controller();
        c.storage_mut().fail_mkdir(true);

        let err = c.start().unwrap_err();
        assert_eq!(err.kind, LapseErrorKind::StorageWriteFailed);
        assert!(!c.is_running());

        c.storage_mut().fail_mkdir(false);
        assert_eq!(c.start(), Ok(0));
    }

    #[test]
    fn test_idle_tick_touches_nothing() {
        let mut c = controller();
        let err = c.process().unwrap_err();
        assert_eq!(err.kind, LapseErrorKind::NotRunning);
        assert_eq!(c.camera().stats().acquired, 0);
        assert_eq!(c.storage().write_attempts(), 0);
        assert_eq!(c.frame_index(), 0);
    }

    #[test]
    fn test_capture_failure_keeps_session_running() {
        let mut c = controller();
        c.start().unwrap();
        c.process().unwrap();

        c.camera_mut().fail_next(1);
        let err = c.process().unwrap_err();
        assert_eq!(err.kind, LapseErrorKind::CaptureUnavailable);
        assert!(c.is_running());
        assert_eq!(c.frame_index(), 1);
        assert_eq!(c.storage().write_attempts(), 1);

        let record = c.process().unwrap();
        assert_eq!(record.path, "/lapse000/pic00001.jpg");
    }

    #[test]
    fn test_write_failure_on_fifth_tick() {
        let mut c = controller();
        c.start().unwrap();
        c.storage_mut().fail_writes_after(4);
        for _ in 0..4 {
            c.process().unwrap();
        }
        assert_eq!(c.frame_index(), 4);

        let err = c.process().unwrap_err();
        assert_eq!(err.kind, LapseErrorKind::StorageWriteFailed);
        assert!(!c.is_running());
        assert_eq!(c.frame_index(), 4);

        let acquired = c.camera().stats().acquired;
        let err = c.process().unwrap_err();
        assert_eq!(err.kind, LapseErrorKind::NotRunning);
        assert_eq!(c.camera().stats().acquired, acquired);
    }

    #[test]
    fn test_buffers_released_on_every_path() {
        let camera = SyntheticCamera::raw(4, 4).with_pool(1);
        let mut c = LapseController::new(MemoryStorage::mounted(), camera);
        c.start().unwrap();
        c.process().unwrap();
        c.storage_mut().short_writes(true);
        assert!(c.process().is_err());

        let stats = c.camera().stats();
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.acquired, 2);
        assert_eq!(stats.released, 2);

        // A single-buffer pool keeps working across sessions.
        c.storage_mut().short_writes(false);
        c.start().unwrap();
        c.process().unwrap();
        c.process().unwrap();
    }

    #[test]
    fn test_interval_change_applies_forward() {
        let mut c = controller();
        c.start().unwrap();
        c.process().unwrap();
        let before = c.interval();

        c.set_interval(Duration::from_millis(250));
        assert_eq!(before, Duration::from_millis(5000));
        assert_eq!(c.interval(), Duration::from_millis(250));
        assert_eq!(c.frame_index(), 1);
        assert!(c.is_running());

        c.stop();
        c.set_interval(Duration::from_millis(1000));
        assert_eq!(c.status().frame_interval_ms, 1000);
    }

    #[test]
    fn test_status_after_stop_keeps_history() {
        let mut c = controller();
        c.start().unwrap();
        c.process().unwrap();
        c.stop();

        let status = c.status();
        assert_eq!(status.state, LapseState::Idle);
        assert_eq!(status.session_index, 0);
        assert_eq!(status.frame_index, 1);
        assert_eq!(status.session_dir, "/lapse000");
        assert_eq!(status.next_candidate, 1);
    }

    #[test]
    fn test_oversized_interval_saturates_in_status() {
        let mut c = controller();
        c.set_interval(Duration::MAX);
        assert_eq!(c.interval(), Duration::MAX);
        assert_eq!(c.status().frame_interval_ms, u64::MAX);

        c.set_interval(Duration::from_millis(u64::MAX));
        assert_eq!(c.status().frame_interval_ms, u64::MAX);
    }

    #[test]
    fn test_mount_failure_maps_to_kind() {
        let mut c =
            LapseController::new(MemoryStorage::without_medium(), SyntheticCamera::raw(4, 4));
        assert_eq!(c.mount().unwrap_err().kind, LapseErrorKind::MountFailed);
    }

    #[test]
    fn test_frame_payload_written_unmodified() {
        let mut c = controller();
        c.start().unwrap();
        let record = c.process().unwrap();
        let stored = c.storage().read(&record.path).unwrap();
        assert_eq!(stored.len(), record.bytes);
        assert_eq!(stored.len(), 4 * 4 * 3);
    }
}
