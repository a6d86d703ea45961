//! Session worker for threaded hosts
//!
//! Moves a [`LapseController`] onto its own thread and talks to it through a
//! channel, so the state is only ever touched by one owner. Every request
//! carries its own reply channel; a tick in progress is never interrupted,
//! a caller that stops waiting just drops the reply.

use crate::device::CaptureDevice;
use crate::errors::{LapseError, LapseErrorKind};
use crate::session::{FrameRecord, LapseController, SessionStatus};
use crate::storage::Storage;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

enum Request {
    Start(Sender<Result<u32, LapseError>>),
    Stop(Sender<()>),
    SetInterval(Duration, Sender<()>),
    Interval(Sender<Duration>),
    Process(Sender<Result<FrameRecord, LapseError>>),
    Status(Sender<SessionStatus>),
    Shutdown,
}

pub struct LapseService;

impl LapseService {
    /// Hand the controller to a dedicated worker thread.
    pub fn spawn<S, C>(controller: LapseController<S, C>) -> Result<LapseHandle<S, C>, LapseError>
    where
        S: Storage + Send + 'static,
        C: CaptureDevice + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = std::thread::Builder::new()
            .name("crablapse-session".to_string())
            .spawn(move || worker_loop(controller, rx))
            .map_err(|e| LapseError {
                kind: LapseErrorKind::WorkerGone,
                message: format!("spawn failed: {e}"),
            })?;

        Ok(LapseHandle {
            tx,
            worker: Arc::new(Mutex::new(Some(worker))),
            request_timeout: None,
        })
    }
}

/// Cloneable handle to a running session worker.
pub struct LapseHandle<S, C> {
    tx: Sender<Request>,
    worker: Arc<Mutex<Option<JoinHandle<LapseController<S, C>>>>>,
    request_timeout: Option<Duration>,
}

impl<S, C> Clone for LapseHandle<S, C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            worker: Arc::clone(&self.worker),
            request_timeout: self.request_timeout,
        }
    }
}

impl<S, C> LapseHandle<S, C> {
    /// Give up waiting for a reply after `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn start(&self) -> Result<u32, LapseError> {
        self.call(Request::Start)?
    }

    pub fn stop(&self) -> Result<(), LapseError> {
        self.call(Request::Stop)
    }

    pub fn set_interval(&self, interval: Duration) -> Result<(), LapseError> {
        self.call(|reply| Request::SetInterval(interval, reply))
    }

    pub fn interval(&self) -> Result<Duration, LapseError> {
        self.call(Request::Interval)
    }

    pub fn process(&self) -> Result<FrameRecord, LapseError> {
        self.call(Request::Process)?
    }

    pub fn status(&self) -> Result<SessionStatus, LapseError> {
        self.call(Request::Status)
    }

    /// Stop the session, end the worker and return the controller.
    ///
    /// Waits at most `join_timeout` for the worker to finish its current tick.
    pub fn shutdown(&self, join_timeout: Duration) -> Result<LapseController<S, C>, LapseError> {
        let handle = self
            .worker
            .lock()
            .map_err(|_| LapseError::worker_gone())?
            .take()
            .ok_or_else(LapseError::worker_gone)?;

        // The worker may already be gone; joining below still reports that.
        let _ = self.tx.send(Request::Shutdown);

        let start = Instant::now();
        while !handle.is_finished() {
            if start.elapsed() >= join_timeout {
                // Keep the handle so a later shutdown can retry.
                if let Ok(mut slot) = self.worker.lock() {
                    *slot = Some(handle);
                }
                return Err(LapseError::timeout());
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        handle.join().map_err(|_| {
            log::error!("Session worker panicked");
            LapseError::worker_gone()
        })
    }

    fn call<T>(&self, request: impl FnOnce(Sender<T>) -> Request) -> Result<T, LapseError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.tx
            .send(request(reply_tx))
            .map_err(|_| LapseError::worker_gone())?;

        match self.request_timeout {
            Some(timeout) => reply_rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => LapseError::timeout(),
                RecvTimeoutError::Disconnected => LapseError::worker_gone(),
            }),
            None => reply_rx.recv().map_err(|_| LapseError::worker_gone()),
        }
    }
}

fn worker_loop<S: Storage, C: CaptureDevice>(
    mut controller: LapseController<S, C>,
    rx: Receiver<Request>,
) -> LapseController<S, C> {
    log::debug!("Session worker started");
    while let Ok(request) = rx.recv() {
        // Replies go to callers that may have timed out; a closed reply channel is fine.
        match request {
            Request::Start(reply) => {
                let _ = reply.send(controller.start());
            }
            Request::Stop(reply) => {
                controller.stop();
                let _ = reply.send(());
            }
            Request::SetInterval(interval, reply) => {
                controller.set_interval(interval);
                let _ = reply.send(());
            }
            Request::Interval(reply) => {
                let _ = reply.send(controller.interval());
            }
            Request::Process(reply) => {
                let _ = reply.send(controller.process());
            }
            Request::Status(reply) => {
                let _ = reply.send(controller.status());
            }
            Request::Shutdown => break,
        }
    }

    if controller.is_running() {
        controller.stop();
    }
    log::debug!("Session worker exiting");
    controller
}
