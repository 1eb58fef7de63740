use crate::config::Configuration;
use crate::listener::{panic_message, ListenerRegistry};
use crate::native::{codes, NativeDevice, NativeStatus};
use crate::{Result, SessionError};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Background thread pumping the native event loop of one device handle.
///
/// The thread is the only caller of [`NativeDevice::run_event_loop`]. Gaze
/// callbacks registered with the device fire on it. When the native loop
/// returns with an error status, or panics, the error goes to every registered
/// listener; nothing is propagated to the owner.
pub struct EventLoop {
    exit: Receiver<NativeStatus>,
    exit_status: Option<NativeStatus>,
    shutdown: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventLoop {
    pub(crate) fn spawn(
        device: Arc<dyn NativeDevice>,
        listeners: Arc<ListenerRegistry>,
        config: Arc<dyn Configuration>,
    ) -> Result<EventLoop> {
        let (exit_tx, exit) = crossbeam_channel::bounded(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let shutdown_clone = shutdown.clone();
        let running_clone = running.clone();

        let thread = std::thread::Builder::new()
            .name(config.event_loop_thread_name())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_loop(device.as_ref(), &listeners, config.as_ref(), &shutdown_clone)
                }));
                let status = match result {
                    Ok(status) => status,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref()).to_string();
                        log::error!("Event loop panicked: {}", message);
                        if !shutdown_clone.load(Ordering::Acquire) {
                            listeners.dispatch_error(&SessionError::EventLoopPanicked(message));
                        }
                        codes::UNKNOWN
                    }
                };
                running_clone.store(false, Ordering::Release);
                let _ = exit_tx.send(status);
            })
            .map_err(|e| SessionError::EventLoopSpawn(e.to_string()))?;

        Ok(EventLoop {
            exit,
            exit_status: None,
            shutdown,
            running,
            thread: Some(thread),
        })
    }

    /// Whether the native loop is still pumping.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for the loop to return; yields its native status.
    pub fn wait(&mut self, timeout: Duration) -> Option<NativeStatus> {
        if self.exit_status.is_none() {
            self.exit_status = match self.exit.recv_timeout(timeout) {
                Ok(status) => Some(status),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
            };
        }
        self.exit_status
    }

    /// Mark the loop as shutting down without touching the device.
    pub(crate) fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Stop the loop.
    ///
    /// Listeners are not told about the status the loop exits with after this
    /// call. The thread is joined only when the device accepted the interrupt
    /// (or the loop has already returned); otherwise it is left to finish on
    /// its own, since there is no way to cut a blocking native call short.
    pub(crate) fn shutdown(mut self, device: &dyn NativeDevice, interrupt: bool) {
        self.request_shutdown();

        let interrupted = interrupt && self.is_running() && device.break_event_loop();
        let Some(thread) = self.thread.take() else {
            return;
        };

        if interrupted || !self.is_running() {
            if thread.join().is_err() {
                log::warn!("Event loop thread panicked");
            }
            log::info!("Event loop stopped");
        } else {
            log::warn!(
                "Event loop cannot be interrupted, abandoning thread {:?}",
                thread.thread().name()
            );
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        // Never block here; an orderly stop goes through `shutdown`.
        self.shutdown.store(true, Ordering::Release);
    }
}

fn run_loop(
    device: &dyn NativeDevice,
    listeners: &ListenerRegistry,
    config: &dyn Configuration,
    shutdown: &AtomicBool,
) -> NativeStatus {
    log::info!("Event loop started");
    let status = device.run_event_loop();

    match config.translate_native_code(status) {
        None => log::info!("Event loop returned normally"),
        Some(error) if shutdown.load(Ordering::Acquire) => {
            log::debug!("Event loop returned after shutdown request: {}", error);
        }
        Some(error) => {
            log::warn!("Event loop terminated: {}", error);
            listeners.dispatch_error(&error);
        }
    }
    status
}
