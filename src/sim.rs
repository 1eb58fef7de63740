//! In-process simulated tracker.
//!
//! Implements the native capability traits on top of a scripted event queue,
//! so sessions can be driven without hardware. Samples are delivered from
//! inside `run_event_loop`, on whichever thread runs it, the same way the
//! vendor SDK invokes its callbacks.

use crate::native::{codes, GazeCallback, NativeBackend, NativeDevice, NativeStatus};
use crate::types::GazeSample;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

enum SimEvent {
    Sample(GazeSample),
    Exit(NativeStatus),
    /// Interrupt aimed at the handle of the given generation.
    Break(u64),
}

struct SimState {
    create_status: NativeStatus,
    connect_status: NativeStatus,
    start_status: NativeStatus,
    stop_status: NativeStatus,
    connected: bool,
    callback: Option<GazeCallback>,
    /// Bumped on every `create`; interrupts for older handles are ignored.
    generation: u64,
    dropped_samples: usize,
    addresses: Vec<String>,
    start_calls: usize,
    stop_calls: usize,
}

/// Scriptable stand-in for a tracker handle.
pub struct SimulatedTracker {
    events_tx: Sender<SimEvent>,
    events_rx: Receiver<SimEvent>,
    interruptible: AtomicBool,
    state: Mutex<SimState>,
}

impl SimulatedTracker {
    /// A tracker on which every native call succeeds.
    pub fn new() -> Arc<SimulatedTracker> {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Arc::new(SimulatedTracker {
            events_tx,
            events_rx,
            interruptible: AtomicBool::new(true),
            state: Mutex::new(SimState {
                create_status: codes::SUCCESS,
                connect_status: codes::SUCCESS,
                start_status: codes::SUCCESS,
                stop_status: codes::SUCCESS,
                connected: false,
                callback: None,
                generation: 0,
                dropped_samples: 0,
                addresses: Vec::new(),
                start_calls: 0,
                stop_calls: 0,
            }),
        })
    }

    /// Backend that hands out this tracker on every `create`.
    pub fn backend(self: &Arc<Self>) -> SimulatedBackend {
        SimulatedBackend {
            tracker: Arc::clone(self),
        }
    }

    /// Queue a sample. It reaches the registered callback, if any, once the
    /// event loop picks it up; without a callback it is discarded.
    pub fn push_sample(&self, sample: GazeSample) {
        let _ = self.events_tx.send(SimEvent::Sample(sample));
    }

    /// Queue termination of the event loop with `code`.
    pub fn end_event_loop(&self, code: NativeStatus) {
        let _ = self.events_tx.send(SimEvent::Exit(code));
    }

    pub fn set_create_status(&self, code: NativeStatus) {
        self.lock().create_status = code;
    }

    pub fn set_connect_status(&self, code: NativeStatus) {
        self.lock().connect_status = code;
    }

    pub fn set_start_status(&self, code: NativeStatus) {
        self.lock().start_status = code;
    }

    pub fn set_stop_status(&self, code: NativeStatus) {
        self.lock().stop_status = code;
    }

    /// Whether `break_event_loop` is honoured.
    pub fn set_interruptible(&self, interruptible: bool) {
        self.interruptible.store(interruptible, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn is_tracking(&self) -> bool {
        self.lock().callback.is_some()
    }

    /// Addresses passed to `create`, in call order.
    pub fn created_addresses(&self) -> Vec<String> {
        self.lock().addresses.clone()
    }

    /// Samples the event loop discarded because no callback was registered.
    pub fn dropped_samples(&self) -> usize {
        self.lock().dropped_samples
    }

    pub fn start_tracking_calls(&self) -> usize {
        self.lock().start_calls
    }

    pub fn stop_tracking_calls(&self) -> usize {
        self.lock().stop_calls
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NativeDevice for SimulatedTracker {
    fn connect(&self) -> NativeStatus {
        let mut state = self.lock();
        if state.connect_status == codes::SUCCESS {
            state.connected = true;
        }
        state.connect_status
    }

    fn disconnect(&self) {
        let mut state = self.lock();
        state.connected = false;
        state.callback = None;
    }

    fn run_event_loop(&self) -> NativeStatus {
        log::debug!("Simulated event loop running");
        loop {
            match self.events_rx.recv() {
                Ok(SimEvent::Sample(sample)) => {
                    // Clone out of the lock so the callback runs unlocked.
                    let callback = {
                        let mut state = self.lock();
                        if state.callback.is_none() {
                            state.dropped_samples += 1;
                        }
                        state.callback.clone()
                    };
                    match callback {
                        Some(callback) => callback(sample),
                        None => log::trace!("Simulated sample dropped, not tracking"),
                    }
                }
                Ok(SimEvent::Break(generation)) => {
                    if generation != self.lock().generation {
                        log::debug!("Ignoring stale interrupt for handle {}", generation);
                        continue;
                    }
                    log::debug!("Simulated event loop interrupted");
                    self.lock().connected = false;
                    return codes::OPERATION_ABORTED;
                }
                Ok(SimEvent::Exit(code)) => {
                    log::debug!("Simulated event loop exiting with code {}", code);
                    self.lock().connected = false;
                    return code;
                }
                Err(_) => return codes::SUCCESS,
            }
        }
    }

    fn break_event_loop(&self) -> bool {
        if !self.interruptible.load(Ordering::Relaxed) {
            return false;
        }
        let generation = self.lock().generation;
        let _ = self.events_tx.send(SimEvent::Break(generation));
        true
    }

    fn start_tracking(&self, callback: GazeCallback) -> NativeStatus {
        let mut state = self.lock();
        state.start_calls += 1;
        if !state.connected {
            return codes::NOT_CONNECTED;
        }
        if state.start_status == codes::SUCCESS {
            state.callback = Some(callback);
        }
        state.start_status
    }

    fn stop_tracking(&self) -> NativeStatus {
        let mut state = self.lock();
        state.stop_calls += 1;
        if state.stop_status == codes::SUCCESS {
            state.callback = None;
        }
        state.stop_status
    }
}

/// [`NativeBackend`] handing out a shared [`SimulatedTracker`].
#[derive(Clone)]
pub struct SimulatedBackend {
    tracker: Arc<SimulatedTracker>,
}

impl SimulatedBackend {
    pub fn tracker(&self) -> &Arc<SimulatedTracker> {
        &self.tracker
    }
}

impl NativeBackend for SimulatedBackend {
    fn create(&self, address: &str) -> Result<Arc<dyn NativeDevice>, NativeStatus> {
        let mut state = self.tracker.lock();
        state.addresses.push(address.to_string());
        if state.create_status != codes::SUCCESS {
            return Err(state.create_status);
        }
        state.generation += 1;
        drop(state);
        let device: Arc<dyn NativeDevice> = self.tracker.clone();
        Ok(device)
    }
}
