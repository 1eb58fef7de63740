use std::sync::Arc;

/// One sample as handed over by the native layer.
///
/// The payload is not decoded by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GazeSample {
    /// Device timestamp in microseconds.
    pub timestamp_us: u64,
    /// Raw sample bytes, forwarded untouched.
    pub payload: Vec<u8>,
}

impl GazeSample {
    pub fn new(timestamp_us: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp_us,
            payload: payload.into(),
        }
    }
}

/// Gaze event delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GazeEvent {
    sequence: u64,
    timestamp_us: u64,
    payload: Arc<[u8]>,
}

impl GazeEvent {
    pub(crate) fn from_sample(sequence: u64, sample: GazeSample) -> Self {
        Self {
            sequence,
            timestamp_us: sample.timestamp_us,
            payload: sample.payload.into(),
        }
    }

    /// Position of this event in the session's stream, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Device timestamp in microseconds.
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    /// Opaque sample payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Lifecycle state of a [`crate::Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Constructed; no native handle yet.
    Created,
    /// Handle created and event loop running, but the device is not connected.
    /// A connect call that fails leaves the session here.
    Connecting,
    /// Connected, not tracking.
    Connected,
    /// Gaze callback registered.
    Tracking,
    /// The event loop has returned.
    Stopped,
    /// Closed; the handle has been released.
    Disposed,
}

bitflags::bitflags! {
    /// Teardown steps performed when a session is closed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DisposeBehavior: u8 {
        /// Unregister the gaze callback if tracking.
        const STOP_TRACKING  = 1 << 0;
        /// Disconnect the device.
        const DISCONNECT     = 1 << 1;
        /// Ask the native event loop to return.
        const INTERRUPT_LOOP = 1 << 2;
    }
}

impl Default for DisposeBehavior {
    fn default() -> Self {
        DisposeBehavior::all()
    }
}
