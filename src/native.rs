//! Capability surface of the vendor tracking SDK.
//!
//! The session never talks to the SDK directly: it goes through these traits,
//! which a binding (or [`crate::sim`]) implements.

use crate::types::GazeSample;
use std::sync::Arc;

/// Raw status integer returned by every native call.
pub type NativeStatus = i32;

/// Callback invoked by the native layer for every incoming sample.
///
/// Native implementations call it from inside [`NativeDevice::run_event_loop`].
pub type GazeCallback = Arc<dyn Fn(GazeSample) + Send + Sync>;

/// Status codes of the Tobii Gaze SDK.
pub mod codes {
    use super::NativeStatus;

    pub const SUCCESS: NativeStatus = 0;
    pub const UNKNOWN: NativeStatus = 1;
    pub const OUT_OF_MEMORY: NativeStatus = 2;
    pub const BUFFER_TOO_SMALL: NativeStatus = 3;
    pub const INVALID_PARAMETER: NativeStatus = 4;
    pub const TIMED_OUT: NativeStatus = 100;
    pub const OPERATION_ABORTED: NativeStatus = 101;
    pub const INVALID_URL: NativeStatus = 102;
    pub const ENDPOINT_NAME_LOOKUP_FAILED: NativeStatus = 103;
    pub const ENDPOINT_CONNECT_FAILED: NativeStatus = 104;
    pub const DEVICE_COMMUNICATION_ERROR: NativeStatus = 105;
    pub const ALREADY_CONNECTED: NativeStatus = 106;
    pub const NOT_CONNECTED: NativeStatus = 107;
    pub const INVALID_OPERATION: NativeStatus = 200;
    pub const NOT_SUPPORTED: NativeStatus = 201;
}

/// Factory for native device handles.
pub trait NativeBackend: Send + Sync {
    /// Create a handle bound to `address`. Does not connect.
    fn create(&self, address: &str) -> Result<Arc<dyn NativeDevice>, NativeStatus>;
}

/// One native tracker handle.
///
/// `connect`, `disconnect`, `start_tracking`, `stop_tracking` and
/// `break_event_loop` are issued from the caller's thread while another thread
/// sits in `run_event_loop`; implementations must allow that. The handle is
/// released when the last reference is dropped.
pub trait NativeDevice: Send + Sync {
    fn connect(&self) -> NativeStatus;

    fn disconnect(&self);

    /// Pump native events until the loop terminates. Blocks.
    fn run_event_loop(&self) -> NativeStatus;

    /// Ask a running event loop to return.
    ///
    /// Returns `false` if the device has no interrupt primitive, in which case
    /// the loop keeps running until the device goes away on its own.
    ///
    /// May be called just after the loop has returned by itself, or before it
    /// has been entered. A late call must not end a loop run for a handle
    /// created afterwards.
    fn break_event_loop(&self) -> bool {
        false
    }

    fn start_tracking(&self, callback: GazeCallback) -> NativeStatus;

    fn stop_tracking(&self) -> NativeStatus;
}
