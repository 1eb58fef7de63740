use crate::native::{codes, NativeStatus};
use std::fmt;

/// Errors produced by a tracking session.
///
/// The same value is either returned to the caller of a synchronous operation
/// or handed to every registered listener when it originates in the event loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("No tracker address given and configuration has no default")]
    Configuration,

    #[error("Session is already connected")]
    AlreadyConnected,

    #[error("Session is not connected")]
    NotConnected,

    #[error("Session has been disposed")]
    Disposed,

    #[error("Failed to create tracker handle for '{address}' (native code {code})")]
    Create { address: String, code: NativeStatus },

    #[error("Connect failed (native code {code})")]
    Connection { code: NativeStatus },

    #[error("Start tracking failed (native code {code})")]
    TrackingStart { code: NativeStatus },

    #[error("Stop tracking failed (native code {code})")]
    TrackingStop { code: NativeStatus },

    #[error("Device disconnected (native code {code})")]
    DeviceDisconnected { code: NativeStatus },

    #[error("Unknown native error (code {code})")]
    UnknownNative { code: NativeStatus },

    #[error("Failed to spawn event loop thread: {0}")]
    EventLoopSpawn(String),

    #[error("Event loop panicked: {0}")]
    EventLoopPanicked(String),
}

/// Fieldless classification of a [`SessionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    AlreadyConnected,
    NotConnected,
    Disposed,
    Create,
    Connection,
    TrackingStart,
    TrackingStop,
    DeviceDisconnected,
    UnknownNative,
    EventLoopSpawn,
    EventLoopPanicked,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Configuration => ErrorKind::Configuration,
            SessionError::AlreadyConnected => ErrorKind::AlreadyConnected,
            SessionError::NotConnected => ErrorKind::NotConnected,
            SessionError::Disposed => ErrorKind::Disposed,
            SessionError::Create { .. } => ErrorKind::Create,
            SessionError::Connection { .. } => ErrorKind::Connection,
            SessionError::TrackingStart { .. } => ErrorKind::TrackingStart,
            SessionError::TrackingStop { .. } => ErrorKind::TrackingStop,
            SessionError::DeviceDisconnected { .. } => ErrorKind::DeviceDisconnected,
            SessionError::UnknownNative { .. } => ErrorKind::UnknownNative,
            SessionError::EventLoopSpawn(_) => ErrorKind::EventLoopSpawn,
            SessionError::EventLoopPanicked(_) => ErrorKind::EventLoopPanicked,
        }
    }

    /// Native status code this error was derived from, if any.
    pub fn code(&self) -> Option<NativeStatus> {
        match self {
            SessionError::Create { code, .. }
            | SessionError::Connection { code }
            | SessionError::TrackingStart { code }
            | SessionError::TrackingStop { code }
            | SessionError::DeviceDisconnected { code }
            | SessionError::UnknownNative { code } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Map a native status code to a session error.
///
/// `SUCCESS` maps to `None`; every other code lands in the fixed taxonomy,
/// with unrecognised codes reported as [`SessionError::UnknownNative`].
pub fn translate(code: NativeStatus) -> Option<SessionError> {
    match code {
        codes::SUCCESS => None,
        codes::INVALID_URL
        | codes::ENDPOINT_NAME_LOOKUP_FAILED
        | codes::ENDPOINT_CONNECT_FAILED
        | codes::ALREADY_CONNECTED
        | codes::TIMED_OUT => Some(SessionError::Connection { code }),
        codes::DEVICE_COMMUNICATION_ERROR | codes::NOT_CONNECTED => {
            Some(SessionError::DeviceDisconnected { code })
        }
        codes::INVALID_OPERATION | codes::NOT_SUPPORTED => {
            Some(SessionError::TrackingStart { code })
        }
        _ => Some(SessionError::UnknownNative { code }),
    }
}
