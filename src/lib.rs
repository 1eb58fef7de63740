//! # tobii-gaze - session manager for Tobii eye trackers
//!
//! Wraps the blocking, callback-driven vendor SDK behind a [`Session`]:
//! - Connection lifecycle (create handle, connect, start/stop tracking, close)
//! - A dedicated background thread pumping the native event loop
//! - Thread-safe fan-out of gaze events and loop errors to [`GazeListener`]s
//!
//! The SDK itself is reached through the [`native`] traits; [`sim`] provides a
//! scriptable in-process tracker.
//!
//! ## Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use tobii_gaze::{GazeEvent, GazeListener, Session, SessionError, TrackerConfig};
//! use tobii_gaze::sim::SimulatedTracker;
//!
//! struct Printer;
//!
//! impl GazeListener for Printer {
//!     fn on_gaze_event(&self, event: &GazeEvent) {
//!         println!("#{} at {} us", event.sequence(), event.timestamp_us());
//!     }
//!
//!     fn on_session_error(&self, error: &SessionError) {
//!         eprintln!("tracker error: {}", error);
//!     }
//! }
//!
//! let tracker = SimulatedTracker::new();
//! let mut session = Session::new(
//!     TrackerConfig::from_env(),
//!     tracker.backend(),
//!     Some("tet-tcp://169.254.5.10"),
//! )
//! .unwrap();
//! session.register(Arc::new(Printer));
//! session.connect().unwrap().start().unwrap();
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod native;
pub mod listener;
pub mod event_loop;
pub mod session;
pub mod sim;

pub use config::{Configuration, TrackerConfig};
pub use error::{ErrorKind, SessionError};
pub use listener::{GazeListener, ListenerRegistry};
pub use native::{NativeBackend, NativeDevice, NativeStatus};
pub use session::Session;
pub use types::*;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
