use crate::config::{self, Configuration};
use crate::event_loop::EventLoop;
use crate::listener::{GazeListener, ListenerRegistry};
use crate::native::{GazeCallback, NativeBackend, NativeDevice, NativeStatus};
use crate::types::{DisposeBehavior, GazeEvent, GazeSample, SessionState};
use crate::{Result, SessionError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Exclusively owned native handle.
///
/// Dropping it unregisters the gaze callback and disconnects, as selected by
/// the dispose behavior. The native object itself is freed once the event
/// loop thread lets go of its reference too.
struct DeviceHandle {
    device: Arc<dyn NativeDevice>,
    dispose: DisposeBehavior,
    connected: bool,
    tracking: bool,
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if self.tracking && self.dispose.contains(DisposeBehavior::STOP_TRACKING) {
            let status = self.device.stop_tracking();
            log::debug!("Stopped tracking on release (native code {})", status);
        }
        if self.connected && self.dispose.contains(DisposeBehavior::DISCONNECT) {
            self.device.disconnect();
            log::debug!("Disconnected on release");
        }
    }
}

/// A managed connection to one eye tracker.
///
/// `connect()` creates the native handle and starts the background event
/// loop, `start()` streams gaze events to registered listeners. Errors the
/// event loop runs into later are only reported to listeners, so register one
/// before starting if you need to see them.
///
/// Closing a session whose native layer cannot interrupt its event loop leaves
/// the loop thread running until the device itself ends it.
pub struct Session {
    address: String,
    config: Arc<dyn Configuration>,
    backend: Arc<dyn NativeBackend>,
    listeners: Arc<ListenerRegistry>,
    sequence: Arc<AtomicU64>,
    handle: Option<DeviceHandle>,
    event_loop: Option<EventLoop>,
    state: SessionState,
}

impl Session {
    /// Create a session for `address`, falling back to the configured default.
    ///
    /// Fails with [`SessionError::Configuration`] if neither yields an address.
    /// Does not touch the device.
    pub fn new<C, B>(config: C, backend: B, address: Option<&str>) -> Result<Session>
    where
        C: Configuration + 'static,
        B: NativeBackend + 'static,
    {
        Self::with_shared(Arc::new(config), Arc::new(backend), address)
    }

    pub fn with_shared(
        config: Arc<dyn Configuration>,
        backend: Arc<dyn NativeBackend>,
        address: Option<&str>,
    ) -> Result<Session> {
        let address = config::non_empty(address.map(str::to_string))
            .or_else(|| config::non_empty(config.default_tracker_address()))
            .ok_or(SessionError::Configuration)?;

        Ok(Session {
            address,
            config,
            backend,
            listeners: Arc::new(ListenerRegistry::new()),
            sequence: Arc::new(AtomicU64::new(0)),
            handle: None,
            event_loop: None,
            state: SessionState::Created,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> SessionState {
        match self.state {
            SessionState::Connecting | SessionState::Connected | SessionState::Tracking
                if !self.is_loop_running() =>
            {
                SessionState::Stopped
            }
            state => state,
        }
    }

    pub fn is_loop_running(&self) -> bool {
        self.event_loop.as_ref().is_some_and(EventLoop::is_running)
    }

    /// Wait up to `timeout` for the event loop to return; yields its native status.
    pub fn wait_for_loop_exit(&mut self, timeout: Duration) -> Option<NativeStatus> {
        self.event_loop.as_mut()?.wait(timeout)
    }

    /// Create the native handle, launch the event loop, then connect.
    ///
    /// The event loop is started before the connect call and keeps running if
    /// that call fails; the session then stays in [`SessionState::Connecting`].
    /// Allowed from `Created`, and from `Stopped` to reconnect after the loop
    /// has ended.
    pub fn connect(&mut self) -> Result<&mut Self> {
        match self.state() {
            SessionState::Created => {}
            SessionState::Stopped => {
                log::info!("Reconnecting to {}", self.address);
                self.release(false);
            }
            SessionState::Disposed => return Err(SessionError::Disposed),
            _ => return Err(SessionError::AlreadyConnected),
        }

        let device = self
            .backend
            .create(&self.address)
            .map_err(|code| SessionError::Create {
                address: self.address.clone(),
                code,
            })?;

        let event_loop = match EventLoop::spawn(
            device.clone(),
            self.listeners.clone(),
            self.config.clone(),
        ) {
            Ok(event_loop) => event_loop,
            Err(e) => {
                self.state = SessionState::Created;
                return Err(e);
            }
        };

        self.handle = Some(DeviceHandle {
            device: device.clone(),
            dispose: self.config.dispose_behavior(),
            connected: false,
            tracking: false,
        });
        self.event_loop = Some(event_loop);
        self.state = SessionState::Connecting;

        let status = device.connect();
        if let Some(error) = self.config.translate_native_code(status) {
            log::warn!("Connect to {} failed: {}", self.address, error);
            return Err(SessionError::Connection { code: status });
        }

        if let Some(handle) = self.handle.as_mut() {
            handle.connected = true;
        }
        self.state = SessionState::Connected;
        log::info!("Connected to {}", self.address);
        Ok(self)
    }

    /// Register the gaze callback with the native layer.
    ///
    /// No-op while already tracking. A failed start is rolled back, so it can
    /// be retried.
    pub fn start(&mut self) -> Result<&mut Self> {
        match self.state() {
            SessionState::Tracking => return Ok(self),
            SessionState::Connected => {}
            SessionState::Disposed => return Err(SessionError::Disposed),
            _ => return Err(SessionError::NotConnected),
        }
        let handle = self.handle.as_mut().ok_or(SessionError::NotConnected)?;

        let listeners = self.listeners.clone();
        let sequence = self.sequence.clone();
        let callback: GazeCallback = Arc::new(move |sample: GazeSample| {
            let event = GazeEvent::from_sample(sequence.fetch_add(1, Ordering::Relaxed), sample);
            log::trace!("Gaze event #{}", event.sequence());
            listeners.dispatch_gaze(&event);
        });

        handle.tracking = true;
        let status = handle.device.start_tracking(callback);
        if let Some(error) = self.config.translate_native_code(status) {
            handle.tracking = false;
            log::warn!("Start tracking failed, rolled back: {}", error);
            return Err(SessionError::TrackingStart { code: status });
        }

        self.state = SessionState::Tracking;
        log::info!("Tracking started on {}", self.address);
        Ok(self)
    }

    /// Unregister the gaze callback. The event loop keeps running, so
    /// [`start`](Self::start) can resume tracking. No-op when not tracking.
    pub fn stop(&mut self) -> Result<&mut Self> {
        if self.state == SessionState::Disposed {
            return Err(SessionError::Disposed);
        }
        if !self.handle.as_ref().is_some_and(|h| h.tracking) {
            return Ok(self);
        }
        let handle = self.handle.as_mut().ok_or(SessionError::NotConnected)?;

        let status = handle.device.stop_tracking();
        if let Some(error) = self.config.translate_native_code(status) {
            log::warn!("Stop tracking failed: {}", error);
            return Err(SessionError::TrackingStop { code: status });
        }

        handle.tracking = false;
        if self.state == SessionState::Tracking {
            self.state = SessionState::Connected;
        }
        log::info!("Tracking stopped on {}", self.address);
        Ok(self)
    }

    pub fn register(&self, listener: Arc<dyn GazeListener>) -> &Self {
        self.listeners.add(listener);
        self
    }

    pub fn deregister(&self, listener: &Arc<dyn GazeListener>) -> &Self {
        self.listeners.remove(listener);
        self
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Release the native handle and stop the event loop. Further lifecycle
    /// calls fail with [`SessionError::Disposed`]. Called on drop.
    pub fn close(&mut self) {
        if self.state == SessionState::Disposed {
            return;
        }
        let interrupt = self
            .config
            .dispose_behavior()
            .contains(DisposeBehavior::INTERRUPT_LOOP);
        self.release(interrupt);
        self.state = SessionState::Disposed;
        log::info!("Session for {} closed", self.address);
    }

    fn release(&mut self, interrupt: bool) {
        let event_loop = self.event_loop.take();
        if let Some(event_loop) = &event_loop {
            event_loop.request_shutdown();
        }

        if let Some(handle) = self.handle.take() {
            let device = handle.device.clone();
            drop(handle);
            if let Some(event_loop) = event_loop {
                event_loop.shutdown(device.as_ref(), interrupt);
            }
        }
        self.state = SessionState::Created;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::event_loop::tests::PanickingDevice;
    use crate::listener::tests::{ChannelListener, Seen};
    use crate::native::codes;
    use crate::sim::SimulatedTracker;
    use crate::ErrorKind;

    const ADDRESS: &str = "tet-tcp://169.254.5.10";
    const TIMEOUT: Duration = Duration::from_secs(5);

    fn session(tracker: &Arc<SimulatedTracker>) -> Session {
        Session::new(TrackerConfig::new(), tracker.backend(), Some(ADDRESS)).unwrap()
    }

    /// Keeps whole gaze events, for checks on their contents.
    struct Capture(crossbeam_channel::Sender<GazeEvent>);

    impl GazeListener for Capture {
        fn on_gaze_event(&self, event: &GazeEvent) {
            let _ = self.0.send(event.clone());
        }

        fn on_session_error(&self, _error: &SessionError) {}
    }

    fn next(rx: &crossbeam_channel::Receiver<Seen>) -> Seen {
        rx.recv_timeout(TIMEOUT).expect("listener saw nothing")
    }

    #[test]
    fn test_stream_then_disconnect() {
        let tracker = SimulatedTracker::new();
        let mut session = session(&tracker);
        let (listener, rx) = ChannelListener::new();
        session.register(listener);

        session.connect().unwrap().start().unwrap();
        assert_eq!(session.state(), SessionState::Tracking);
        assert_eq!(tracker.created_addresses(), vec![ADDRESS.to_string()]);

        for ts in [100, 200, 300] {
            tracker.push_sample(GazeSample::new(ts, vec![1, 2, 3]));
        }
        tracker.end_event_loop(codes::NOT_CONNECTED);

        assert_eq!(next(&rx), Seen::Gaze(0));
        assert_eq!(next(&rx), Seen::Gaze(1));
        assert_eq!(next(&rx), Seen::Gaze(2));
        match next(&rx) {
            Seen::Error(e) => assert_eq!(e.kind(), ErrorKind::DeviceDisconnected),
            other => panic!("expected session error, got {:?}", other),
        }
        assert_eq!(session.wait_for_loop_exit(TIMEOUT), Some(codes::NOT_CONNECTED));
        assert!(rx.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_events_carry_sample() {
        let tracker = SimulatedTracker::new();
        let mut session = session(&tracker);
        let (tx, rx) = crossbeam_channel::unbounded();
        session.register(Arc::new(Capture(tx)));
        session.connect().unwrap().start().unwrap();

        tracker.push_sample(GazeSample::new(42, vec![9, 8]));
        let event = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(event.sequence(), 0);
        assert_eq!(event.timestamp_us(), 42);
        assert_eq!(event.payload(), &[9, 8]);
    }

    #[test]
    fn test_missing_address_fails_before_native_call() {
        let tracker = SimulatedTracker::new();
        let result = Session::new(
            TrackerConfig::new().with_default_address(""),
            tracker.backend(),
            Some(""),
        );
        assert_eq!(result.err(), Some(SessionError::Configuration));
        assert!(tracker.created_addresses().is_empty());
    }

    #[test]
    fn test_default_address_used_when_none_given() {
        let tracker = SimulatedTracker::new();
        let mut session = Session::new(
            TrackerConfig::new().with_default_address("tet-tcp://10.0.0.2"),
            tracker.backend(),
            None,
        )
        .unwrap();
        assert_eq!(session.address(), "tet-tcp://10.0.0.2");
        session.connect().unwrap();
        assert_eq!(tracker.created_addresses(), vec!["tet-tcp://10.0.0.2".to_string()]);
    }

    #[test]
    fn test_connect_twice_is_rejected() {
        let tracker = SimulatedTracker::new();
        let mut session = session(&tracker);
        session.connect().unwrap();
        assert_eq!(session.connect().err(), Some(SessionError::AlreadyConnected));
        assert_eq!(tracker.created_addresses().len(), 1);
    }

    #[test]
    fn test_create_failure() {
        let tracker = SimulatedTracker::new();
        tracker.set_create_status(codes::INVALID_URL);
        let mut session = session(&tracker);
        let err = session.connect().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Create);
        assert_eq!(err.code(), Some(codes::INVALID_URL));
        assert_eq!(session.state(), SessionState::Created);
        assert!(!session.is_loop_running());
    }

    #[test]
    fn test_failed_connect_keeps_loop_running() {
        let tracker = SimulatedTracker::new();
        tracker.set_connect_status(codes::ENDPOINT_CONNECT_FAILED);
        let mut session = session(&tracker);
        let (listener, rx) = ChannelListener::new();
        session.register(listener);

        assert_eq!(
            session.connect().err(),
            Some(SessionError::Connection {
                code: codes::ENDPOINT_CONNECT_FAILED
            })
        );
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.is_loop_running());
        assert_eq!(session.start().err(), Some(SessionError::NotConnected));
        assert_eq!(session.connect().err(), Some(SessionError::AlreadyConnected));

        // The loop still reports what happens to the device.
        tracker.end_event_loop(codes::DEVICE_COMMUNICATION_ERROR);
        assert_eq!(
            next(&rx),
            Seen::Error(SessionError::DeviceDisconnected {
                code: codes::DEVICE_COMMUNICATION_ERROR
            })
        );
        session.wait_for_loop_exit(TIMEOUT);
        assert_eq!(session.state(), SessionState::Stopped);

        // Reconnect after the loop ended.
        tracker.set_connect_status(codes::SUCCESS);
        session.connect().unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(tracker.created_addresses().len(), 2);
    }

    #[test]
    fn test_start_is_idempotent() {
        let tracker = SimulatedTracker::new();
        let mut session = session(&tracker);
        session.connect().unwrap().start().unwrap().start().unwrap();
        assert_eq!(tracker.start_tracking_calls(), 1);
        assert_eq!(session.state(), SessionState::Tracking);
    }

    #[test]
    fn test_start_before_connect() {
        let tracker = SimulatedTracker::new();
        let mut session = session(&tracker);
        assert_eq!(session.start().err(), Some(SessionError::NotConnected));
        assert_eq!(tracker.start_tracking_calls(), 0);
    }

    #[test]
    fn test_failed_start_rolls_back() {
        let tracker = SimulatedTracker::new();
        tracker.set_start_status(codes::NOT_SUPPORTED);
        let mut session = session(&tracker);
        session.connect().unwrap();

        assert_eq!(
            session.start().err(),
            Some(SessionError::TrackingStart {
                code: codes::NOT_SUPPORTED
            })
        );
        assert_eq!(session.state(), SessionState::Connected);

        tracker.set_start_status(codes::SUCCESS);
        session.start().unwrap();
        assert_eq!(tracker.start_tracking_calls(), 2);
        assert!(tracker.is_tracking());
    }

    #[test]
    fn test_stop_then_restart() {
        let tracker = SimulatedTracker::new();
        let mut session = session(&tracker);
        let (tx, rx) = crossbeam_channel::unbounded();
        session.register(Arc::new(Capture(tx)));
        session.connect().unwrap().start().unwrap();

        tracker.push_sample(GazeSample::new(1, vec![]));
        let first = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!((first.sequence(), first.timestamp_us()), (0, 1));

        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert!(!tracker.is_tracking());
        assert!(session.is_loop_running());

        tracker.push_sample(GazeSample::new(2, vec![]));
        let deadline = std::time::Instant::now() + TIMEOUT;
        while tracker.dropped_samples() == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(tracker.dropped_samples(), 1);

        session.stop().unwrap();
        assert_eq!(tracker.stop_tracking_calls(), 1);

        session.start().unwrap();
        tracker.push_sample(GazeSample::new(3, vec![]));
        let resumed = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!((resumed.sequence(), resumed.timestamp_us()), (1, 3));
        assert!(rx.try_recv().is_err());
        assert_eq!(tracker.start_tracking_calls(), 2);
    }

    #[test]
    fn test_stop_failure_keeps_tracking() {
        let tracker = SimulatedTracker::new();
        let mut session = session(&tracker);
        session.connect().unwrap().start().unwrap();
        tracker.set_stop_status(codes::INVALID_OPERATION);

        assert_eq!(session.stop().err().map(|e| e.kind()), Some(ErrorKind::TrackingStop));
        assert_eq!(session.state(), SessionState::Tracking);
    }

    #[test]
    fn test_deregistered_listener_gets_nothing() {
        let tracker = SimulatedTracker::new();
        let mut session = session(&tracker);
        let (listener, rx) = ChannelListener::new();
        let (witness, witness_rx) = ChannelListener::new();
        session.register(listener.clone()).register(witness);
        session.deregister(&listener);
        assert_eq!(session.listener_count(), 1);

        session.connect().unwrap().start().unwrap();
        tracker.push_sample(GazeSample::new(1, vec![]));
        assert_eq!(next(&witness_rx), Seen::Gaze(0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_loop_error_without_listeners_is_dropped() {
        let tracker = SimulatedTracker::new();
        let mut session = session(&tracker);
        let (listener, rx) = ChannelListener::new();
        session.register(listener.clone());
        session.connect().unwrap();
        session.deregister(&listener);
        assert_eq!(session.listener_count(), 0);

        tracker.end_event_loop(codes::NOT_CONNECTED);
        assert_eq!(session.wait_for_loop_exit(TIMEOUT), Some(codes::NOT_CONNECTED));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_panicking_loop_allows_reconnect() {
        struct PanickingBackend;
        impl NativeBackend for PanickingBackend {
            fn create(
                &self,
                _address: &str,
            ) -> std::result::Result<Arc<dyn NativeDevice>, NativeStatus> {
                Ok(Arc::new(PanickingDevice))
            }
        }

        let mut session =
            Session::new(TrackerConfig::new(), PanickingBackend, Some(ADDRESS)).unwrap();
        let (listener, rx) = ChannelListener::new();
        session.register(listener);

        session.connect().unwrap();
        assert_eq!(session.wait_for_loop_exit(TIMEOUT), Some(codes::UNKNOWN));
        assert!(!session.is_loop_running());
        assert_eq!(session.state(), SessionState::Stopped);
        match next(&rx) {
            Seen::Error(e) => assert_eq!(e.kind(), ErrorKind::EventLoopPanicked),
            other => panic!("expected session error, got {:?}", other),
        }

        session.connect().unwrap();
        assert_eq!(session.wait_for_loop_exit(TIMEOUT), Some(codes::UNKNOWN));
    }

    #[test]
    fn test_close_releases_device() {
        let tracker = SimulatedTracker::new();
        let mut session = session(&tracker);
        let (listener, rx) = ChannelListener::new();
        session.register(listener);
        session.connect().unwrap().start().unwrap();

        session.close();
        assert_eq!(session.state(), SessionState::Disposed);
        assert!(!tracker.is_tracking());
        assert!(!tracker.is_connected());
        assert!(!session.is_loop_running());
        // The interrupt status is not reported as an error.
        assert!(rx.try_recv().is_err());

        assert_eq!(session.connect().err(), Some(SessionError::Disposed));
        assert_eq!(session.start().err(), Some(SessionError::Disposed));
        assert_eq!(session.stop().err(), Some(SessionError::Disposed));
        session.close();
    }

    #[test]
    fn test_close_does_not_block_on_uninterruptible_loop() {
        let tracker = SimulatedTracker::new();
        tracker.set_interruptible(false);
        let mut session = session(&tracker);
        session.connect().unwrap();
        session.close();
        assert_eq!(session.state(), SessionState::Disposed);
        tracker.end_event_loop(codes::SUCCESS);
    }

    #[test]
    fn test_dispose_behavior_respected() {
        let tracker = SimulatedTracker::new();
        let config = TrackerConfig::new().with_dispose_behavior(DisposeBehavior::INTERRUPT_LOOP);
        let mut session = Session::new(config, tracker.backend(), Some(ADDRESS)).unwrap();
        session.connect().unwrap().start().unwrap();
        session.close();
        assert!(tracker.is_tracking());
        assert_eq!(tracker.stop_tracking_calls(), 0);
    }

    #[test]
    fn test_drop_disconnects() {
        let tracker = SimulatedTracker::new();
        {
            let mut session = session(&tracker);
            session.connect().unwrap().start().unwrap();
            assert!(tracker.is_connected());
        }
        assert!(!tracker.is_connected());
        assert!(!tracker.is_tracking());
    }
}
