use crate::error::{self, SessionError};
use crate::native::NativeStatus;
use crate::types::DisposeBehavior;

pub const DEFAULT_EVENT_LOOP_THREAD: &str = "tobii-event-loop";

/// Session configuration.
///
/// Supplies the fallback tracker address and the meaning of native status codes.
pub trait Configuration: Send + Sync {
    /// Address used when the session is constructed without one.
    fn default_tracker_address(&self) -> Option<String>;

    fn translate_native_code(&self, code: NativeStatus) -> Option<SessionError> {
        error::translate(code)
    }

    fn event_loop_thread_name(&self) -> String {
        DEFAULT_EVENT_LOOP_THREAD.to_string()
    }

    fn dispose_behavior(&self) -> DisposeBehavior {
        DisposeBehavior::default()
    }
}

/// Plain configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub default_address: Option<String>,
    pub thread_name: String,
    pub dispose: DisposeBehavior,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_address: None,
            thread_name: DEFAULT_EVENT_LOOP_THREAD.to_string(),
            dispose: DisposeBehavior::default(),
        }
    }
}

impl TrackerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from environment variables:
    ///
    /// - `TOBII_TRACKER_URL`: default tracker address
    /// - `TOBII_EVENT_LOOP_THREAD`: name of the event loop thread
    /// - `TOBII_STOP_ON_DISPOSE`, `TOBII_DISCONNECT_ON_DISPOSE`,
    ///   `TOBII_INTERRUPT_ON_DISPOSE`: teardown steps (default on)
    pub fn from_env() -> Self {
        let mut dispose = DisposeBehavior::empty();
        dispose.set(
            DisposeBehavior::STOP_TRACKING,
            read_env_bool("TOBII_STOP_ON_DISPOSE", true),
        );
        dispose.set(
            DisposeBehavior::DISCONNECT,
            read_env_bool("TOBII_DISCONNECT_ON_DISPOSE", true),
        );
        dispose.set(
            DisposeBehavior::INTERRUPT_LOOP,
            read_env_bool("TOBII_INTERRUPT_ON_DISPOSE", true),
        );

        let config = Self {
            default_address: read_env_string("TOBII_TRACKER_URL"),
            thread_name: read_env_string("TOBII_EVENT_LOOP_THREAD")
                .unwrap_or_else(|| DEFAULT_EVENT_LOOP_THREAD.to_string()),
            dispose,
        };
        log::debug!("Loaded tracker config from environment: {:?}", config);
        config
    }

    pub fn with_default_address(mut self, address: impl Into<String>) -> Self {
        self.default_address = Some(address.into());
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_dispose_behavior(mut self, dispose: DisposeBehavior) -> Self {
        self.dispose = dispose;
        self
    }
}

impl Configuration for TrackerConfig {
    fn default_tracker_address(&self) -> Option<String> {
        self.default_address.clone()
    }

    fn event_loop_thread_name(&self) -> String {
        self.thread_name.clone()
    }

    fn dispose_behavior(&self) -> DisposeBehavior {
        self.dispose
    }
}

/// Treat empty or whitespace-only addresses as absent.
pub(crate) fn non_empty(address: Option<String>) -> Option<String> {
    address
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn read_env_string(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool(" YES "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some("   ".into())), None);
        assert_eq!(
            non_empty(Some(" tet-tcp://10.0.0.1 ".into())),
            Some("tet-tcp://10.0.0.1".to_string())
        );
    }

    #[test]
    fn test_builder_and_trait_defaults() {
        let config = TrackerConfig::new()
            .with_default_address("tet-tcp://169.254.5.10")
            .with_dispose_behavior(DisposeBehavior::DISCONNECT);
        assert_eq!(
            config.default_tracker_address().as_deref(),
            Some("tet-tcp://169.254.5.10")
        );
        assert_eq!(config.event_loop_thread_name(), DEFAULT_EVENT_LOOP_THREAD);
        assert_eq!(config.dispose_behavior(), DisposeBehavior::DISCONNECT);
        assert_eq!(config.translate_native_code(0), None);
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("TOBII_TRACKER_URL", "tet-tcp://192.168.0.7");
        std::env::set_var("TOBII_INTERRUPT_ON_DISPOSE", "0");
        let config = TrackerConfig::from_env();
        std::env::remove_var("TOBII_TRACKER_URL");
        std::env::remove_var("TOBII_INTERRUPT_ON_DISPOSE");

        assert_eq!(config.default_address.as_deref(), Some("tet-tcp://192.168.0.7"));
        assert!(!config.dispose.contains(DisposeBehavior::INTERRUPT_LOOP));
        assert!(config.dispose.contains(DisposeBehavior::DISCONNECT));
    }
}
