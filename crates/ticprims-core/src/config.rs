//! Orchestrator and device stream settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use ticprims_frame::{ModeSelection, ReaderConfig};
use ticprims_transport::SerialSettings;

/// Default period between two hot-plug scans.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default time allowed for one frame to arrive.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Default pause after a failed read cycle before the next attempt.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);
/// Default wait for [`TicCore::read_next_frame`](crate::TicCore::read_next_frame).
pub const DEFAULT_READ_NEXT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by the orchestrator and every device stream.
///
/// Durations are (de)serialized as milliseconds. A `read_timeout_ms` of
/// `0` or `null` waits forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Protocol variant to expect, or auto-detection.
    pub mode: ModeSelection,
    /// Period between two scans for plugged and unplugged modems.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    /// Time allowed for one frame before the stream reports a timeout.
    #[serde(rename = "read_timeout_ms", with = "optional_millis")]
    pub read_timeout: Option<Duration>,
    /// Pause between a failed read cycle and the next one.
    #[serde(rename = "retry_interval_ms", with = "millis")]
    pub retry_interval: Duration,
    /// Wait used by `read_next_frame` when the caller gives none.
    #[serde(rename = "read_next_timeout_ms", with = "millis")]
    pub read_next_timeout: Duration,
    /// Force a line speed instead of the mode's own.
    pub baud_rate: Option<u32>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            mode: ModeSelection::Auto,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            read_next_timeout: DEFAULT_READ_NEXT_TIMEOUT,
            baud_rate: None,
        }
    }
}

impl CoreConfig {
    pub fn with_mode(mut self, mode: ModeSelection) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// `None` waits forever.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_read_next_timeout(mut self, timeout: Duration) -> Self {
        self.read_next_timeout = timeout;
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    /// Line settings a new transport is opened with.
    pub fn serial_settings(&self) -> SerialSettings {
        match (self.baud_rate, self.mode.fixed()) {
            (Some(baud_rate), _) => SerialSettings::new(baud_rate),
            (None, Some(mode)) => SerialSettings::new(mode.baud_rate()),
            (None, None) => SerialSettings::historic(),
        }
    }

    pub(crate) fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            read_timeout: self.read_timeout,
            ..ReaderConfig::default()
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_u64(duration.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.filter(|ms| *ms > 0).map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.mode, ModeSelection::Auto);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.retry_interval, DEFAULT_RETRY_INTERVAL);
        assert_eq!(config.serial_settings().baud_rate, 1200);
    }

    #[test]
    fn serial_settings_follow_mode_and_override() {
        let standard = CoreConfig::default().with_mode(ModeSelection::Standard);
        assert_eq!(standard.serial_settings().baud_rate, 9600);
        assert_eq!(standard.with_baud_rate(19200).serial_settings().baud_rate, 19200);
    }

    #[test]
    fn zero_read_timeout_waits_forever() {
        let config = CoreConfig::default().with_read_timeout(Some(Duration::ZERO));
        assert_eq!(config.read_timeout, None);
    }

    #[test]
    fn deserialize_millis_fields() {
        let config: CoreConfig = serde_json::from_str(
            r#"{"mode": "standard", "poll_interval_ms": 250, "read_timeout_ms": 0, "retry_interval_ms": 75}"#,
        )
        .expect("config should parse");
        assert_eq!(config.mode, ModeSelection::Standard);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.retry_interval, Duration::from_millis(75));
        assert_eq!(config.read_next_timeout, DEFAULT_READ_NEXT_TIMEOUT);
    }

    #[test]
    fn serialize_round_trips() {
        let config = CoreConfig::default().with_poll_interval(Duration::from_millis(40));
        let json = serde_json::to_string(&config).expect("serialize");
        assert!(json.contains("\"poll_interval_ms\":40"));
        let back: CoreConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, config);
    }
}
