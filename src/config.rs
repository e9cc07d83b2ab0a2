//! # Bridge Configuration
//!
//! Everything the firmware decides at build or provisioning time lives in
//! [`BridgeConfig`]. The defaults match a stock nRF24 setup talking to a
//! broker announced on the local network.

use embassy_time::Duration;
use heapless::String;

/// Longest topic accepted by the configuration.
pub const MAX_TOPIC_LEN: usize = 64;

/// Longest broker URI accepted by the configuration.
pub const MAX_URI_LEN: usize = 128;

/// Largest radio frame. No channel item may be longer.
pub const MAX_ITEM_SIZE: usize = 32;

/// Default item size of a channel: one full radio frame.
pub const DEFAULT_ITEM_SIZE: usize = MAX_ITEM_SIZE;

/// Default capacity in bytes of each bridge channel.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default number of reconnects before the attach gives up.
pub const DEFAULT_MAX_RETRIES: u8 = 5;

/// Which pair of workers this device runs.
///
/// The two roles are mutually exclusive: a device either listens on the radio
/// and publishes what it hears, or subscribes and transmits what it is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Radio receiver feeding an MQTT publisher (uplink).
    ReceiverPublisher,
    /// MQTT subscriber feeding a radio sender (downlink).
    SenderSubscriber,
}

/// What to do when the network attach fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttachPolicy {
    /// Abort startup.
    Abort,
    /// Keep the radio side running without a broker.
    Offline,
}

/// Minimum security the station accepts from an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuthMode {
    Open,
    Wpa2Personal,
    Wpa3Personal,
}

/// Station credentials handed to the interface on start.
#[derive(Debug, Clone)]
pub struct WifiCredentials {
    pub ssid: String<32>,
    pub password: String<64>,
    pub auth_threshold: AuthMode,
    /// Radio power saving adds latency to every broker round-trip, so the
    /// bridge keeps it off unless asked otherwise.
    pub power_save: bool,
}

impl WifiCredentials {
    /// Returns `None` if either string exceeds its limit.
    pub fn new(ssid: &str, password: &str) -> Option<Self> {
        Some(Self {
            ssid: String::try_from(ssid).ok()?,
            password: String::try_from(password).ok()?,
            auth_threshold: AuthMode::Wpa2Personal,
            power_save: false,
        })
    }
}

/// On-air data rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataRate {
    Kbps250,
    Mbps1,
    Mbps2,
}

/// Transceiver settings applied once when a radio worker starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioSettings {
    pub channel: u8,
    pub payload_size: u8,
    /// Own address for a receiver, destination address for a sender.
    pub address: [u8; 5],
    pub data_rate: Option<DataRate>,
    /// Auto-retransmit delay step (0..=15, 250 µs each).
    pub retransmit_delay: Option<u8>,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            channel: 90,
            payload_size: DEFAULT_ITEM_SIZE as u8,
            address: *b"FGHIJ",
            data_rate: None,
            retransmit_delay: None,
        }
    }
}

/// Timeouts and intervals used by the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Sleep between two radio polls.
    pub poll_interval: Duration,
    /// How long the receiver waits for uplink space.
    pub uplink_send_timeout: Duration,
    /// How long the subscriber waits for downlink space.
    pub downlink_send_timeout: Duration,
    /// How long the sender waits for the transmit-complete flag.
    pub transmit_timeout: Duration,
    /// Deadline for a single name lookup.
    pub resolve_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            uplink_send_timeout: Duration::from_millis(100),
            downlink_send_timeout: Duration::from_millis(100),
            transmit_timeout: Duration::from_millis(1000),
            resolve_timeout: Duration::from_millis(10_000),
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub role: Role,
    pub max_retries: u8,
    pub attach_policy: AttachPolicy,
    pub item_size: usize,
    pub uplink_topic: String<MAX_TOPIC_LEN>,
    pub downlink_topic: String<MAX_TOPIC_LEN>,
    /// May name the broker as `<host>.local`; see [`crate::resolve`].
    pub broker_uri: String<MAX_URI_LEN>,
    pub radio: RadioSettings,
    pub timing: Timing,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            role: Role::ReceiverPublisher,
            max_retries: DEFAULT_MAX_RETRIES,
            attach_policy: AttachPolicy::Abort,
            item_size: DEFAULT_ITEM_SIZE,
            uplink_topic: topic("radio/uplink"),
            downlink_topic: topic("radio/downlink"),
            broker_uri: String::try_from("mqtt://broker.local:1883").unwrap_or_default(),
            radio: RadioSettings::default(),
            timing: Timing::default(),
        }
    }
}

fn topic(s: &str) -> String<MAX_TOPIC_LEN> {
    String::try_from(s).unwrap_or_default()
}

impl BridgeConfig {
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_attach_policy(mut self, policy: AttachPolicy) -> Self {
        self.attach_policy = policy;
        self
    }

    /// Clamped to `1..=MAX_ITEM_SIZE`; a channel item never carries more
    /// than one frame.
    pub fn with_item_size(mut self, item_size: usize) -> Self {
        self.item_size = item_size.clamp(1, MAX_ITEM_SIZE);
        self
    }

    /// Returns `None` if a topic is longer than [`MAX_TOPIC_LEN`].
    pub fn with_topics(mut self, uplink: &str, downlink: &str) -> Option<Self> {
        self.uplink_topic = String::try_from(uplink).ok()?;
        self.downlink_topic = String::try_from(downlink).ok()?;
        Some(self)
    }

    /// Returns `None` if the URI is longer than [`MAX_URI_LEN`].
    pub fn with_broker_uri(mut self, uri: &str) -> Option<Self> {
        self.broker_uri = String::try_from(uri).ok()?;
        Some(self)
    }

    pub fn with_radio(mut self, radio: RadioSettings) -> Self {
        self.radio = radio;
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }
}
