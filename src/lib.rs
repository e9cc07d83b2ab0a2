//! # Radio to MQTT Bridge for Embedded Systems
//!
//! `myrtio-radio-bridge` connects a short-range packet radio (an nRF24L01
//! class transceiver) to an MQTT broker on a `no_std` microcontroller, built
//! upon the [Embassy](https://embassy.dev/) async ecosystem.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** Channels, topics and addresses are fixed-size
//!   `heapless` buffers sized at compile time.
//! - **Fully Async:** Workers are plain `async fn` loops meant to be spawned as
//!   Embassy tasks; every loop yields to the executor on each iteration.
//! - **Driver Agnostic:** The transceiver, the WiFi station and the MQTT client
//!   are reached through the [`RadioTransceiver`], [`NetworkInterface`] and
//!   [`PubSubClient`] traits.
//! - **Two Roles:** A device either receives radio frames and publishes them
//!   ([`Role::ReceiverPublisher`]), or subscribes to a topic and transmits what
//!   arrives ([`Role::SenderSubscriber`]).
//!
//! ## Architecture
//!
//! ```text
//!             uplink MessageBuffer
//!  Receiver ───────────────────────▶ Publisher ──▶ broker
//!
//!             downlink MessageBuffer
//!  Sender   ◀─────────────────────── Subscriber ◀── broker
//! ```
//!
//! Startup runs in order: [`bridge::bring_up`] attaches to the network,
//! [`bridge::broker_address`] turns a `.local` broker host into an address,
//! the MQTT client connects, and [`BridgeChannels::assemble`] hands the
//! channel ends to the two workers of the configured role.
//!
//! ## Logging
//!
//! Enable exactly one of the `log`, `defmt` or `esp32-log` features to get
//! output; without any of them logging compiles away.

#![cfg_attr(not(test), no_std)]

// Declared first so the logging macros are visible to every module.
mod fmt;

pub mod attach;
pub mod bridge;
pub mod buffer;
pub mod config;
pub mod error;
pub mod pubsub;
pub mod radio;
pub mod resolve;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-export key types for easier access at the crate root.
pub use attach::{Attached, NetEvent, NetworkInterface, attach};
pub use bridge::{BridgeChannels, LinkMode, NetworkSide, RadioSide};
pub use buffer::{BridgeBuffer, Consumer, MessageBuffer, Producer};
pub use config::{AttachPolicy, BridgeConfig, RadioSettings, Role, Timing, WifiCredentials};
pub use error::{
    AssembleError, AttachError, ForwardError, NetworkWorkerError, RadioError, RadioWorkerError,
    ResolveError,
};
pub use pubsub::{MessageHandler, PubSubClient};
pub use radio::RadioTransceiver;
pub use resolve::{DnsResolver, HostResolver, HostText, resolve, rewrite_if_local_suffix};
pub use worker::{LinkStats, NetworkWorker, RadioWorker, run_network_side, run_radio_side};
