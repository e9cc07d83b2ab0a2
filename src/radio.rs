//! # Radio Transceiver Abstraction
//!
//! The bridge does not talk to the radio chip itself. A driver implements
//! [`RadioTransceiver`] and the radio workers use nothing but this surface.

use embassy_time::Duration;

use crate::config::{DataRate, RadioSettings};
use crate::error::RadioError;
use crate::fmt::info;

/// A packet radio transceiver with fixed-size frames.
#[allow(async_fn_in_trait)]
pub trait RadioTransceiver {
    /// Sets RF channel and payload size.
    async fn configure(&mut self, channel: u8, payload_size: u8) -> Result<(), RadioError>;

    /// Sets the address this radio listens on.
    async fn set_receive_address(&mut self, address: &[u8; 5]) -> Result<(), RadioError>;

    /// Sets the address frames are transmitted to.
    async fn set_transmit_address(&mut self, address: &[u8; 5]) -> Result<(), RadioError>;

    async fn set_data_rate(&mut self, rate: DataRate) -> Result<(), RadioError>;

    async fn set_retransmit_delay(&mut self, delay: u8) -> Result<(), RadioError>;

    /// `true` when at least one received frame is waiting in the chip.
    async fn ready_to_receive(&mut self) -> bool;

    /// Pops one frame into `buf` and returns its length.
    async fn receive(&mut self, buf: &mut [u8]) -> usize;

    /// Starts transmitting `payload` as one frame.
    async fn send(&mut self, payload: &[u8]);

    /// Waits up to `timeout` for the last transmission to be acknowledged.
    async fn send_completed(&mut self, timeout: Duration) -> bool;
}

/// Which way a radio worker uses the configured address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Receive,
    Transmit,
}

/// Applies `settings` to `radio`: channel and payload size, the address for
/// `direction`, then the optional advanced settings.
pub(crate) async fn apply_settings<R: RadioTransceiver>(
    radio: &mut R,
    settings: &RadioSettings,
    direction: Direction,
) -> Result<(), RadioError> {
    radio
        .configure(settings.channel, settings.payload_size)
        .await?;
    match direction {
        Direction::Receive => radio.set_receive_address(&settings.address).await?,
        Direction::Transmit => radio.set_transmit_address(&settings.address).await?,
    }

    if let Some(rate) = settings.data_rate {
        let kbps: u16 = match rate {
            DataRate::Kbps250 => 250,
            DataRate::Mbps1 => 1000,
            DataRate::Mbps2 => 2000,
        };
        info!("set RF data rate to {} kbps", kbps);
        radio.set_data_rate(rate).await?;
    }
    if let Some(delay) = settings.retransmit_delay {
        info!("set retransmit delay to {}", delay);
        radio.set_retransmit_delay(delay).await?;
    }

    let address = core::str::from_utf8(&settings.address).unwrap_or("<binary>");
    info!(
        "radio ready: channel {} payload {} address {}",
        settings.channel,
        settings.payload_size,
        address
    );
    Ok(())
}
