//! Radio-side workers.

use core::convert::Infallible;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Timer;

use super::{LinkStats, RadioWorker};
use crate::buffer::{Consumer, Producer};
use crate::config::{MAX_ITEM_SIZE, RadioSettings, Timing};
use crate::error::RadioWorkerError;
use crate::fmt::{debug, error, info, trace, warn};
use crate::radio::{Direction, RadioTransceiver, apply_settings};

/// Listens on the radio and queues every frame on the uplink.
pub struct Receiver<'a, R, M: RawMutex, const CAPACITY: usize> {
    radio: R,
    uplink: Producer<'a, M, CAPACITY>,
    settings: RadioSettings,
    timing: Timing,
    stats: LinkStats,
    stale: u32,
}

impl<'a, R, M, const CAPACITY: usize> Receiver<'a, R, M, CAPACITY>
where
    R: RadioTransceiver,
    M: RawMutex,
{
    pub fn new(
        radio: R,
        uplink: Producer<'a, M, CAPACITY>,
        settings: RadioSettings,
        timing: Timing,
    ) -> Self {
        Self {
            radio,
            uplink,
            settings,
            timing,
            stats: LinkStats::default(),
            stale: 0,
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Frames discarded at start because they were left over from an
    /// earlier session.
    pub fn stale_frames(&self) -> u32 {
        self.stale
    }

    async fn drain_stale(&mut self, frame: &mut [u8]) {
        while self.radio.ready_to_receive().await {
            self.radio.receive(frame).await;
            self.stale += 1;
        }
        if self.stale > 0 {
            info!("discarded {} stale frames", self.stale);
        }
    }
}

impl<R, M, const CAPACITY: usize> RadioWorker for Receiver<'_, R, M, CAPACITY>
where
    R: RadioTransceiver,
    M: RawMutex,
{
    async fn run(&mut self) -> Result<Infallible, RadioWorkerError> {
        info!("receiver start");
        if apply_settings(&mut self.radio, &self.settings, Direction::Receive)
            .await
            .is_err()
        {
            error!("transceiver did not accept its configuration");
            return Err(RadioWorkerError::Misconfigured);
        }

        let mut frame = [0u8; MAX_ITEM_SIZE];
        self.drain_stale(&mut frame).await;
        // Frames are read no longer than the uplink accepts.
        let item = self.uplink.item_size().min(MAX_ITEM_SIZE);

        loop {
            if self.radio.ready_to_receive().await {
                let len = self.radio.receive(&mut frame[..item]).await.min(item);
                trace!("rx {} bytes", len);
                if len == 0 {
                    warn!("radio reported an empty frame, skipping");
                } else {
                    debug!("uplink space available: {}", self.uplink.available_space());
                    let sent = self
                        .uplink
                        .try_send(&frame[..len], self.timing.uplink_send_timeout)
                        .await;
                    if sent != len {
                        self.stats.dropped += 1;
                        error!("uplink send failed: len={} sent={}", len, sent);
                        return Err(RadioWorkerError::UplinkFull { len, sent });
                    }
                    self.stats.forwarded += 1;
                }
            }
            Timer::after(self.timing.poll_interval).await;
        }
    }

    fn stats(&self) -> LinkStats {
        self.stats
    }
}

/// Transmits every message taken from the downlink.
pub struct Sender<'a, R, M: RawMutex, const CAPACITY: usize> {
    radio: R,
    downlink: Consumer<'a, M, CAPACITY>,
    settings: RadioSettings,
    timing: Timing,
    stats: LinkStats,
}

impl<'a, R, M, const CAPACITY: usize> Sender<'a, R, M, CAPACITY>
where
    R: RadioTransceiver,
    M: RawMutex,
{
    pub fn new(
        radio: R,
        downlink: Consumer<'a, M, CAPACITY>,
        settings: RadioSettings,
        timing: Timing,
    ) -> Self {
        Self {
            radio,
            downlink,
            settings,
            timing,
            stats: LinkStats::default(),
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }
}

impl<R, M, const CAPACITY: usize> RadioWorker for Sender<'_, R, M, CAPACITY>
where
    R: RadioTransceiver,
    M: RawMutex,
{
    async fn run(&mut self) -> Result<Infallible, RadioWorkerError> {
        info!("sender start");
        if apply_settings(&mut self.radio, &self.settings, Direction::Transmit)
            .await
            .is_err()
        {
            error!("transceiver did not accept its configuration");
            return Err(RadioWorkerError::Misconfigured);
        }

        // Longer downlink messages are discarded by `receive`.
        let mut payload = [0u8; MAX_ITEM_SIZE];
        loop {
            let len = self.downlink.receive(&mut payload).await;
            if len == 0 {
                Timer::after(self.timing.poll_interval).await;
                continue;
            }
            debug!("downlink delivered {} bytes", len);

            self.radio.send(&payload[..len]).await;
            if self.radio.send_completed(self.timing.transmit_timeout).await {
                self.stats.forwarded += 1;
                debug!("send success");
            } else {
                // Retrying is up to whoever published the message.
                self.stats.failed += 1;
                warn!("send fail");
            }
        }
    }

    fn stats(&self) -> LinkStats {
        self.stats
    }
}
