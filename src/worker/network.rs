//! Network-side workers.

use core::convert::Infallible;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Timer};
use heapless::String;

use super::{LinkStats, NetworkWorker};
use crate::buffer::{Consumer, Producer};
use crate::config::{MAX_ITEM_SIZE, MAX_TOPIC_LEN, Timing};
use crate::error::{ForwardError, NetworkWorkerError};
use crate::fmt::{debug, info, trace, warn};
use crate::pubsub::{MessageHandler, PubSubClient};

/// Publishes every uplink message on a fixed topic.
pub struct Publisher<'a, C, M: RawMutex, const CAPACITY: usize> {
    client: C,
    uplink: Consumer<'a, M, CAPACITY>,
    topic: String<MAX_TOPIC_LEN>,
    poll_interval: Duration,
    stats: LinkStats,
}

impl<'a, C, M, const CAPACITY: usize> Publisher<'a, C, M, CAPACITY>
where
    C: PubSubClient,
    M: RawMutex,
{
    pub fn new(
        client: C,
        uplink: Consumer<'a, M, CAPACITY>,
        topic: String<MAX_TOPIC_LEN>,
        timing: &Timing,
    ) -> Self {
        Self {
            client,
            uplink,
            topic,
            poll_interval: timing.poll_interval,
            stats: LinkStats::default(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C, M, const CAPACITY: usize> NetworkWorker for Publisher<'_, C, M, CAPACITY>
where
    C: PubSubClient,
    M: RawMutex,
{
    type Error = C::Error;

    async fn run(&mut self) -> Result<Infallible, NetworkWorkerError<C::Error>> {
        info!("publisher start, topic {}", self.topic.as_str());
        // Longer uplink messages are discarded by `receive`.
        let mut payload = [0u8; MAX_ITEM_SIZE];
        loop {
            let len = self.uplink.receive(&mut payload).await;
            if len == 0 {
                Timer::after(self.poll_interval).await;
                continue;
            }
            trace!("uplink delivered {} bytes", len);

            match self.client.publish(&self.topic, &payload[..len]).await {
                Ok(()) => self.stats.forwarded += 1,
                Err(_) => {
                    // The frame is gone; the client handles reconnects.
                    self.stats.failed += 1;
                    warn!("publish of {} bytes failed", len);
                }
            }
        }
    }

    fn stats(&self) -> LinkStats {
        self.stats
    }
}

/// Moves broker messages on one topic into the downlink.
///
/// Used as the [`MessageHandler`] of a [`Subscriber`], but can be driven
/// directly through [`forward`](Self::forward).
pub struct DownlinkForwarder<'a, M: RawMutex, const CAPACITY: usize> {
    downlink: Producer<'a, M, CAPACITY>,
    topic: String<MAX_TOPIC_LEN>,
    timeout: Duration,
    stats: LinkStats,
}

impl<'a, M: RawMutex, const CAPACITY: usize> DownlinkForwarder<'a, M, CAPACITY> {
    pub fn new(
        downlink: Producer<'a, M, CAPACITY>,
        topic: String<MAX_TOPIC_LEN>,
        timeout: Duration,
    ) -> Self {
        Self {
            downlink,
            topic,
            timeout,
            stats: LinkStats::default(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Queues `payload` for the radio, or drops it.
    ///
    /// A drop is logged, counted and returned; it never stops the caller.
    pub async fn forward(&mut self, payload: &[u8]) -> Result<(), ForwardError> {
        if payload.len() > self.downlink.item_size() {
            self.stats.dropped += 1;
            warn!(
                "dropping {} byte message, radio item is {} bytes",
                payload.len(),
                self.downlink.item_size()
            );
            return Err(ForwardError::TooLarge { len: payload.len() });
        }

        let sent = self.downlink.try_send(payload, self.timeout).await;
        if sent != payload.len() {
            self.stats.dropped += 1;
            warn!(
                "downlink full, dropping {} byte message (space {})",
                payload.len(),
                self.downlink.available_space()
            );
            return Err(ForwardError::DownlinkFull);
        }
        self.stats.forwarded += 1;
        Ok(())
    }
}

impl<M: RawMutex, const CAPACITY: usize> MessageHandler for DownlinkForwarder<'_, M, CAPACITY> {
    async fn on_message(&mut self, topic: &str, payload: &[u8]) {
        if topic != self.topic.as_str() {
            debug!("ignoring message on {}", topic);
            return;
        }
        // Drops are already logged and counted by `forward`.
        let _ = self.forward(payload).await;
    }
}

/// Subscribes to the downlink topic and forwards what arrives.
pub struct Subscriber<'a, C, M: RawMutex, const CAPACITY: usize> {
    client: C,
    forwarder: DownlinkForwarder<'a, M, CAPACITY>,
}

impl<'a, C, M, const CAPACITY: usize> Subscriber<'a, C, M, CAPACITY>
where
    C: PubSubClient,
    M: RawMutex,
{
    pub fn new(
        client: C,
        downlink: Producer<'a, M, CAPACITY>,
        topic: String<MAX_TOPIC_LEN>,
        timing: &Timing,
    ) -> Self {
        Self {
            client,
            forwarder: DownlinkForwarder::new(downlink, topic, timing.downlink_send_timeout),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C, M, const CAPACITY: usize> NetworkWorker for Subscriber<'_, C, M, CAPACITY>
where
    C: PubSubClient,
    M: RawMutex,
{
    type Error = C::Error;

    async fn run(&mut self) -> Result<Infallible, NetworkWorkerError<C::Error>> {
        info!("subscriber start, topic {}", self.forwarder.topic());
        self.client.subscribe(self.forwarder.topic()).await?;
        loop {
            self.client.poll(&mut self.forwarder).await?;
        }
    }

    fn stats(&self) -> LinkStats {
        self.forwarder.stats()
    }
}
