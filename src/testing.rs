//! Scripted collaborators shared by the unit tests.

use core::cell::RefCell;
use std::collections::VecDeque;
use std::string::{String, ToString};
use std::vec::Vec;

use embassy_time::Duration;

use crate::config::{DataRate, Timing};
use crate::error::RadioError;
use crate::pubsub::{MessageHandler, PubSubClient};
use crate::radio::RadioTransceiver;

/// Timing with short waits so failing paths finish quickly.
pub fn fast_timing() -> Timing {
    Timing {
        poll_interval: Duration::from_millis(1),
        uplink_send_timeout: Duration::from_millis(5),
        downlink_send_timeout: Duration::from_millis(5),
        transmit_timeout: Duration::from_millis(5),
        resolve_timeout: Duration::from_millis(50),
    }
}

/// A transceiver that plays back a script of receive polls and records
/// everything it is asked to transmit.
pub struct StubRadio<'a> {
    /// One entry per poll: `Some(frame)` is a ready frame, `None` a poll
    /// that finds nothing.
    frames: VecDeque<Option<Vec<u8>>>,
    acks: VecDeque<bool>,
    transmitted: &'a RefCell<Vec<Vec<u8>>>,
    present: bool,
    pub channel: Option<u8>,
    pub receive_address: Option<[u8; 5]>,
    pub transmit_address: Option<[u8; 5]>,
    pub data_rate: Option<DataRate>,
}

impl<'a> StubRadio<'a> {
    pub fn new(transmitted: &'a RefCell<Vec<Vec<u8>>>) -> Self {
        Self {
            frames: VecDeque::new(),
            acks: VecDeque::new(),
            transmitted,
            present: true,
            channel: None,
            receive_address: None,
            transmit_address: None,
            data_rate: None,
        }
    }

    pub fn with_frames(mut self, frames: impl IntoIterator<Item = Option<Vec<u8>>>) -> Self {
        self.frames.extend(frames);
        self
    }

    /// Outcomes of successive transmissions; once used up, every
    /// transmission succeeds.
    pub fn with_acks(mut self, acks: impl IntoIterator<Item = bool>) -> Self {
        self.acks.extend(acks);
        self
    }

    /// Behaves as if no chip answers on the bus.
    pub fn without_chip(mut self) -> Self {
        self.present = false;
        self
    }

    fn check(&self) -> Result<(), RadioError> {
        if self.present {
            Ok(())
        } else {
            Err(RadioError::NotPresent)
        }
    }
}

impl RadioTransceiver for StubRadio<'_> {
    async fn configure(&mut self, channel: u8, _payload_size: u8) -> Result<(), RadioError> {
        self.channel = Some(channel);
        Ok(())
    }

    async fn set_receive_address(&mut self, address: &[u8; 5]) -> Result<(), RadioError> {
        self.check()?;
        self.receive_address = Some(*address);
        Ok(())
    }

    async fn set_transmit_address(&mut self, address: &[u8; 5]) -> Result<(), RadioError> {
        self.check()?;
        self.transmit_address = Some(*address);
        Ok(())
    }

    async fn set_data_rate(&mut self, rate: DataRate) -> Result<(), RadioError> {
        self.data_rate = Some(rate);
        Ok(())
    }

    async fn set_retransmit_delay(&mut self, delay: u8) -> Result<(), RadioError> {
        if delay > 15 {
            return Err(RadioError::InvalidSetting);
        }
        Ok(())
    }

    async fn ready_to_receive(&mut self) -> bool {
        match self.frames.front() {
            Some(Some(_)) => true,
            Some(None) => {
                self.frames.pop_front();
                false
            }
            None => false,
        }
    }

    async fn receive(&mut self, buf: &mut [u8]) -> usize {
        match self.frames.pop_front() {
            Some(Some(frame)) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                len
            }
            _ => 0,
        }
    }

    async fn send(&mut self, payload: &[u8]) {
        self.transmitted.borrow_mut().push(payload.to_vec());
    }

    async fn send_completed(&mut self, _timeout: Duration) -> bool {
        self.acks.pop_front().unwrap_or(true)
    }
}

/// A pub/sub client that records publishes and plays back a script of
/// incoming messages. When the script runs out, `poll` reports the
/// connection as closed.
pub struct StubClient<'a> {
    published: &'a RefCell<Vec<(String, Vec<u8>)>>,
    incoming: VecDeque<(&'static str, Vec<u8>)>,
    pub subscriptions: Vec<String>,
    failing_publishes: usize,
}

impl<'a> StubClient<'a> {
    pub fn new(published: &'a RefCell<Vec<(String, Vec<u8>)>>) -> Self {
        Self {
            published,
            incoming: VecDeque::new(),
            subscriptions: Vec::new(),
            failing_publishes: 0,
        }
    }

    pub fn with_incoming(
        mut self,
        messages: impl IntoIterator<Item = (&'static str, Vec<u8>)>,
    ) -> Self {
        self.incoming.extend(messages);
        self
    }

    /// The next `n` publishes fail.
    pub fn failing_publishes(mut self, n: usize) -> Self {
        self.failing_publishes = n;
        self
    }
}

impl PubSubClient for StubClient<'_> {
    type Error = &'static str;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error> {
        if self.failing_publishes > 0 {
            self.failing_publishes -= 1;
            return Err("publish failed");
        }
        self.published
            .borrow_mut()
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn poll<H: MessageHandler>(&mut self, handler: &mut H) -> Result<(), Self::Error> {
        match self.incoming.pop_front() {
            Some((topic, payload)) => {
                handler.on_message(topic, &payload).await;
                Ok(())
            }
            None => Err("connection closed"),
        }
    }
}
