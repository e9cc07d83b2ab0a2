//! # Network Attach
//!
//! Brings the station interface to an addressed state with a bounded number
//! of reconnects.
//!
//! The logic is split in two:
//!
//! - [`AttachMachine`] is a plain state machine. It consumes [`NetEvent`]s and
//!   tells the caller what to do next, without touching any hardware.
//! - [`attach`] drives a [`NetworkInterface`] with it and suspends the calling
//!   task until the machine reaches [`AttachState::Attached`] or
//!   [`AttachState::Failed`].
//!
//! ```text
//!          start()                 AddressAcquired
//!  Idle ───────────▶ Connecting ───────────────────▶ Attached
//!                     │      ▲
//!       Disconnected  │      │ retries < max
//!                     └──────┘
//!                     │
//!                     │ retries >= max, or anything unexpected
//!                     ▼
//!                   Failed
//! ```

use embassy_net::Ipv4Address;

use crate::config::WifiCredentials;
use crate::error::AttachError;
use crate::fmt::{error, info, warn};

/// Where the attach procedure currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttachState {
    Idle,
    Connecting,
    Attached,
    Failed,
}

/// Events reported by the station interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetEvent {
    /// The association dropped or a connection attempt failed.
    Disconnected,
    /// DHCP (or static configuration) assigned an address.
    AddressAcquired(Ipv4Address),
    /// Anything else the driver chose to forward. The attach procedure has
    /// no transition for these and fails on them.
    Other(u16),
}

/// What the driver of an [`AttachMachine`] has to do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Issue a (new) connection attempt, then wait for the next event.
    Connect,
    /// Nothing to do but wait for the next event.
    Wait,
    /// Terminal: the interface holds an address.
    Attached(Ipv4Address),
    /// Terminal: give up.
    Failed(Failure),
}

/// Why the machine went to [`AttachState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    RetriesExhausted { attempts: u8 },
    UnexpectedEvent,
}

/// The attach state machine.
#[derive(Debug, Clone)]
pub struct AttachMachine {
    state: AttachState,
    retries: u8,
    max_retries: u8,
}

impl AttachMachine {
    pub const fn new(max_retries: u8) -> Self {
        Self {
            state: AttachState::Idle,
            retries: 0,
            max_retries,
        }
    }

    pub fn state(&self) -> AttachState {
        self.state
    }

    /// Reconnects issued so far in the current attach.
    pub fn retries(&self) -> u8 {
        self.retries
    }

    /// Idle → Connecting. Calling it in any other state is a driver bug and
    /// fails the attach.
    pub fn start(&mut self) -> Step {
        match self.state {
            AttachState::Idle => {
                self.state = AttachState::Connecting;
                Step::Connect
            }
            _ => self.fail(Failure::UnexpectedEvent),
        }
    }

    /// Feeds one interface event into the machine.
    pub fn on_event(&mut self, event: NetEvent) -> Step {
        match (self.state, event) {
            (AttachState::Connecting, NetEvent::Disconnected) => {
                if self.retries < self.max_retries {
                    self.retries += 1;
                    Step::Connect
                } else {
                    self.fail(Failure::RetriesExhausted {
                        attempts: self.retries.saturating_add(1),
                    })
                }
            }
            (AttachState::Connecting, NetEvent::AddressAcquired(ip)) => {
                self.state = AttachState::Attached;
                self.retries = 0;
                Step::Attached(ip)
            }
            _ => self.fail(Failure::UnexpectedEvent),
        }
    }

    /// Forces the machine into [`AttachState::Failed`], e.g. when the driver
    /// itself reports an error.
    pub fn abort(&mut self) {
        self.state = AttachState::Failed;
    }

    fn fail(&mut self, failure: Failure) -> Step {
        self.state = AttachState::Failed;
        Step::Failed(failure)
    }
}

/// Successful attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attached {
    pub address: Ipv4Address,
    /// Reconnects it took to get there.
    pub retries: u8,
}

/// The station interface as seen by the attach procedure.
///
/// Implementations wrap the vendor WiFi driver and translate its event
/// callbacks into [`NetEvent`]s.
#[allow(async_fn_in_trait)]
pub trait NetworkInterface {
    type Error: core::fmt::Debug;

    /// Applies the credentials and brings the interface up, subscribing to
    /// its events.
    async fn start(&mut self, credentials: &WifiCredentials) -> Result<(), Self::Error>;

    /// Issues one connection attempt. Its outcome arrives as an event.
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Waits for the next event.
    async fn next_event(&mut self) -> NetEvent;

    /// Drops the event subscription. After this returns, no event may reach
    /// the attach procedure any more.
    fn release_events(&mut self);
}

/// Attaches `interface` to the network described by `credentials`.
///
/// Suspends until the interface holds an address or the attempt failed.
/// In both cases the event subscription is released before returning.
pub async fn attach<I: NetworkInterface>(
    interface: &mut I,
    credentials: &WifiCredentials,
    max_retries: u8,
) -> Result<Attached, AttachError<I::Error>> {
    let mut machine = AttachMachine::new(max_retries);
    let outcome = drive(&mut machine, interface, credentials).await;
    interface.release_events();

    match &outcome {
        Ok(attached) => {
            let o = attached.address.octets();
            info!(
                "attached as {}.{}.{}.{} after {} retries",
                o[0],
                o[1],
                o[2],
                o[3],
                attached.retries
            );
        }
        Err(AttachError::RetriesExhausted { attempts }) => {
            error!("failed to attach after {} attempts", attempts);
        }
        Err(AttachError::UnexpectedEvent) => error!("attach aborted on unexpected event"),
        Err(AttachError::Interface(_)) => error!("attach aborted by interface error"),
    }
    outcome
}

async fn drive<I: NetworkInterface>(
    machine: &mut AttachMachine,
    interface: &mut I,
    credentials: &WifiCredentials,
) -> Result<Attached, AttachError<I::Error>> {
    if let Err(e) = interface.start(credentials).await {
        machine.abort();
        return Err(AttachError::Interface(e));
    }

    let mut step = machine.start();
    let mut retries_used = 0;
    loop {
        match step {
            Step::Connect => {
                if machine.retries() > 0 {
                    warn!("disconnected, retry {} of {}", machine.retries(), machine.max_retries);
                }
                if let Err(e) = interface.connect().await {
                    machine.abort();
                    return Err(AttachError::Interface(e));
                }
                step = Step::Wait;
            }
            Step::Wait => {
                let event = interface.next_event().await;
                retries_used = machine.retries();
                step = machine.on_event(event);
            }
            Step::Attached(address) => {
                return Ok(Attached {
                    address,
                    retries: retries_used,
                });
            }
            Step::Failed(Failure::RetriesExhausted { attempts }) => {
                return Err(AttachError::RetriesExhausted { attempts });
            }
            Step::Failed(Failure::UnexpectedEvent) => {
                return Err(AttachError::UnexpectedEvent);
            }
        }
    }
}
