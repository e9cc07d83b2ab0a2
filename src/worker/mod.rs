//! Bridge workers.
//!
//! A device runs exactly one radio-side worker and one network-side worker,
//! each as its own long-lived task:
//!
//! ```text
//!  Receiver ──uplink──▶ Publisher        (Role::ReceiverPublisher)
//!  Sender   ◀─downlink── Subscriber      (Role::SenderSubscriber)
//! ```
//!
//! Every worker loop suspends at least once per iteration so the executor
//! can service the other task and the network stack.
//!
//! The two directions treat a full buffer differently. A radio frame that
//! cannot be queued ends the receiver run, because silently dropping sensor
//! data is worse than a restart. A broker message that cannot be queued is
//! dropped with a warning, because downlink traffic can be repeated by
//! whoever sent it.

use core::convert::Infallible;

use embassy_time::{Duration, Timer};

use crate::error::{NetworkWorkerError, RadioWorkerError};
use crate::fmt::error;

pub mod network;
pub mod radio;

pub use network::{DownlinkForwarder, Publisher, Subscriber};
pub use radio::{Receiver, Sender};

/// Counters kept by every worker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    /// Messages passed on to the other side.
    pub forwarded: u32,
    /// Messages that could not be queued.
    pub dropped: u32,
    /// Messages the collaborator (radio or client) failed to deliver.
    pub failed: u32,
}

/// The worker that owns the transceiver.
#[allow(async_fn_in_trait)]
pub trait RadioWorker {
    /// Runs the worker loop. Only returns on a terminal condition.
    async fn run(&mut self) -> Result<Infallible, RadioWorkerError>;

    fn stats(&self) -> LinkStats;
}

/// The worker that owns the pub/sub client.
#[allow(async_fn_in_trait)]
pub trait NetworkWorker {
    type Error: core::fmt::Debug;

    /// Runs the worker loop. Only returns on a terminal condition.
    async fn run(&mut self) -> Result<Infallible, NetworkWorkerError<Self::Error>>;

    fn stats(&self) -> LinkStats;
}

/// Task body for a radio-side worker.
///
/// A misconfigured transceiver parks the task for good; carrying on would
/// only put garbage on the air. Any other terminal condition is returned so
/// the firmware can restart the worker.
pub async fn run_radio_side<W: RadioWorker>(worker: &mut W) -> RadioWorkerError {
    let Err(e) = worker.run().await;
    match e {
        RadioWorkerError::Misconfigured => {
            error!("radio worker halted: transceiver not configured");
            park().await
        }
        RadioWorkerError::UplinkFull { len, sent } => {
            error!(
                "radio worker stopped: uplink took {} of {} bytes, restart required",
                sent,
                len
            );
            e
        }
    }
}

/// Task body for a network-side worker.
pub async fn run_network_side<W: NetworkWorker>(worker: &mut W) -> NetworkWorkerError<W::Error> {
    let Err(e) = worker.run().await;
    error!("network worker stopped: client error");
    e
}

async fn park() -> ! {
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}
