//! # Error Types
//!
//! Each side of the bridge has its own error enum. None of them are boxed or
//! type-erased: the generic variants carry the collaborator's own error type
//! so callers can match on it.

/// Why the network attach did not reach an addressed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttachError<E> {
    /// The interface kept disconnecting and the retry limit was used up.
    /// `attempts` counts every connection attempt, the first one included.
    RetriesExhausted { attempts: u8 },
    /// An event arrived that has no transition from the current state.
    UnexpectedEvent,
    /// The interface driver refused to start or to issue a connection attempt.
    Interface(E),
}

/// Outcome of a failed name lookup.
///
/// `NotFound` and `Query` call for different recovery: the first usually
/// means the service is not advertised yet, the second that the network
/// path itself is broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResolveError {
    /// The directory answered, but has no record for the name.
    NotFound,
    /// No answer arrived before the deadline.
    Timeout,
    /// The query could not be issued or the answer was unusable.
    Query,
}

/// Terminal conditions of a radio-side worker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioWorkerError {
    /// The transceiver rejected its initial configuration.
    Misconfigured,
    /// A received frame did not fit into the uplink buffer in time.
    UplinkFull { len: usize, sent: usize },
}

/// A downlink message that could not be handed to the radio side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ForwardError {
    /// The downlink buffer stayed full for the whole send timeout.
    DownlinkFull,
    /// The payload is longer than one radio item.
    TooLarge { len: usize },
}

/// Terminal conditions of a network-side worker run.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetworkWorkerError<E> {
    /// The pub/sub client failed to subscribe or lost its connection.
    Client(E),
}

impl<E> From<E> for NetworkWorkerError<E> {
    fn from(err: E) -> Self {
        NetworkWorkerError::Client(err)
    }
}

/// The configuration does not fit the channels it is assembled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AssembleError {
    /// `BridgeConfig::item_size` differs from the item size the channels
    /// were created with.
    ItemSizeMismatch { configured: usize, channels: usize },
}

/// Errors reported by a transceiver driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// The chip did not answer on the bus, or the register read-back differed.
    NotPresent,
    /// A setting is outside the range the chip supports.
    InvalidSetting,
}
