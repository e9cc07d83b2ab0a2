//! # Bridge Assembly
//!
//! Creates the two channels once and hands their ends to the worker pair
//! selected by [`Role`]. Also holds the startup sequence that gates the
//! workers: attach, then find the broker.
//!
//! ```ignore
//! static CHANNELS: StaticCell<BridgeChannels<CriticalSectionRawMutex, 1024, 1024>> =
//!     StaticCell::new();
//!
//! let link = bring_up(&mut wifi, &credentials, &config).await?;
//! let broker = broker_address(&mut DnsResolver::with_suffix(stack, ".local"), &config).await;
//! // connect the MQTT client to `broker` ...
//!
//! let channels = CHANNELS.init(BridgeChannels::new(config.item_size));
//! let (radio_side, network_side) = channels.assemble(&config, radio, client)?;
//! spawner.spawn(radio_task(radio_side))?;
//! spawner.spawn(network_task(network_side))?;
//! ```

use core::convert::Infallible;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::attach::{Attached, NetworkInterface, attach};
use crate::buffer::MessageBuffer;
use crate::config::{AttachPolicy, BridgeConfig, MAX_ITEM_SIZE, Role, WifiCredentials};
use crate::error::{AssembleError, AttachError, NetworkWorkerError, RadioWorkerError};
use crate::fmt::{info, warn};
use crate::pubsub::PubSubClient;
use crate::radio::RadioTransceiver;
use crate::resolve::{HostResolver, ResolvedAddress, rewrite_if_local_suffix};
use crate::worker::{
    LinkStats, NetworkWorker, Publisher, RadioWorker, Receiver, Sender, Subscriber,
};

/// Network state after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Online(Attached),
    /// Attach failed and the policy allows running without a broker.
    Offline,
}

/// Attaches to the network and applies the configured [`AttachPolicy`].
pub async fn bring_up<I: NetworkInterface>(
    interface: &mut I,
    credentials: &WifiCredentials,
    config: &BridgeConfig,
) -> Result<LinkMode, AttachError<I::Error>> {
    match attach(interface, credentials, config.max_retries).await {
        Ok(attached) => Ok(LinkMode::Online(attached)),
        Err(e) => match config.attach_policy {
            AttachPolicy::Abort => Err(e),
            AttachPolicy::Offline => {
                warn!("network attach failed, continuing offline");
                Ok(LinkMode::Offline)
            }
        },
    }
}

/// The configured broker URI with a `.local` host replaced by its address.
///
/// Falls back to the configured text when the name cannot be resolved.
pub async fn broker_address<R: HostResolver>(
    resolver: &mut R,
    config: &BridgeConfig,
) -> ResolvedAddress {
    let text = rewrite_if_local_suffix(resolver, &config.broker_uri, config.timing.resolve_timeout)
        .await;
    let mut address = ResolvedAddress::new();
    // The configured URI and any rewrite of it share the same bound.
    let _ = address.push_str(text.as_str());
    address
}

/// The uplink and downlink channels of one bridge.
pub struct BridgeChannels<M: RawMutex, const UPLINK: usize, const DOWNLINK: usize> {
    uplink: MessageBuffer<M, UPLINK>,
    downlink: MessageBuffer<M, DOWNLINK>,
}

impl<M: RawMutex, const UPLINK: usize, const DOWNLINK: usize> BridgeChannels<M, UPLINK, DOWNLINK> {
    /// # Panics
    ///
    /// If `item_size` is zero or longer than one radio frame
    /// ([`MAX_ITEM_SIZE`]), or if an item does not fit either channel.
    pub const fn new(item_size: usize) -> Self {
        assert!(item_size <= MAX_ITEM_SIZE, "item size exceeds a radio frame");
        Self {
            uplink: MessageBuffer::new(item_size),
            downlink: MessageBuffer::new(item_size),
        }
    }

    pub fn item_size(&self) -> usize {
        self.uplink.item_size()
    }

    /// Builds the worker pair for `config.role`.
    ///
    /// Takes `&mut self`, so the channel ends can be handed out only once.
    /// Fails if `config.item_size` is not the item size of the channels.
    #[allow(clippy::type_complexity)]
    pub fn assemble<R, C>(
        &mut self,
        config: &BridgeConfig,
        radio: R,
        client: C,
    ) -> Result<
        (
            RadioSide<'_, R, M, UPLINK, DOWNLINK>,
            NetworkSide<'_, C, M, UPLINK, DOWNLINK>,
        ),
        AssembleError,
    >
    where
        R: RadioTransceiver,
        C: PubSubClient,
    {
        if config.item_size != self.item_size() {
            return Err(AssembleError::ItemSizeMismatch {
                configured: config.item_size,
                channels: self.item_size(),
            });
        }

        let (uplink_tx, uplink_rx) = self.uplink.split();
        let (downlink_tx, downlink_rx) = self.downlink.split();
        info!(
            "bridge channels: uplink {} bytes, downlink {} bytes, item {} bytes",
            UPLINK,
            DOWNLINK,
            config.item_size
        );

        let sides = match config.role {
            Role::ReceiverPublisher => (
                RadioSide::Receiver(Receiver::new(
                    radio,
                    uplink_tx,
                    config.radio.clone(),
                    config.timing,
                )),
                NetworkSide::Publisher(Publisher::new(
                    client,
                    uplink_rx,
                    config.uplink_topic.clone(),
                    &config.timing,
                )),
            ),
            Role::SenderSubscriber => (
                RadioSide::Sender(Sender::new(
                    radio,
                    downlink_rx,
                    config.radio.clone(),
                    config.timing,
                )),
                NetworkSide::Subscriber(Subscriber::new(
                    client,
                    downlink_tx,
                    config.downlink_topic.clone(),
                    &config.timing,
                )),
            ),
        };
        Ok(sides)
    }
}

/// The radio-side worker of the configured role.
pub enum RadioSide<'a, R, M: RawMutex, const UPLINK: usize, const DOWNLINK: usize> {
    Receiver(Receiver<'a, R, M, UPLINK>),
    Sender(Sender<'a, R, M, DOWNLINK>),
}

impl<R, M, const UPLINK: usize, const DOWNLINK: usize> RadioWorker
    for RadioSide<'_, R, M, UPLINK, DOWNLINK>
where
    R: RadioTransceiver,
    M: RawMutex,
{
    async fn run(&mut self) -> Result<Infallible, RadioWorkerError> {
        match self {
            RadioSide::Receiver(worker) => worker.run().await,
            RadioSide::Sender(worker) => worker.run().await,
        }
    }

    fn stats(&self) -> LinkStats {
        match self {
            RadioSide::Receiver(worker) => worker.stats(),
            RadioSide::Sender(worker) => worker.stats(),
        }
    }
}

/// The network-side worker of the configured role.
pub enum NetworkSide<'a, C, M: RawMutex, const UPLINK: usize, const DOWNLINK: usize> {
    Publisher(Publisher<'a, C, M, UPLINK>),
    Subscriber(Subscriber<'a, C, M, DOWNLINK>),
}

impl<C, M, const UPLINK: usize, const DOWNLINK: usize> NetworkWorker
    for NetworkSide<'_, C, M, UPLINK, DOWNLINK>
where
    C: PubSubClient,
    M: RawMutex,
{
    type Error = C::Error;

    async fn run(&mut self) -> Result<Infallible, NetworkWorkerError<C::Error>> {
        match self {
            NetworkSide::Publisher(worker) => worker.run().await,
            NetworkSide::Subscriber(worker) => worker.run().await,
        }
    }

    fn stats(&self) -> LinkStats {
        match self {
            NetworkSide::Publisher(worker) => worker.stats(),
            NetworkSide::Subscriber(worker) => worker.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach::NetEvent;
    use crate::testing::{StubClient, StubRadio, fast_timing};
    use core::cell::RefCell;
    use embassy_futures::block_on;
    use embassy_futures::select::{Either, Either3, select, select3};
    use embassy_net::Ipv4Address;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use std::vec::Vec;

    type Channels = BridgeChannels<CriticalSectionRawMutex, 1024, 1024>;

    #[test]
    fn receiver_frames_reach_the_broker_in_order() {
        let frames = [[0x11u8; 10].to_vec(), [0x22u8; 20].to_vec(), [0x33u8; 5].to_vec()];
        let transmitted = RefCell::new(Vec::new());
        let radio = StubRadio::new(&transmitted)
            .with_frames([None].into_iter().chain(frames.iter().cloned().map(Some)));
        let published = RefCell::new(Vec::new());
        let client = StubClient::new(&published);

        let config = BridgeConfig::default().with_timing(fast_timing());
        let mut channels = Channels::new(config.item_size);
        let (mut radio_side, mut network_side) =
            channels.assemble(&config, radio, client).unwrap();
        assert!(matches!(radio_side, RadioSide::Receiver(_)));

        let done = async {
            while published.borrow().len() < frames.len() {
                embassy_futures::yield_now().await;
            }
        };
        let result = block_on(select3(radio_side.run(), network_side.run(), done));
        assert!(matches!(result, Either3::Third(())));

        let published = published.borrow();
        for (sent, (topic, payload)) in frames.iter().zip(published.iter()) {
            assert_eq!(topic, "radio/uplink");
            assert_eq!(payload, sent);
        }
        assert_eq!(radio_side.stats().forwarded, 3);
        assert_eq!(network_side.stats().forwarded, 3);
    }

    #[test]
    fn broker_messages_reach_the_radio() {
        let transmitted = RefCell::new(Vec::new());
        let radio = StubRadio::new(&transmitted);
        let published = RefCell::new(Vec::new());
        let client = StubClient::new(&published).with_incoming([
            ("radio/downlink", b"led on".to_vec()),
            ("radio/downlink", b"led off".to_vec()),
        ]);

        let config = BridgeConfig::default()
            .with_role(Role::SenderSubscriber)
            .with_timing(fast_timing());
        let mut channels = Channels::new(config.item_size);
        let (mut radio_side, mut network_side) =
            channels.assemble(&config, radio, client).unwrap();

        // The subscriber ends once the stub connection closes; the sender
        // then has to drain what was queued.
        let network_result = block_on(network_side.run());
        assert!(network_result.is_err());

        let done = async {
            while transmitted.borrow().len() < 2 {
                embassy_futures::yield_now().await;
            }
        };
        let result = block_on(select(radio_side.run(), done));
        assert!(matches!(result, Either::Second(())));
        assert_eq!(*transmitted.borrow(), [b"led on".to_vec(), b"led off".to_vec()]);
    }

    struct OneShotInterface {
        events: Vec<NetEvent>,
    }

    impl NetworkInterface for OneShotInterface {
        type Error = ();

        async fn start(&mut self, _credentials: &WifiCredentials) -> Result<(), ()> {
            Ok(())
        }

        async fn connect(&mut self) -> Result<(), ()> {
            Ok(())
        }

        async fn next_event(&mut self) -> NetEvent {
            self.events.remove(0)
        }

        fn release_events(&mut self) {}
    }

    #[test]
    fn attach_policy_decides_between_abort_and_offline() {
        let credentials = WifiCredentials::new("lab", "pw").unwrap();
        let failing = || OneShotInterface {
            events: [NetEvent::Disconnected; 3].to_vec(),
        };

        let config = BridgeConfig::default().with_max_retries(1);
        let result = block_on(bring_up(&mut failing(), &credentials, &config));
        assert_eq!(result, Err(AttachError::RetriesExhausted { attempts: 2 }));

        let config = config.with_attach_policy(AttachPolicy::Offline);
        let result = block_on(bring_up(&mut failing(), &credentials, &config));
        assert_eq!(result, Ok(LinkMode::Offline));

        let ip = Ipv4Address::new(10, 1, 2, 3);
        let mut iface = OneShotInterface {
            events: [NetEvent::AddressAcquired(ip)].to_vec(),
        };
        let result = block_on(bring_up(&mut iface, &credentials, &config));
        assert_eq!(
            result,
            Ok(LinkMode::Online(Attached {
                address: ip,
                retries: 0
            }))
        );
    }

    struct LocalDirectory;

    impl HostResolver for LocalDirectory {
        async fn query_a(&mut self, host: &str) -> Result<Ipv4Address, crate::ResolveError> {
            match host {
                "broker" => Ok(Ipv4Address::new(10, 0, 0, 5)),
                _ => Err(crate::ResolveError::NotFound),
            }
        }
    }

    #[test]
    fn broker_uri_is_resolved_or_kept() {
        let config = BridgeConfig::default().with_timing(fast_timing());
        let address = block_on(broker_address(&mut LocalDirectory, &config));
        assert_eq!(address.as_str(), "mqtt://10.0.0.5:1883");

        let config = config.with_broker_uri("mqtt://gateway.local:1883").unwrap();
        let address = block_on(broker_address(&mut LocalDirectory, &config));
        assert_eq!(address.as_str(), "mqtt://gateway.local:1883");
    }

    #[test]
    fn sender_subscriber_role_builds_sender() {
        let mut channels = BridgeChannels::<CriticalSectionRawMutex, 64, 128>::new(16);
        let config = BridgeConfig::default()
            .with_role(Role::SenderSubscriber)
            .with_item_size(16);
        let transmitted = RefCell::new(Vec::new());
        let published = RefCell::new(Vec::new());
        let (radio_side, _network_side) = channels
            .assemble(
                &config,
                StubRadio::new(&transmitted),
                StubClient::new(&published),
            )
            .unwrap();
        assert!(matches!(radio_side, RadioSide::Sender(_)));
    }

    #[test]
    fn config_item_size_must_match_channels() {
        let mut channels = Channels::new(16);
        let config = BridgeConfig::default();
        let transmitted = RefCell::new(Vec::new());
        let published = RefCell::new(Vec::new());
        let result = channels.assemble(
            &config,
            StubRadio::new(&transmitted),
            StubClient::new(&published),
        );
        assert_eq!(
            result.err(),
            Some(AssembleError::ItemSizeMismatch {
                configured: 32,
                channels: 16
            })
        );
    }

    #[test]
    #[should_panic(expected = "item size exceeds a radio frame")]
    fn channels_refuse_items_longer_than_a_frame() {
        let _ = Channels::new(64);
    }
}
