//! # Publish/Subscribe Client Abstraction
//!
//! The network workers are written against [`PubSubClient`], not against a
//! concrete MQTT implementation. Connecting, keep-alives and delivery
//! guarantees belong to the client; the bridge only publishes, subscribes
//! and handles incoming messages.
//!
//! Subscribing is split into two calls so that no callback has to be stored
//! inside the client: [`PubSubClient::subscribe`] registers the topic, and
//! [`PubSubClient::poll`] waits for the next incoming message and hands it to
//! a [`MessageHandler`].

/// Handles messages delivered by [`PubSubClient::poll`].
#[allow(async_fn_in_trait)]
pub trait MessageHandler {
    /// Called once for every incoming publish.
    ///
    /// `payload` borrows from the client's receive buffer and is only valid
    /// for the duration of the call.
    async fn on_message(&mut self, topic: &str, payload: &[u8]);
}

/// The broker connection as seen by the network workers.
#[allow(async_fn_in_trait)]
pub trait PubSubClient {
    /// The error type returned by the client.
    type Error: core::fmt::Debug;

    /// Publishes `payload` on `topic` without waiting for an acknowledgement.
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error>;

    /// Subscribes to `topic`.
    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Waits for the next incoming message and passes it to `handler`.
    ///
    /// Returns after at most one message. Protocol traffic that is not a
    /// publish (pings, acks) may make it return without calling the handler.
    async fn poll<H: MessageHandler>(&mut self, handler: &mut H) -> Result<(), Self::Error>;
}
