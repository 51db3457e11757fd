use crate::core::errors::ExchangeError;
use crate::core::types::{DataPush, Subscription};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// A decoded inbound frame, in the shape the connection driver acts on
#[derive(Debug, Clone, PartialEq)]
pub enum WsFrame {
    /// Liveness reply to our ping
    Pong,
    /// Login acknowledgement
    Login {
        success: bool,
        code: String,
        message: String,
    },
    /// Subscription confirmation
    Subscribed(Subscription),
    /// Unsubscription confirmation
    Unsubscribed(Subscription),
    /// Error event from the exchange
    Error { code: String, message: String },
    /// Market or account data for a subscribed channel
    Data(DataPush),
    /// Any other control event (notices, connection counts)
    Event { event: String, payload: Value },
}

/// Codec trait for handling exchange-specific WebSocket message encoding/decoding
///
/// Control frames of the WebSocket protocol itself (ping, pong, close) are
/// handled by the transport; codecs only see text and binary payloads.
pub trait WsCodec: Send + Sync + 'static {
    /// Encode a subscription request into a WebSocket message
    fn encode_subscription(&self, subscriptions: &[Subscription])
        -> Result<Message, ExchangeError>;

    /// Encode an unsubscription request into a WebSocket message
    fn encode_unsubscription(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Message, ExchangeError>;

    /// Minimal application-level liveness frame
    fn encode_ping(&self) -> Message;

    /// Decode a raw WebSocket message
    ///
    /// # Returns
    /// - `Ok(Some(frame))` - Successfully decoded frame
    /// - `Ok(None)` - Message was ignored by the codec
    /// - `Err(error)` - The payload violates the exchange protocol
    fn decode_message(&self, message: Message) -> Result<Option<WsFrame>, ExchangeError>;
}

/// Produces the login frame sent right after the socket opens
pub trait WsAuthenticator: Send + Sync + 'static {
    fn login_message(&self) -> Result<Message, ExchangeError>;
}
