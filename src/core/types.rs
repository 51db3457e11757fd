use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Response code the exchange uses for success
pub const SUCCESS_CODE: &str = "0";

/// Standard REST response wrapper: `{"code":"0","msg":"","data":[...]}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiResponse {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Vec<Value>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Deserialize the payload entries into a typed vector
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<Vec<T>, serde_json::Error> {
        self.data
            .iter()
            .cloned()
            .map(serde_json::from_value)
            .collect()
    }
}

/// A streaming topic. Two subscriptions are the same topic when all fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inst_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inst_type: Option<String>,
}

impl Subscription {
    /// Channel-wide topic, e.g. `account`
    pub fn channel(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            inst_id: None,
            inst_type: None,
        }
    }

    /// Per-instrument topic, e.g. `tickers` for `BTC-USDT`
    pub fn instrument(channel: impl Into<String>, inst_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            inst_id: Some(inst_id.into()),
            inst_type: None,
        }
    }

    #[must_use]
    pub fn with_inst_type(mut self, inst_type: impl Into<String>) -> Self {
        self.inst_type = Some(inst_type.into());
        self
    }

    /// Key under which pushes for this topic are dispatched
    pub fn routing_key(&self) -> RoutingKey {
        RoutingKey {
            channel: self.channel.clone(),
            inst_id: self.inst_id.clone(),
            inst_type: self.inst_type.clone(),
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.routing_key())
    }
}

/// Handler address: a channel, optionally narrowed to an instrument type
/// and/or one instrument
///
/// `orders` for `SWAP` and `orders` for `FUTURES` are distinct keys, so
/// each topic owns its handlers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey {
    pub channel: String,
    pub inst_id: Option<String>,
    pub inst_type: Option<String>,
}

impl RoutingKey {
    pub fn channel(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            inst_id: None,
            inst_type: None,
        }
    }

    pub fn instrument(channel: impl Into<String>, inst_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            inst_id: Some(inst_id.into()),
            inst_type: None,
        }
    }

    #[must_use]
    pub fn with_inst_type(mut self, inst_type: impl Into<String>) -> Self {
        self.inst_type = Some(inst_type.into());
        self
    }

    /// The channel-only key this key falls back to
    pub fn channel_only(&self) -> Self {
        Self::channel(self.channel.clone())
    }

    pub fn is_channel_only(&self) -> bool {
        self.inst_id.is_none() && self.inst_type.is_none()
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.channel)?;
        if let Some(inst_type) = &self.inst_type {
            write!(f, ":{}", inst_type)?;
        }
        if let Some(inst_id) = &self.inst_id {
            write!(f, ":{}", inst_id)?;
        }
        Ok(())
    }
}

/// A data push received on a subscribed channel
#[derive(Debug, Clone, PartialEq)]
pub struct DataPush {
    pub channel: String,
    pub inst_id: Option<String>,
    pub inst_type: Option<String>,
    /// `snapshot` / `update` for incremental channels
    pub action: Option<String>,
    pub data: Value,
}

impl DataPush {
    pub fn routing_key(&self) -> RoutingKey {
        RoutingKey {
            channel: self.channel.clone(),
            inst_id: self.inst_id.clone(),
            inst_type: self.inst_type.clone(),
        }
    }
}

/// Lifecycle state of one streaming connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Authenticating,
    Ready,
    Closing,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot published on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Consecutive failed reconnect attempts since the last Ready
    pub reconnect_attempts: u32,
    /// Set when the connection gave up; only an explicit connect clears it
    pub terminal: bool,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            terminal: false,
        }
    }
}

/// Notifications delivered to the owner of a connection
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// Ready again after an unplanned drop; subscriptions were replayed
    Reconnected { replayed: usize },
    Subscribed(Subscription),
    Unsubscribed(Subscription),
    /// `{"event":"error"}` control frame from the exchange
    ExchangeError { code: String, message: String },
    /// Inbound frame that could not be understood; dropped
    ProtocolViolation(String),
    /// The connection stopped for good
    Terminated { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscription_wire_format() {
        let sub = Subscription::instrument("tickers", "BTC-USDT");
        assert_eq!(
            serde_json::to_value(&sub).unwrap(),
            json!({"channel": "tickers", "instId": "BTC-USDT"})
        );

        let sub = Subscription::channel("positions").with_inst_type("SWAP");
        assert_eq!(
            serde_json::to_value(&sub).unwrap(),
            json!({"channel": "positions", "instType": "SWAP"})
        );
    }

    #[test]
    fn test_routing_key_display() {
        assert_eq!(
            RoutingKey::instrument("tickers", "BTC-USDT").to_string(),
            "tickers:BTC-USDT"
        );
        assert_eq!(RoutingKey::channel("account").to_string(), "account");
        assert_eq!(
            RoutingKey::instrument("tickers", "BTC-USDT").channel_only(),
            RoutingKey::channel("tickers")
        );
        assert_eq!(
            RoutingKey::channel("orders")
                .with_inst_type("SWAP")
                .to_string(),
            "orders:SWAP"
        );
    }

    #[test]
    fn test_inst_type_separates_routing_keys() {
        let swap = Subscription::channel("orders").with_inst_type("SWAP");
        let futures = Subscription::channel("orders").with_inst_type("FUTURES");
        assert_ne!(swap.routing_key(), futures.routing_key());
        assert!(!swap.routing_key().is_channel_only());
        assert_eq!(swap.routing_key().channel_only(), RoutingKey::channel("orders"));
        assert_eq!(swap.to_string(), "orders:SWAP");
    }

    #[test]
    fn test_api_response_defaults() {
        let response: ApiResponse = serde_json::from_str(r#"{"code":"0"}"#).unwrap();
        assert!(response.is_success());
        assert!(response.data.is_empty());
        assert!(response.msg.is_empty());
    }
}
