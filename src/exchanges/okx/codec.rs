use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{WsCodec, WsFrame};
use crate::core::types::{DataPush, Subscription, SUCCESS_CODE};
use crate::exchanges::okx::types::OkxWsRequest;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// Liveness frame OKX answers with a bare `pong`
pub const PING: &str = "ping";

/// OKX WebSocket codec implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct OkxCodec;

impl OkxCodec {
    fn encode_operation(
        operation: &str,
        subscriptions: &[Subscription],
    ) -> Result<Message, ExchangeError> {
        let request = OkxWsRequest {
            op: operation,
            args: subscriptions,
        };
        serde_json::to_string(&request)
            .map(Message::Text)
            .map_err(|e| ExchangeError::SerializationError(e.to_string()))
    }

    fn parse_arg(value: &Value) -> Result<Subscription, ExchangeError> {
        let arg = value
            .get("arg")
            .ok_or_else(|| ExchangeError::ParseError("Missing arg field".to_string()))?;
        serde_json::from_value(arg.clone())
            .map_err(|e| ExchangeError::ParseError(format!("Failed to parse channel: {}", e)))
    }

    fn str_field(value: &Value, field: &str) -> String {
        value
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn decode_event(event: &str, value: Value) -> Result<WsFrame, ExchangeError> {
        let frame = match event {
            "subscribe" => WsFrame::Subscribed(Self::parse_arg(&value)?),
            "unsubscribe" => WsFrame::Unsubscribed(Self::parse_arg(&value)?),
            "error" => WsFrame::Error {
                code: Self::str_field(&value, "code"),
                message: Self::str_field(&value, "msg"),
            },
            "login" => {
                let code = Self::str_field(&value, "code");
                WsFrame::Login {
                    success: code == SUCCESS_CODE,
                    code,
                    message: Self::str_field(&value, "msg"),
                }
            }
            other => WsFrame::Event {
                event: other.to_string(),
                payload: value,
            },
        };
        Ok(frame)
    }
}

impl WsCodec for OkxCodec {
    fn encode_subscription(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Message, ExchangeError> {
        Self::encode_operation("subscribe", subscriptions)
    }

    fn encode_unsubscription(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Message, ExchangeError> {
        Self::encode_operation("unsubscribe", subscriptions)
    }

    fn encode_ping(&self) -> Message {
        Message::Text(PING.to_string())
    }

    fn decode_message(&self, message: Message) -> Result<Option<WsFrame>, ExchangeError> {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(data) => String::from_utf8(data).map_err(|e| {
                ExchangeError::ParseError(format!("Invalid UTF-8 in binary message: {}", e))
            })?,
            _ => return Ok(None),
        };

        // Anything that is not a JSON document is the liveness reply
        let trimmed = text.trim_start();
        if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
            return Ok(Some(WsFrame::Pong));
        }

        let mut value: Value = serde_json::from_str(trimmed)
            .map_err(|e| ExchangeError::ParseError(format!("Failed to parse JSON: {}", e)))?;

        if let Some(event) = value.get("event").and_then(Value::as_str) {
            let event = event.to_string();
            return Self::decode_event(&event, value).map(Some);
        }

        if value.get("arg").is_some() {
            let subscription = Self::parse_arg(&value)?;
            let data = value
                .get_mut("data")
                .map(Value::take)
                .ok_or_else(|| ExchangeError::ParseError("Missing data field".to_string()))?;
            let action = value
                .get("action")
                .and_then(Value::as_str)
                .map(str::to_string);

            return Ok(Some(WsFrame::Data(DataPush {
                channel: subscription.channel,
                inst_id: subscription.inst_id,
                inst_type: subscription.inst_type,
                action,
                data,
            })));
        }

        Err(ExchangeError::ParseError(format!(
            "Unknown message format: {}",
            text
        )))
    }
}
