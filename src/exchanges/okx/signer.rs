use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::WsAuthenticator;
use crate::core::kernel::signer::{HmacSigningKey, SignatureResult, Signer};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use tokio_tungstenite::tungstenite::Message;

/// Path signed by the WebSocket login frame
pub const WS_LOGIN_PATH: &str = "/users/self/verify";

/// OKX request signer
///
/// The prehash string format is: timestamp + method + requestPath + body,
/// signed with HMAC-SHA256 and base64-encoded.
pub struct OkxSigner {
    api_key: String,
    passphrase: String,
    key: HmacSigningKey,
}

impl std::fmt::Debug for OkxSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OkxSigner")
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl OkxSigner {
    /// Validate the credential triple and pre-key the HMAC
    pub fn new(api_key: &str, secret_key: &str, passphrase: &str) -> Result<Self, ExchangeError> {
        validate_header_value("api key", api_key)?;
        validate_header_value("passphrase", passphrase)?;
        if secret_key.is_empty() {
            return Err(ExchangeError::ConfigurationError(
                "secret key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            api_key: api_key.to_string(),
            passphrase: passphrase.to_string(),
            key: HmacSigningKey::new(secret_key.as_bytes())?,
        })
    }

    pub fn from_config(config: &ExchangeConfig) -> Result<Self, ExchangeError> {
        Self::new(config.api_key(), config.secret_key(), config.passphrase())
    }

    /// Base64 HMAC-SHA256 over `timestamp + method + request_path + body`
    pub fn signature(
        &self,
        timestamp: &str,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> String {
        let prehash = format!("{}{}{}{}", timestamp, method, request_path, body);
        self.key.sign_base64(&prehash)
    }

    /// Login frame for a given Unix-seconds timestamp
    pub fn login_frame(&self, timestamp: &str) -> serde_json::Value {
        let sign = self.signature(timestamp, "GET", WS_LOGIN_PATH, "");
        json!({
            "op": "login",
            "args": [{
                "apiKey": self.api_key,
                "passphrase": self.passphrase,
                "timestamp": timestamp,
                "sign": sign,
            }]
        })
    }
}

impl Signer for OkxSigner {
    fn sign_request(
        &self,
        method: &str,
        request_path: &str,
        body: &str,
        timestamp: &str,
    ) -> SignatureResult {
        let signature = self.signature(timestamp, method, request_path, body);

        let mut headers = HashMap::with_capacity(4);
        headers.insert("OK-ACCESS-KEY".to_string(), self.api_key.clone());
        headers.insert("OK-ACCESS-SIGN".to_string(), signature);
        headers.insert("OK-ACCESS-TIMESTAMP".to_string(), timestamp.to_string());
        headers.insert("OK-ACCESS-PASSPHRASE".to_string(), self.passphrase.clone());
        Ok(headers)
    }
}

impl WsAuthenticator for OkxSigner {
    fn login_message(&self) -> Result<Message, ExchangeError> {
        let timestamp = Utc::now().timestamp().to_string();
        Ok(Message::Text(self.login_frame(&timestamp).to_string()))
    }
}

// Credentials travel in HTTP headers, so they must be visible ASCII
fn validate_header_value(name: &str, value: &str) -> Result<(), ExchangeError> {
    if value.is_empty() {
        return Err(ExchangeError::ConfigurationError(format!(
            "{} must not be empty",
            name
        )));
    }
    if !value.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(ExchangeError::ConfigurationError(format!(
            "{} contains characters that cannot be sent in a header",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> OkxSigner {
        OkxSigner::new("key-id", "secret", "phrase").unwrap()
    }

    #[test]
    fn test_rest_signature_vectors() {
        let signer = signer();
        assert_eq!(
            signer.signature(
                "2020-12-08T09:08:57.715Z",
                "GET",
                "/api/v5/account/balance?ccy=BTC",
                ""
            ),
            "wpDvCwYCprcMQsQkxWJiWy+YADoQE4ep+OEKKLimMoY="
        );
        assert_eq!(
            signer.signature(
                "2020-12-08T09:08:57.715Z",
                "POST",
                "/api/v5/trade/order",
                r#"{"instId":"BTC-USDT","tdMode":"cash","side":"buy","ordType":"market","sz":"100"}"#
            ),
            "+SM6nJSKMKS9+m5bVcez7pXUlsk35EAsSXfA58nI17s="
        );
    }

    #[test]
    fn test_signed_headers() {
        let headers = signer()
            .sign_request(
                "GET",
                "/api/v5/account/balance?ccy=BTC",
                "",
                "2020-12-08T09:08:57.715Z",
            )
            .unwrap();

        assert_eq!(headers["OK-ACCESS-KEY"], "key-id");
        assert_eq!(headers["OK-ACCESS-PASSPHRASE"], "phrase");
        assert_eq!(headers["OK-ACCESS-TIMESTAMP"], "2020-12-08T09:08:57.715Z");
        assert_eq!(
            headers["OK-ACCESS-SIGN"],
            "wpDvCwYCprcMQsQkxWJiWy+YADoQE4ep+OEKKLimMoY="
        );
    }

    #[test]
    fn test_any_changed_input_changes_signature() {
        const TS: &str = "2020-12-08T09:08:57.715Z";
        const BALANCE: &str = "/api/v5/account/balance";

        let signer = signer();
        let base = signer.signature(TS, "GET", BALANCE, "");
        let variants = [
            signer.signature("2020-12-08T09:08:57.716Z", "GET", BALANCE, ""),
            signer.signature(TS, "POST", BALANCE, ""),
            signer.signature(TS, "GET", "/api/v5/account/positions", ""),
            signer.signature(TS, "GET", BALANCE, "{}"),
        ];
        for variant in variants {
            assert_ne!(variant, base);
        }
        let other = OkxSigner::new("key-id", "other-secret", "phrase").unwrap();
        assert_ne!(other.signature(TS, "GET", BALANCE, ""), base);
    }

    #[test]
    fn test_login_frame() {
        let frame = signer().login_frame("1538054050");
        let args = &frame["args"][0];
        assert_eq!(frame["op"], "login");
        assert_eq!(args["apiKey"], "key-id");
        assert_eq!(args["passphrase"], "phrase");
        assert_eq!(args["timestamp"], "1538054050");
        assert_eq!(args["sign"], "Gj2hQIVKFcXbiwCak8SmVOu5mxPCizWDdmUAhbx8Z+s=");
    }

    #[test]
    fn test_malformed_credentials_rejected_at_construction() {
        assert!(matches!(
            OkxSigner::new("", "secret", "phrase"),
            Err(ExchangeError::ConfigurationError(_))
        ));
        assert!(OkxSigner::new("key", "", "phrase").is_err());
        assert!(OkxSigner::new("key", "secret", "").is_err());
        assert!(OkxSigner::new("key\n", "secret", "phrase").is_err());
        assert!(OkxSigner::new("key", "secret", "pass phrase").is_err());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let rendered = format!("{:?}", signer());
        assert!(!rendered.contains("key-id"));
        assert!(!rendered.contains("phrase\""));
    }
}
