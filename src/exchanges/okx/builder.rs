use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    ReqwestRest, RestClientBuilder, RestClientConfig, WsAuthenticator, WsConfig, WsConnection,
};
use crate::exchanges::okx::{
    codec::OkxCodec, rest::OkxRest, signer::OkxSigner, websocket::OkxWebSocket,
};
use std::sync::Arc;
use std::time::Duration;

pub const REST_BASE_URL: &str = "https://www.okx.com";
pub const WS_PUBLIC_URL: &str = "wss://ws.okx.com:8443/ws/v5/public";
pub const WS_PRIVATE_URL: &str = "wss://ws.okx.com:8443/ws/v5/private";
pub const WS_SIMULATED_PUBLIC_URL: &str = "wss://wspap.okx.com:8443/ws/v5/public?brokerId=9999";
pub const WS_SIMULATED_PRIVATE_URL: &str = "wss://wspap.okx.com:8443/ws/v5/private?brokerId=9999";

/// Response code OKX uses for "Too Many Requests"
pub const RATE_LIMIT_CODE: &str = "50011";
pub const SIMULATED_TRADING_HEADER: &str = "x-simulated-trading";

const EXCHANGE_NAME: &str = "okx";

/// Builder for OKX REST and streaming clients
///
/// Credentials, environment and proxy come from `ExchangeConfig`; transport
/// tunables default to 10 calls per second, three attempts with 1s/2s
/// backoff, and the `WsConfig` defaults.
#[derive(Debug, Clone)]
pub struct OkxBuilder {
    config: ExchangeConfig,
    rest_timeout: u64,
    max_retries: u32,
    retry_base_delay: Duration,
    backoff_multiplier: f64,
    rate_limit_max_calls: usize,
    rate_limit_period: Duration,
    ws_config: WsConfig,
}

impl Default for OkxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OkxBuilder {
    /// Create a new `OkxBuilder` with default settings
    pub fn new() -> Self {
        Self {
            config: ExchangeConfig::read_only(),
            rest_timeout: 30,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            rate_limit_max_calls: 10,
            rate_limit_period: Duration::from_secs(1),
            ws_config: WsConfig::default(),
        }
    }

    /// Set the exchange configuration
    pub fn with_config(mut self, config: ExchangeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_credentials(mut self, api_key: &str, secret_key: &str, passphrase: &str) -> Self {
        let simulated = self.config.simulated;
        let base_url = self.config.base_url.take();
        let proxy = self.config.proxy.take();
        self.config = ExchangeConfig {
            base_url,
            proxy,
            ..ExchangeConfig::new(
                api_key.to_string(),
                secret_key.to_string(),
                passphrase.to_string(),
            )
            .simulated(simulated)
        };
        self
    }

    pub fn with_simulated(mut self, simulated: bool) -> Self {
        self.config.simulated = simulated;
        self
    }

    /// Set base URL for REST API
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.config.base_url = Some(base_url);
        self
    }

    pub fn with_rest_timeout(mut self, timeout_seconds: u64) -> Self {
        self.rest_timeout = timeout_seconds;
        self
    }

    pub fn with_retry(mut self, max_retries: u32, base_delay: Duration, multiplier: f64) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_rate_limit(mut self, max_calls: usize, period: Duration) -> Self {
        self.rate_limit_max_calls = max_calls;
        self.rate_limit_period = period;
        self
    }

    pub fn with_ws_config(mut self, ws_config: WsConfig) -> Self {
        self.ws_config = ws_config;
        self
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn public_ws_url(&self) -> &'static str {
        if self.config.simulated {
            WS_SIMULATED_PUBLIC_URL
        } else {
            WS_PUBLIC_URL
        }
    }

    pub fn private_ws_url(&self) -> &'static str {
        if self.config.simulated {
            WS_SIMULATED_PRIVATE_URL
        } else {
            WS_PRIVATE_URL
        }
    }

    /// REST transport settings derived from this builder
    pub fn rest_config(&self) -> RestClientConfig {
        let base_url = self
            .config
            .base_url
            .clone()
            .unwrap_or_else(|| REST_BASE_URL.to_string());

        let mut rest_config = RestClientConfig::new(base_url, EXCHANGE_NAME.to_string())
            .with_timeout(self.rest_timeout)
            .with_retry(
                self.max_retries,
                self.retry_base_delay,
                self.backoff_multiplier,
            )
            .with_rate_limit(self.rate_limit_max_calls, self.rate_limit_period)
            .with_rate_limit_code(RATE_LIMIT_CODE)
            .with_proxy(self.config.proxy.clone());

        if self.config.simulated {
            rest_config = rest_config.with_header(SIMULATED_TRADING_HEADER, "1");
        }
        rest_config
    }

    /// Signer for the configured credentials; `None` for a read-only config
    pub fn signer(&self) -> Result<Option<Arc<OkxSigner>>, ExchangeError> {
        let any_set = !self.config.api_key().is_empty()
            || !self.config.secret_key().is_empty()
            || !self.config.passphrase().is_empty();

        if !any_set {
            return Ok(None);
        }
        if !self.config.has_credentials() {
            return Err(ExchangeError::ConfigurationError(
                "OKX needs api key, secret key and passphrase together".to_string(),
            ));
        }
        OkxSigner::from_config(&self.config).map(|signer| Some(Arc::new(signer)))
    }

    /// Build the REST client; signed when credentials are configured
    pub fn build_rest(&self) -> Result<OkxRest<ReqwestRest>, ExchangeError> {
        let mut rest_builder = RestClientBuilder::new(self.rest_config());
        if let Some(signer) = self.signer()? {
            rest_builder = rest_builder.with_signer(signer);
        }
        Ok(OkxRest::new(rest_builder.build()?))
    }

    /// Build a public-channel streaming client. Must run inside a tokio runtime.
    pub fn build_public_ws(&self) -> Result<OkxWebSocket, ExchangeError> {
        let connection = WsConnection::new(
            self.public_ws_url(),
            EXCHANGE_NAME,
            OkxCodec,
            None,
            self.ws_config.clone(),
        )?;
        Ok(OkxWebSocket::new(connection))
    }

    /// Build a private-channel streaming client that logs in on every connect
    pub fn build_private_ws(&self) -> Result<OkxWebSocket, ExchangeError> {
        let signer = self.signer()?.ok_or_else(|| {
            ExchangeError::ConfigurationError(
                "private channels require OKX credentials".to_string(),
            )
        })?;
        let authenticator: Arc<dyn WsAuthenticator> = signer;

        let connection = WsConnection::new(
            self.private_ws_url(),
            EXCHANGE_NAME,
            OkxCodec,
            Some(authenticator),
            self.ws_config.clone(),
        )?;
        Ok(OkxWebSocket::new(connection))
    }
}
