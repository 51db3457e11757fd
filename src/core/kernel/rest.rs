use crate::core::errors::ExchangeError;
use crate::core::kernel::rate_limit::RateLimiter;
use crate::core::kernel::retry::RetryPolicy;
use crate::core::kernel::signer::{now_iso_timestamp, Signer};
use crate::core::types::ApiResponse;
use async_trait::async_trait;
use reqwest::{Client, Method, Proxy, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, trace};

/// REST client trait for making exchange requests
///
/// One call is one logical exchange: it may consume several rate-limit slots
/// and network attempts, but yields a single classified outcome.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Execute a request and return the exchange's response envelope
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `endpoint` - The API endpoint path
    /// * `query_params` - Query parameters, encoded in the given order
    /// * `body` - Optional JSON body
    ///
    /// # Returns
    /// The response envelope when the exchange reports success
    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<ApiResponse, ExchangeError>;

    /// Make a GET request
    async fn get(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<ApiResponse, ExchangeError> {
        self.execute(Method::GET, endpoint, query_params, None).await
    }

    /// Make a POST request with a JSON body
    async fn post(&self, endpoint: &str, body: &Value) -> Result<ApiResponse, ExchangeError> {
        self.execute(Method::POST, endpoint, &[], Some(body)).await
    }
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Total attempts per call, including the first
    pub max_retries: u32,
    /// Wait before the second attempt
    pub retry_base_delay: Duration,
    /// Growth factor applied to the wait after every failed attempt
    pub backoff_multiplier: f64,
    /// Maximum request starts per `rate_limit_period`
    pub rate_limit_max_calls: usize,
    pub rate_limit_period: Duration,
    /// User agent string to include in requests
    pub user_agent: String,
    /// Headers attached to every request
    pub default_headers: Vec<(String, String)>,
    /// Response codes that denote a rate-limit rejection
    pub rate_limit_codes: Vec<String>,
    /// Optional HTTP(S) proxy URL
    pub proxy: Option<String>,
}

impl RestClientConfig {
    /// Create a new configuration
    ///
    /// # Arguments
    /// * `base_url` - Base URL for the API
    /// * `exchange_name` - Name of the exchange
    pub fn new(base_url: String, exchange_name: String) -> Self {
        Self {
            base_url,
            exchange_name,
            timeout_seconds: 30,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            rate_limit_max_calls: 10,
            rate_limit_period: Duration::from_secs(1),
            user_agent: "okx-connector/0.1".to_string(),
            default_headers: Vec::new(),
            rate_limit_codes: Vec::new(),
            proxy: None,
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Set the retry policy parameters
    pub fn with_retry(mut self, max_retries: u32, base_delay: Duration, multiplier: f64) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the maximum number of attempts
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the outbound rate window
    pub fn with_rate_limit(mut self, max_calls: usize, period: Duration) -> Self {
        self.rate_limit_max_calls = max_calls;
        self.rate_limit_period = period;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.default_headers
            .push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_rate_limit_code(mut self, code: &str) -> Self {
        self.rate_limit_codes.push(code.to_string());
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl RestClientBuilder {
    /// Create a new builder with the given configuration
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
        }
    }

    /// Set the signer for authenticated requests
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Build the REST client
    ///
    /// Every invalid setting is reported here, before any request is made.
    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .user_agent(&self.config.user_agent);

        if let Some(proxy_url) = &self.config.proxy {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                ExchangeError::ConfigurationError(format!("Invalid proxy '{}': {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            ExchangeError::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        let limiter = RateLimiter::new(
            self.config.rate_limit_max_calls,
            self.config.rate_limit_period,
        )?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let retry = RetryPolicy::new(
            self.config.max_retries,
            self.config.retry_base_delay,
            self.config.backoff_multiplier,
        )?
        .with_shutdown(shutdown.clone());

        Ok(ReqwestRest {
            client,
            config: Arc::new(self.config),
            signer: self.signer,
            limiter: Arc::new(limiter),
            retry,
            shutdown,
        })
    }
}

/// A fully assembled request for one network attempt
///
/// Built fresh for every attempt so the timestamp and signature are never reused.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub method: Method,
    pub path: String,
    /// Form-encoded query string in caller order, without the leading `?`
    pub query: String,
    pub body: String,
    pub timestamp: String,
    /// Signature headers; empty for unsigned requests
    pub auth_headers: HashMap<String, String>,
}

impl RequestEnvelope {
    pub fn new(
        method: Method,
        path: &str,
        query: &str,
        body: &str,
        timestamp: String,
        signer: Option<&dyn Signer>,
    ) -> Result<Self, ExchangeError> {
        let mut envelope = Self {
            method,
            path: path.to_string(),
            query: query.to_string(),
            body: body.to_string(),
            timestamp,
            auth_headers: HashMap::new(),
        };

        if let Some(signer) = signer {
            envelope.auth_headers = signer.sign_request(
                envelope.method.as_str(),
                &envelope.request_path(),
                &envelope.body,
                &envelope.timestamp,
            )?;
        }

        Ok(envelope)
    }

    /// Path plus query; this is both what gets signed and what gets sent
    pub fn request_path(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }

    pub fn is_signed(&self) -> bool {
        !self.auth_headers.is_empty()
    }
}

/// Create query string from parameters, preserving their order
pub fn encode_query(params: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

/// Map an HTTP status and body onto the error taxonomy
pub fn classify_response(
    status: StatusCode,
    body: &str,
    rate_limit_codes: &[String],
) -> Result<ApiResponse, ExchangeError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ExchangeError::RateLimitExceeded(format!(
            "HTTP 429: {}",
            body
        )));
    }

    if status.is_server_error() {
        return Err(ExchangeError::ServerError(format!(
            "HTTP {}: {}",
            status.as_u16(),
            body
        )));
    }

    let parsed = match serde_json::from_str::<ApiResponse>(body) {
        Ok(parsed) => parsed,
        Err(_) if !status.is_success() => {
            return Err(ExchangeError::ApiError {
                code: i32::from(status.as_u16()),
                message: body.to_string(),
            });
        }
        Err(e) => {
            return Err(ExchangeError::DeserializationError(format!(
                "Failed to parse response envelope: {}",
                e
            )));
        }
    };

    if rate_limit_codes.iter().any(|code| *code == parsed.code) {
        return Err(ExchangeError::RateLimitExceeded(format!(
            "{} - {}",
            parsed.code, parsed.msg
        )));
    }

    if parsed.is_success() && status.is_success() {
        return Ok(parsed);
    }

    let code = if parsed.is_success() {
        i32::from(status.as_u16())
    } else {
        parsed.code.parse().unwrap_or(-1)
    };

    Err(ExchangeError::ApiError {
        code,
        message: parsed.msg,
    })
}

/// Implementation of `RestClient` using reqwest
///
/// Each attempt acquires a rate-limit slot, builds and signs a fresh
/// envelope, and performs one HTTP exchange; attempts are driven by the
/// configured `RetryPolicy`.
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    config: Arc<RestClientConfig>,
    signer: Option<Arc<dyn Signer>>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    shutdown: Arc<AtomicBool>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Stop issuing new attempts; an attempt already on the wire completes
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Build the full URL for a request path
    fn build_url(&self, request_path: &str) -> String {
        format!("{}{}", self.config.base_url, request_path)
    }

    #[instrument(skip(self, query, body), fields(exchange = %self.config.exchange_name, method = %method, endpoint = %endpoint))]
    async fn attempt(
        &self,
        method: Method,
        endpoint: &str,
        query: &str,
        body: &str,
    ) -> Result<ApiResponse, ExchangeError> {
        if self.is_shutdown() {
            return Err(ExchangeError::Shutdown);
        }

        self.limiter.acquire().await;

        let envelope = RequestEnvelope::new(
            method,
            endpoint,
            query,
            body,
            now_iso_timestamp(),
            self.signer.as_deref(),
        )?;

        let mut request = self
            .client
            .request(
                envelope.method.clone(),
                self.build_url(&envelope.request_path()),
            )
            .header("Content-Type", "application/json");

        for (key, value) in &self.config.default_headers {
            request = request.header(key, value);
        }
        for (key, value) in &envelope.auth_headers {
            request = request.header(key, value);
        }
        if !envelope.body.is_empty() {
            request = request.body(envelope.body.clone());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ExchangeError::ConnectionTimeout(format!("Request timed out: {}", e))
            } else {
                ExchangeError::NetworkError(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        let response_text = response.text().await.map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to read response body: {}", e))
        })?;

        trace!(status = %status, "Response body: {}", response_text);

        classify_response(status, &response_text, &self.config.rate_limit_codes)
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    #[instrument(skip(self, query_params, body), fields(exchange = %self.config.exchange_name, endpoint = %endpoint, param_count = query_params.len()))]
    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<ApiResponse, ExchangeError> {
        let body_text = match body {
            Some(value) => serde_json::to_string(value).map_err(|e| {
                ExchangeError::SerializationError(format!(
                    "Failed to serialize request body: {}",
                    e
                ))
            })?,
            None => String::new(),
        };
        let query = encode_query(query_params);

        let response = self
            .retry
            .run(|| self.attempt(method.clone(), endpoint, &query, &body_text))
            .await?;

        debug!(code = %response.code, rows = response.data.len(), "request completed");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSigner;

    impl Signer for FixedSigner {
        fn sign_request(
            &self,
            method: &str,
            request_path: &str,
            body: &str,
            timestamp: &str,
        ) -> crate::core::kernel::signer::SignatureResult {
            let mut headers = HashMap::new();
            headers.insert(
                "X-PREHASH".to_string(),
                format!("{}{}{}{}", timestamp, method, request_path, body),
            );
            Ok(headers)
        }
    }

    fn rate_limit_codes() -> Vec<String> {
        vec!["50011".to_string()]
    }

    #[test]
    fn test_encode_query_keeps_order_and_escapes() {
        let query = encode_query(&[("instId", "BTC-USDT"), ("bar", "1H"), ("after", "a b&c")]);
        assert_eq!(query, "instId=BTC-USDT&bar=1H&after=a+b%26c");
        assert_eq!(encode_query(&[]), "");
    }

    #[test]
    fn test_envelope_signs_path_with_query() {
        let envelope = RequestEnvelope::new(
            Method::GET,
            "/api/v5/account/balance",
            "ccy=BTC",
            "",
            "2020-12-08T09:08:57.715Z".to_string(),
            Some(&FixedSigner),
        )
        .unwrap();

        assert_eq!(envelope.request_path(), "/api/v5/account/balance?ccy=BTC");
        assert!(envelope.is_signed());
        assert_eq!(
            envelope.auth_headers["X-PREHASH"],
            "2020-12-08T09:08:57.715ZGET/api/v5/account/balance?ccy=BTC"
        );
    }

    #[test]
    fn test_unsigned_envelope() {
        let envelope = RequestEnvelope::new(
            Method::GET,
            "/api/v5/market/ticker",
            "",
            "",
            "2020-12-08T09:08:57.715Z".to_string(),
            None,
        )
        .unwrap();
        assert_eq!(envelope.request_path(), "/api/v5/market/ticker");
        assert!(!envelope.is_signed());
    }

    #[test]
    fn test_classify_success() {
        let body = r#"{"code":"0","msg":"","data":[{"instId":"BTC-USDT","last":"43000"}]}"#;
        let response = classify_response(StatusCode::OK, body, &rate_limit_codes()).unwrap();
        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data[0]["last"], "43000");
    }

    #[test]
    fn test_classify_rate_limit_code() {
        let body = r#"{"code":"50011","msg":"Too Many Requests","data":[]}"#;
        let err = classify_response(StatusCode::OK, body, &rate_limit_codes()).unwrap_err();
        assert!(err.is_rate_limit());
        assert!(err.is_retryable());

        let err = classify_response(StatusCode::TOO_MANY_REQUESTS, "", &[]).unwrap_err();
        assert!(err.is_rate_limit());
    }

    #[test]
    fn test_classify_logical_error() {
        let body = r#"{"code":"51008","msg":"Order failed. Insufficient balance","data":[]}"#;
        let err = classify_response(StatusCode::OK, body, &rate_limit_codes()).unwrap_err();
        assert!(
            matches!(&err, ExchangeError::ApiError { code: 51008, message } if message.contains("Insufficient"))
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_http_errors() {
        let err =
            classify_response(StatusCode::BAD_GATEWAY, "bad gateway", &rate_limit_codes())
                .unwrap_err();
        assert!(matches!(err, ExchangeError::ServerError(_)));
        assert!(err.is_retryable());

        let body = r#"{"code":"50113","msg":"Invalid Sign","data":[]}"#;
        let err = classify_response(StatusCode::UNAUTHORIZED, body, &rate_limit_codes())
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ApiError { code: 50113, .. }));

        let err = classify_response(StatusCode::NOT_FOUND, "<html>", &rate_limit_codes())
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ApiError { code: 404, .. }));
    }

    #[test]
    fn test_classify_malformed_success_body() {
        let err = classify_response(StatusCode::OK, "not json", &rate_limit_codes()).unwrap_err();
        assert!(matches!(err, ExchangeError::DeserializationError(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_builder_rejects_bad_settings() {
        let config = RestClientConfig::new("https://www.okx.com".to_string(), "okx".to_string())
            .with_rate_limit(0, Duration::from_secs(1));
        assert!(matches!(
            RestClientBuilder::new(config).build(),
            Err(ExchangeError::ConfigurationError(_))
        ));

        let config = RestClientConfig::new("https://www.okx.com".to_string(), "okx".to_string())
            .with_max_retries(0);
        assert!(RestClientBuilder::new(config).build().is_err());
    }
}
