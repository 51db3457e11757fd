/// Kernel - exchange-agnostic transport layer
///
/// REST and WebSocket plumbing with no venue knowledge. Exchange modules plug
/// in a `Signer`, a `WsCodec` and optionally a `WsAuthenticator`; the kernel
/// owns rate limiting, retries, the connection state machine, keepalive,
/// subscription replay and callback dispatch.
///
/// # Architecture
///
/// ## REST
/// - `RestClient`: request execution interface
/// - `ReqwestRest`: limiter -> envelope -> sign -> send -> classify, wrapped in `RetryPolicy`
/// - `RateLimiter`: sliding-window admission
/// - `RetryPolicy`: classified exponential backoff
///
/// ## Streaming
/// - `WsConnection`: handle to a single-owner connection driver task
/// - `KeepAlive`: liveness pings while Ready
/// - `SubscriptionRegistry`: topics replayed on every Ready transition
/// - `CallbackDispatcher`: per-connection handler routing
///
/// ## Authentication
/// - `Signer`: per-request header signing
/// - `WsAuthenticator`: login frame for private streams
///
/// # Usage
///
/// ## Signed REST client
/// ```rust,no_run
/// use okx_connector::core::config::ExchangeConfig;
/// use okx_connector::core::kernel::*;
/// use okx_connector::exchanges::okx::signer::OkxSigner;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExchangeConfig::from_env("OKX")?;
/// let rest_config = RestClientConfig::new("https://www.okx.com".to_string(), "okx".to_string())
///     .with_rate_limit(10, std::time::Duration::from_secs(1))
///     .with_rate_limit_code("50011");
/// let signer = Arc::new(OkxSigner::from_config(&config)?);
/// let rest = RestClientBuilder::new(rest_config).with_signer(signer).build()?;
///
/// let balance = rest.get("/api/v5/account/balance", &[("ccy", "BTC")]).await?;
/// println!("{:?}", balance.data);
/// # Ok(())
/// # }
/// ```
///
/// ## Streaming with handlers
/// ```rust,no_run
/// use okx_connector::core::kernel::*;
/// use okx_connector::core::types::{RoutingKey, Subscription};
/// use okx_connector::exchanges::okx::codec::OkxCodec;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let ws = WsConnection::new(
///     "wss://ws.okx.com:8443/ws/v5/public",
///     "okx",
///     OkxCodec,
///     None,
///     WsConfig::default(),
/// )?;
/// ws.register_handler(RoutingKey::channel("tickers"), |push| {
///     println!("{}: {}", push.channel, push.data);
///     Ok(())
/// });
/// ws.subscribe(vec![Subscription::instrument("tickers", "BTC-USDT")]).await?;
/// ws.connect().await?;
/// # Ok(())
/// # }
/// ```
pub mod codec;
pub mod dispatch;
pub mod keepalive;
pub mod rate_limit;
pub mod rest;
pub mod retry;
pub mod signer;
pub mod subscription;
pub mod ws;

// Re-export key types for convenience
pub use codec::{WsAuthenticator, WsCodec, WsFrame};
pub use dispatch::{CallbackDispatcher, DispatchReport, Handler};
pub use keepalive::{KeepAlive, KeepAliveAction};
pub use rate_limit::RateLimiter;
pub use rest::{
    RequestEnvelope, ReqwestRest, RestClient, RestClientBuilder, RestClientConfig,
};
pub use retry::RetryPolicy;
pub use signer::{HmacSigningKey, SignatureResult, Signer};
pub use subscription::SubscriptionRegistry;
pub use ws::{WsConfig, WsConnection};
