use crate::core::errors::ExchangeError;
use crate::core::kernel::dispatch::Handler;
use crate::core::kernel::ws::WsConnection;
use crate::core::types::Subscription;
use std::ops::Deref;

/// OKX streaming client: channel helpers over one `WsConnection`
///
/// Derefs to the connection for lifecycle control and observation.
#[derive(Debug)]
pub struct OkxWebSocket {
    connection: WsConnection,
}

impl OkxWebSocket {
    pub fn new(connection: WsConnection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &WsConnection {
        &self.connection
    }

    /// Subscribe to one topic and optionally bind a handler under its routing key
    pub async fn subscribe(
        &self,
        subscription: Subscription,
        handler: Option<Handler>,
    ) -> Result<(), ExchangeError> {
        if let Some(handler) = handler {
            self.connection
                .dispatcher()
                .register_handler(subscription.routing_key(), handler);
        }
        self.connection.subscribe(vec![subscription]).await
    }

    /// Unsubscribe and drop the handlers bound to exactly this topic's key
    pub async fn unsubscribe(&self, subscription: Subscription) -> Result<(), ExchangeError> {
        self.connection
            .dispatcher()
            .remove(&subscription.routing_key());
        self.connection.unsubscribe(vec![subscription]).await
    }

    pub async fn subscribe_ticker(
        &self,
        inst_id: &str,
        handler: Option<Handler>,
    ) -> Result<(), ExchangeError> {
        self.subscribe(Subscription::instrument("tickers", inst_id), handler)
            .await
    }

    /// Candles on `candle{bar}`, e.g. `candle1m`, `candle1H`
    pub async fn subscribe_candles(
        &self,
        inst_id: &str,
        bar: &str,
        handler: Option<Handler>,
    ) -> Result<(), ExchangeError> {
        self.subscribe(
            Subscription::instrument(format!("candle{}", bar), inst_id),
            handler,
        )
        .await
    }

    /// Order book on `books{depth}`; an empty depth selects the full `books` channel
    pub async fn subscribe_orderbook(
        &self,
        inst_id: &str,
        depth: &str,
        handler: Option<Handler>,
    ) -> Result<(), ExchangeError> {
        self.subscribe(
            Subscription::instrument(format!("books{}", depth), inst_id),
            handler,
        )
        .await
    }

    pub async fn subscribe_trades(
        &self,
        inst_id: &str,
        handler: Option<Handler>,
    ) -> Result<(), ExchangeError> {
        self.subscribe(Subscription::instrument("trades", inst_id), handler)
            .await
    }

    pub async fn subscribe_account(&self, handler: Option<Handler>) -> Result<(), ExchangeError> {
        self.subscribe(Subscription::channel("account"), handler)
            .await
    }

    pub async fn subscribe_positions(
        &self,
        inst_type: &str,
        handler: Option<Handler>,
    ) -> Result<(), ExchangeError> {
        self.subscribe(
            Subscription::channel("positions").with_inst_type(inst_type),
            handler,
        )
        .await
    }

    pub async fn subscribe_orders(
        &self,
        inst_type: &str,
        handler: Option<Handler>,
    ) -> Result<(), ExchangeError> {
        self.subscribe(
            Subscription::channel("orders").with_inst_type(inst_type),
            handler,
        )
        .await
    }
}

impl Deref for OkxWebSocket {
    type Target = WsConnection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}
