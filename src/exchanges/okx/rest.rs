use crate::core::errors::ExchangeError;
use crate::core::kernel::RestClient;
use crate::core::types::ApiResponse;
use crate::exchanges::okx::types::{
    OkxAlgoCancel, OkxAlgoOrderRequest, OkxClosePositionRequest, OkxLeverageRequest, OkxOrderId,
    OkxOrderRequest, MAX_BATCH_SIZE,
};
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::instrument;

/// OKX REST API client implementation
///
/// Every method returns the exchange envelope untouched on success; payload
/// rows stay as JSON for the caller to interpret.
#[derive(Debug, Clone)]
pub struct OkxRest<R: RestClient> {
    rest_client: R,
}

impl<R: RestClient> OkxRest<R> {
    pub fn new(rest_client: R) -> Self {
        Self { rest_client }
    }

    pub fn client(&self) -> &R {
        &self.rest_client
    }

    /// Narrow a generic API failure to the variant callers act on
    fn map_okx_error(error: ExchangeError) -> ExchangeError {
        match error {
            ExchangeError::ApiError { code, message } => match code {
                50100..=50113 => ExchangeError::AuthError(format!("{} - {}", code, message)),
                51000 => ExchangeError::InvalidParameters(format!("{} - {}", code, message)),
                _ => ExchangeError::ApiError { code, message },
            },
            other => other,
        }
    }

    async fn get(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<ApiResponse, ExchangeError> {
        self.rest_client
            .get(endpoint, params)
            .await
            .map_err(Self::map_okx_error)
    }

    async fn post<T: Serialize + Sync + ?Sized>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<ApiResponse, ExchangeError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ExchangeError::SerializationError(e.to_string()))?;
        self.rest_client
            .execute(Method::POST, endpoint, &[], Some(&body))
            .await
            .map_err(Self::map_okx_error)
    }

    // Market data

    #[instrument(skip(self), fields(exchange = "okx"))]
    pub async fn get_ticker(&self, inst_id: &str) -> Result<ApiResponse, ExchangeError> {
        self.get("/api/v5/market/ticker", &[("instId", inst_id)])
            .await
    }

    pub async fn get_tickers(&self, inst_type: &str) -> Result<ApiResponse, ExchangeError> {
        self.get("/api/v5/market/tickers", &[("instType", inst_type)])
            .await
    }

    /// Candles for `bar` (1m, 5m, 1H, 1D, ...), at most 300 rows
    #[instrument(skip(self), fields(exchange = "okx"))]
    pub async fn get_candles(
        &self,
        inst_id: &str,
        bar: &str,
        limit: u32,
    ) -> Result<ApiResponse, ExchangeError> {
        if limit == 0 || limit > 300 {
            return Err(ExchangeError::InvalidParameters(format!(
                "candle limit must be within 1..=300, got {}",
                limit
            )));
        }
        let limit = limit.to_string();
        self.get(
            "/api/v5/market/candles",
            &[("instId", inst_id), ("bar", bar), ("limit", &limit)],
        )
        .await
    }

    pub async fn get_orderbook(
        &self,
        inst_id: &str,
        depth: u32,
    ) -> Result<ApiResponse, ExchangeError> {
        let depth = depth.to_string();
        self.get("/api/v5/market/books", &[("instId", inst_id), ("sz", &depth)])
            .await
    }

    // Account

    #[instrument(skip(self), fields(exchange = "okx"))]
    pub async fn get_balance(&self, ccy: Option<&str>) -> Result<ApiResponse, ExchangeError> {
        let params: Vec<(&str, &str)> = ccy.map(|ccy| ("ccy", ccy)).into_iter().collect();
        self.get("/api/v5/account/balance", &params).await
    }

    #[instrument(skip(self), fields(exchange = "okx"))]
    pub async fn get_positions(
        &self,
        inst_type: &str,
        inst_id: Option<&str>,
    ) -> Result<ApiResponse, ExchangeError> {
        let mut params = vec![("instType", inst_type)];
        if let Some(inst_id) = inst_id {
            params.push(("instId", inst_id));
        }
        self.get("/api/v5/account/positions", &params).await
    }

    pub async fn set_leverage(
        &self,
        inst_id: &str,
        lever: u32,
        mgn_mode: &str,
        pos_side: &str,
    ) -> Result<ApiResponse, ExchangeError> {
        if lever == 0 {
            return Err(ExchangeError::InvalidParameters(
                "leverage must be at least 1".to_string(),
            ));
        }
        let body = OkxLeverageRequest {
            inst_id: inst_id.to_string(),
            lever: lever.to_string(),
            mgn_mode: mgn_mode.to_string(),
            pos_side: pos_side.to_string(),
        };
        self.post("/api/v5/account/set-leverage", &body).await
    }

    pub async fn get_account_config(&self) -> Result<ApiResponse, ExchangeError> {
        self.get("/api/v5/account/config", &[]).await
    }

    /// `long_short_mode` or `net_mode`
    pub async fn set_position_mode(&self, pos_mode: &str) -> Result<ApiResponse, ExchangeError> {
        self.post("/api/v5/account/set-position-mode", &json!({ "posMode": pos_mode }))
            .await
    }

    // Trading

    #[instrument(skip(self, order), fields(exchange = "okx", inst_id = %order.inst_id, side = %order.side))]
    pub async fn place_order(&self, order: &OkxOrderRequest) -> Result<ApiResponse, ExchangeError> {
        order.validate()?;
        self.post("/api/v5/trade/order", order).await
    }

    #[instrument(skip(self, order), fields(exchange = "okx", inst_id = %order.inst_id))]
    pub async fn cancel_order(&self, order: &OkxOrderId) -> Result<ApiResponse, ExchangeError> {
        order.validate()?;
        self.post("/api/v5/trade/cancel-order", &Self::single_id(order))
            .await
    }

    pub async fn get_order(&self, order: &OkxOrderId) -> Result<ApiResponse, ExchangeError> {
        order.validate()?;
        self.get("/api/v5/trade/order", &order.query()).await
    }

    pub async fn get_pending_orders(
        &self,
        inst_type: &str,
        inst_id: Option<&str>,
    ) -> Result<ApiResponse, ExchangeError> {
        let mut params = vec![("instType", inst_type)];
        if let Some(inst_id) = inst_id {
            params.push(("instId", inst_id));
        }
        self.get("/api/v5/trade/orders-pending", &params).await
    }

    pub async fn get_order_history(
        &self,
        inst_type: &str,
        inst_id: Option<&str>,
        limit: u32,
    ) -> Result<ApiResponse, ExchangeError> {
        let limit = limit.to_string();
        let mut params = vec![("instType", inst_type), ("limit", limit.as_str())];
        if let Some(inst_id) = inst_id {
            params.push(("instId", inst_id));
        }
        self.get("/api/v5/trade/orders-history", &params).await
    }

    /// Market-close the whole position
    pub async fn close_position(
        &self,
        request: &OkxClosePositionRequest,
    ) -> Result<ApiResponse, ExchangeError> {
        if request.inst_id.is_empty() {
            return Err(ExchangeError::InvalidParameters(
                "instId must not be empty".to_string(),
            ));
        }
        self.post("/api/v5/trade/close-position", request).await
    }

    pub async fn batch_orders(
        &self,
        orders: &[OkxOrderRequest],
    ) -> Result<ApiResponse, ExchangeError> {
        check_batch(orders.len())?;
        for order in orders {
            order.validate()?;
        }
        self.post("/api/v5/trade/batch-orders", orders).await
    }

    pub async fn batch_cancel_orders(
        &self,
        orders: &[OkxOrderId],
    ) -> Result<ApiResponse, ExchangeError> {
        check_batch(orders.len())?;
        let mut body = Vec::with_capacity(orders.len());
        for order in orders {
            order.validate()?;
            body.push(Self::single_id(order));
        }
        self.post("/api/v5/trade/cancel-batch-orders", &body).await
    }

    // Algo orders

    #[instrument(skip(self, order), fields(exchange = "okx", inst_id = %order.inst_id))]
    pub async fn place_algo_order(
        &self,
        order: &OkxAlgoOrderRequest,
    ) -> Result<ApiResponse, ExchangeError> {
        order.validate()?;
        self.post("/api/v5/trade/order-algo", order).await
    }

    pub async fn cancel_algo_order(
        &self,
        algo_id: &str,
        inst_id: &str,
    ) -> Result<ApiResponse, ExchangeError> {
        let body = [OkxAlgoCancel {
            algo_id: algo_id.to_string(),
            inst_id: inst_id.to_string(),
        }];
        self.post("/api/v5/trade/cancel-algos", &body[..]).await
    }

    pub async fn get_algo_orders(
        &self,
        ord_type: &str,
        inst_id: Option<&str>,
    ) -> Result<ApiResponse, ExchangeError> {
        let mut params = vec![("ordType", ord_type)];
        if let Some(inst_id) = inst_id {
            params.push(("instId", inst_id));
        }
        self.get("/api/v5/trade/orders-algo-pending", &params).await
    }

    // Public data

    pub async fn get_instruments(&self, inst_type: &str) -> Result<ApiResponse, ExchangeError> {
        self.get("/api/v5/public/instruments", &[("instType", inst_type)])
            .await
    }

    pub async fn get_funding_rate(&self, inst_id: &str) -> Result<ApiResponse, ExchangeError> {
        self.get("/api/v5/public/funding-rate", &[("instId", inst_id)])
            .await
    }

    // OKX resolves by ordId when present, so only one id is sent
    fn single_id(order: &OkxOrderId) -> Value {
        match (&order.ord_id, &order.cl_ord_id) {
            (Some(ord_id), _) => json!({ "instId": order.inst_id, "ordId": ord_id }),
            (None, cl_ord_id) => json!({ "instId": order.inst_id, "clOrdId": cl_ord_id }),
        }
    }
}

fn check_batch(len: usize) -> Result<(), ExchangeError> {
    if len == 0 || len > MAX_BATCH_SIZE {
        return Err(ExchangeError::InvalidParameters(format!(
            "batch must contain 1..={} entries, got {}",
            MAX_BATCH_SIZE, len
        )));
    }
    Ok(())
}
