use crate::core::errors::ExchangeError;
use crate::core::types::Subscription;
use serde::{Deserialize, Serialize};

/// Maximum entries OKX accepts in one batch request
pub const MAX_BATCH_SIZE: usize = 20;

/// Order price meaning "execute at market" for algo legs
pub const MARKET_PRICE: &str = "-1";

// Position side OKX uses for one-way mode; never sent explicitly
const NET_POS_SIDE: &str = "net";

/// WebSocket operation frame
#[derive(Debug, Serialize)]
pub struct OkxWsRequest<'a> {
    pub op: &'a str,
    pub args: &'a [Subscription],
}

/// Order placement body for `/api/v5/trade/order` and batch orders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxOrderRequest {
    pub inst_id: String,  // Instrument ID
    pub td_mode: String,  // Trade mode: cash, cross, isolated
    pub side: String,     // Order side: buy, sell
    pub ord_type: String, // Order type: market, limit, post_only, fok, ioc
    pub sz: String,       // Quantity to buy or sell
    #[serde(skip_serializing_if = "Option::is_none")]
    pub px: Option<String>, // Order price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_side: Option<String>, // long/short, hedge mode only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>, // Client order ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
}

impl OkxOrderRequest {
    pub fn market(inst_id: &str, side: &str, sz: &str) -> Self {
        Self {
            inst_id: inst_id.to_string(),
            td_mode: "cross".to_string(),
            side: side.to_string(),
            ord_type: "market".to_string(),
            sz: sz.to_string(),
            px: None,
            pos_side: None,
            cl_ord_id: None,
            reduce_only: None,
        }
    }

    pub fn limit(inst_id: &str, side: &str, sz: &str, px: &str) -> Self {
        Self {
            ord_type: "limit".to_string(),
            px: Some(px.to_string()),
            ..Self::market(inst_id, side, sz)
        }
    }

    pub fn td_mode(mut self, td_mode: &str) -> Self {
        self.td_mode = td_mode.to_string();
        self
    }

    /// Hedge-mode position side; `net` is the default and is left out of the body
    pub fn pos_side(mut self, pos_side: &str) -> Self {
        self.pos_side = (pos_side != NET_POS_SIDE).then(|| pos_side.to_string());
        self
    }

    pub fn cl_ord_id(mut self, cl_ord_id: &str) -> Self {
        self.cl_ord_id = Some(cl_ord_id.to_string());
        self
    }

    pub fn reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = Some(reduce_only);
        self
    }

    pub fn validate(&self) -> Result<(), ExchangeError> {
        require("instId", &self.inst_id)?;
        require("side", &self.side)?;
        require("sz", &self.sz)?;
        if self.ord_type != "market" && self.px.as_deref().map_or(true, str::is_empty) {
            return Err(ExchangeError::InvalidParameters(format!(
                "{} order requires px",
                self.ord_type
            )));
        }
        Ok(())
    }
}

/// Identifies one order by exchange or client id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxOrderId {
    pub inst_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ord_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>,
}

impl OkxOrderId {
    pub fn by_ord_id(inst_id: &str, ord_id: &str) -> Self {
        Self {
            inst_id: inst_id.to_string(),
            ord_id: Some(ord_id.to_string()),
            cl_ord_id: None,
        }
    }

    pub fn by_cl_ord_id(inst_id: &str, cl_ord_id: &str) -> Self {
        Self {
            inst_id: inst_id.to_string(),
            ord_id: None,
            cl_ord_id: Some(cl_ord_id.to_string()),
        }
    }

    /// Exchange id wins when both are present
    pub fn validate(&self) -> Result<(), ExchangeError> {
        require("instId", &self.inst_id)?;
        let has = |id: &Option<String>| id.as_deref().is_some_and(|s| !s.is_empty());
        if has(&self.ord_id) || has(&self.cl_ord_id) {
            Ok(())
        } else {
            Err(ExchangeError::InvalidParameters(
                "Must provide either ordId or clOrdId".to_string(),
            ))
        }
    }

    /// Query pairs in the order OKX documents them
    pub fn query(&self) -> Vec<(&str, &str)> {
        let mut params = vec![("instId", self.inst_id.as_str())];
        match (&self.ord_id, &self.cl_ord_id) {
            (Some(ord_id), _) => params.push(("ordId", ord_id.as_str())),
            (None, Some(cl_ord_id)) => params.push(("clOrdId", cl_ord_id.as_str())),
            (None, None) => {}
        }
        params
    }
}

/// Take-profit / stop-loss order for `/api/v5/trade/order-algo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxAlgoOrderRequest {
    pub inst_id: String,
    pub td_mode: String,
    pub side: String,
    pub ord_type: String, // conditional, oco, trigger
    pub sz: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp_trigger_px: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp_ord_px: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sl_trigger_px: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sl_ord_px: Option<String>,
}

impl OkxAlgoOrderRequest {
    pub fn new(inst_id: &str, side: &str, ord_type: &str, sz: &str) -> Self {
        Self {
            inst_id: inst_id.to_string(),
            td_mode: "cross".to_string(),
            side: side.to_string(),
            ord_type: ord_type.to_string(),
            sz: sz.to_string(),
            tp_trigger_px: None,
            tp_ord_px: None,
            sl_trigger_px: None,
            sl_ord_px: None,
        }
    }

    pub fn td_mode(mut self, td_mode: &str) -> Self {
        self.td_mode = td_mode.to_string();
        self
    }

    /// Take-profit leg; a missing order price executes at market
    pub fn take_profit(mut self, trigger_px: &str, order_px: Option<&str>) -> Self {
        self.tp_trigger_px = Some(trigger_px.to_string());
        self.tp_ord_px = Some(order_px.unwrap_or(MARKET_PRICE).to_string());
        self
    }

    /// Stop-loss leg; a missing order price executes at market
    pub fn stop_loss(mut self, trigger_px: &str, order_px: Option<&str>) -> Self {
        self.sl_trigger_px = Some(trigger_px.to_string());
        self.sl_ord_px = Some(order_px.unwrap_or(MARKET_PRICE).to_string());
        self
    }

    pub fn validate(&self) -> Result<(), ExchangeError> {
        require("instId", &self.inst_id)?;
        require("sz", &self.sz)?;
        if self.tp_trigger_px.is_none() && self.sl_trigger_px.is_none() {
            return Err(ExchangeError::InvalidParameters(
                "algo order needs a take-profit or stop-loss trigger".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxAlgoCancel {
    pub algo_id: String,
    pub inst_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxLeverageRequest {
    pub inst_id: String,
    pub lever: String,
    pub mgn_mode: String,
    pub pos_side: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxClosePositionRequest {
    pub inst_id: String,
    pub mgn_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_side: Option<String>,
}

impl OkxClosePositionRequest {
    pub fn new(inst_id: &str, mgn_mode: &str, pos_side: &str) -> Self {
        Self {
            inst_id: inst_id.to_string(),
            mgn_mode: mgn_mode.to_string(),
            pos_side: (pos_side != NET_POS_SIDE).then(|| pos_side.to_string()),
        }
    }
}

/// Per-order acknowledgement inside a trade response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxOrderAck {
    #[serde(default)]
    pub ord_id: String,
    #[serde(default)]
    pub cl_ord_id: String,
    #[serde(default)]
    pub s_code: String,
    #[serde(default)]
    pub s_msg: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxTicker {
    pub inst_id: String,
    pub last: String,
    #[serde(default)]
    pub bid_px: String,
    #[serde(default)]
    pub ask_px: String,
    #[serde(default)]
    pub vol24h: String,
    #[serde(default)]
    pub ts: String,
}

fn require(field: &str, value: &str) -> Result<(), ExchangeError> {
    if value.is_empty() {
        return Err(ExchangeError::InvalidParameters(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(())
}
