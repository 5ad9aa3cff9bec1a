//! Gateway Operation Types
//!
//! The catalog of domain operations the proxy runs against the gateway
//! session, together with the order, position and account shapes they
//! produce. The core treats these as opaque units of work; the only thing
//! it needs to know is that every one of them requires a live session.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Orders
// =============================================================================

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    /// Buy to open or close.
    Buy,
    /// Sell to open or close.
    Sell,
}

impl OrderAction {
    /// Gateway action string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

/// Order type with its type-specific parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum OrderKind {
    /// Market order.
    #[serde(rename = "MKT")]
    Market,
    /// Stop order triggered at `stop_price`.
    #[serde(rename = "STP")]
    Stop {
        /// Trigger price.
        stop_price: Decimal,
    },
}

impl OrderKind {
    /// Gateway order type string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "MKT",
            Self::Stop { .. } => "STP",
        }
    }
}

/// Time in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Day order.
    #[default]
    Day,
    /// Good till cancelled.
    Gtc,
}

/// A fully specified order for a US stock routed through SMART.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Upper-cased ticker.
    pub symbol: String,
    /// Buy or sell.
    pub action: OrderAction,
    /// Share quantity.
    pub quantity: u32,
    /// Order type.
    pub kind: OrderKind,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Allow fills outside regular trading hours.
    pub outside_rth: bool,
}

impl OrderRequest {
    /// Market order, eligible outside regular trading hours.
    #[must_use]
    pub fn market(action: OrderAction, symbol: &str, quantity: u32) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            action,
            quantity,
            kind: OrderKind::Market,
            time_in_force: TimeInForce::Day,
            outside_rth: true,
        }
    }

    /// Protective GTC stop-sell order.
    #[must_use]
    pub fn stop_loss(symbol: &str, quantity: u32, stop_price: Decimal) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            action: OrderAction::Sell,
            quantity,
            kind: OrderKind::Stop { stop_price },
            time_in_force: TimeInForce::Gtc,
            outside_rth: true,
        }
    }

    /// Stop price, if this is a stop order.
    #[must_use]
    pub const fn stop_price(&self) -> Option<Decimal> {
        match self.kind {
            OrderKind::Stop { stop_price } => Some(stop_price),
            OrderKind::Market => None,
        }
    }
}

/// Gateway acknowledgement of a placed or modified order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    /// Gateway order id.
    pub order_id: i64,
    /// Gateway order status (e.g. `Submitted`, `Filled`).
    pub status: String,
    /// Filled quantity so far.
    pub filled: Decimal,
    /// Average fill price so far.
    pub avg_fill_price: Decimal,
}

/// An order still working at the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    /// Gateway order id.
    pub order_id: i64,
    /// Ticker.
    pub symbol: String,
    /// `BUY` or `SELL`.
    pub action: OrderAction,
    /// Total quantity.
    pub quantity: Decimal,
    /// Gateway order type (`MKT`, `STP`, ...).
    pub order_type: String,
    /// Gateway order status.
    pub status: String,
}

// =============================================================================
// Positions and Account
// =============================================================================

/// A held position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Ticker.
    pub symbol: String,
    /// Signed share count.
    pub position: Decimal,
    /// Average cost per share.
    pub avg_cost: Decimal,
    /// Owning account.
    pub account: String,
}

/// A tagged account value as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountValue {
    /// Gateway tag (e.g. `NetLiquidation`).
    pub tag: String,
    /// Raw value string.
    pub value: String,
}

impl AccountValue {
    /// Create a tagged value.
    #[must_use]
    pub fn new(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            value: value.into(),
        }
    }
}

/// Summary of the connected account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    /// Account identity discovered at connect time.
    pub account_id: Option<String>,
    /// Net liquidation value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_liquidation: Option<Decimal>,
    /// Available funds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_funds: Option<Decimal>,
    /// Buying power.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buying_power: Option<Decimal>,
    /// Total cash value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cash_value: Option<Decimal>,
}

impl AccountSummary {
    /// Build a summary from raw tagged values. Unknown tags and
    /// unparseable values are ignored.
    #[must_use]
    pub fn from_values(account_id: Option<String>, values: &[AccountValue]) -> Self {
        let mut summary = Self {
            account_id,
            ..Self::default()
        };

        for av in values {
            let Ok(value) = av.value.parse::<Decimal>() else {
                continue;
            };
            match av.tag.as_str() {
                "NetLiquidation" => summary.net_liquidation = Some(value),
                "AvailableFunds" => summary.available_funds = Some(value),
                "BuyingPower" => summary.buying_power = Some(value),
                "TotalCashValue" => summary.total_cash_value = Some(value),
                _ => {}
            }
        }

        summary
    }
}

// =============================================================================
// Operation Catalog
// =============================================================================

/// A domain operation submitted to the gateway worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainOperation {
    /// Place a new order.
    PlaceOrder(OrderRequest),
    /// Replace the parameters of an existing order.
    ModifyOrder {
        /// Order to modify.
        order_id: i64,
        /// New parameters.
        order: OrderRequest,
    },
    /// Cancel an open order.
    CancelOrder {
        /// Order to cancel.
        order_id: i64,
    },
    /// List non-zero positions.
    Positions,
    /// List open orders.
    OpenOrders,
    /// Summarize the account.
    AccountSummary,
}

impl DomainOperation {
    /// Operation name for logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PlaceOrder(_) => "place_order",
            Self::ModifyOrder { .. } => "modify_order",
            Self::CancelOrder { .. } => "cancel_order",
            Self::Positions => "positions",
            Self::OpenOrders => "open_orders",
            Self::AccountSummary => "account_summary",
        }
    }

    /// Whether the operation changes gateway-side state.
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::PlaceOrder(_) | Self::ModifyOrder { .. } | Self::CancelOrder { .. }
        )
    }
}

/// Result of a domain operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OperationOutput {
    /// Order placed or modified.
    Order(OrderAck),
    /// Order cancelled.
    Cancelled {
        /// Always true.
        success: bool,
    },
    /// Current positions.
    Positions(Vec<Position>),
    /// Open orders.
    Orders(Vec<OpenOrder>),
    /// Account summary.
    Account(AccountSummary),
}
