//! In-memory gateway session.
//!
//! Behaves like a paper-trading gateway: market orders fill immediately at a
//! per-symbol mark price, stop orders rest until cancelled. Faults and
//! latency can be injected at runtime through [`SimulatedControls`], which
//! stays usable after the session itself has been moved onto the worker.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::application::ports::{GatewayEndpoint, GatewaySession, SessionError};
use crate::domain::operations::{
    AccountValue, OpenOrder, OrderAck, OrderAction, OrderKind, OrderRequest, Position,
};

const DEFAULT_ACCOUNT: &str = "DU0000000";
const DEFAULT_MARK: Decimal = Decimal::ONE_HUNDRED;
const STARTING_CASH: i64 = 1_000_000;

#[derive(Debug, Default)]
struct Faults {
    refuse_connect: Option<String>,
    fail_probes: bool,
    fail_operations: Option<String>,
    probe_delay: Duration,
    operation_delay: Duration,
    connect_delay: Duration,
    drop_transport: bool,
    marks: HashMap<String, Decimal>,
    accounts: Vec<String>,
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicU32,
    disconnects: AtomicU32,
    probes: AtomicU32,
    operations: AtomicU32,
}

/// Runtime handle for fault injection and call accounting.
#[derive(Debug, Clone, Default)]
pub struct SimulatedControls {
    faults: Arc<Mutex<Faults>>,
    counters: Arc<Counters>,
}

impl SimulatedControls {
    /// Make connect attempts fail with `reason`, or succeed again with `None`.
    pub fn refuse_connect(&self, reason: Option<&str>) {
        self.faults.lock().refuse_connect = reason.map(str::to_string);
    }

    /// Make liveness probes fail.
    pub fn fail_probes(&self, fail: bool) {
        self.faults.lock().fail_probes = fail;
    }

    /// Make every query and order call fail with `reason`.
    pub fn fail_operations(&self, reason: Option<&str>) {
        self.faults.lock().fail_operations = reason.map(str::to_string);
    }

    /// Latency added to each probe.
    pub fn set_probe_delay(&self, delay: Duration) {
        self.faults.lock().probe_delay = delay;
    }

    /// Latency added to each query and order call.
    pub fn set_operation_delay(&self, delay: Duration) {
        self.faults.lock().operation_delay = delay;
    }

    /// Latency added to each connect handshake.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.faults.lock().connect_delay = delay;
    }

    /// Silently close the transport, as if the gateway restarted.
    pub fn drop_transport(&self) {
        self.faults.lock().drop_transport = true;
    }

    /// Set the fill price for a symbol.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.faults
            .lock()
            .marks
            .insert(symbol.to_ascii_uppercase(), price);
    }

    /// Replace the managed account list.
    pub fn set_accounts(&self, accounts: &[&str]) {
        self.faults.lock().accounts = accounts.iter().map(|a| (*a).to_string()).collect();
    }

    /// Handshakes attempted.
    #[must_use]
    pub fn connects(&self) -> u32 {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// Disconnects performed on an open transport.
    #[must_use]
    pub fn disconnects(&self) -> u32 {
        self.counters.disconnects.load(Ordering::SeqCst)
    }

    /// Probes received.
    #[must_use]
    pub fn probes(&self) -> u32 {
        self.counters.probes.load(Ordering::SeqCst)
    }

    /// Query and order calls received.
    #[must_use]
    pub fn operations(&self) -> u32 {
        self.counters.operations.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct RestingOrder {
    symbol: String,
    action: OrderAction,
    quantity: u32,
    kind: OrderKind,
}

/// A gateway session that never leaves the process.
#[derive(Debug)]
pub struct SimulatedSession {
    controls: SimulatedControls,
    open: bool,
    endpoint: Option<GatewayEndpoint>,
    next_order_id: i64,
    resting: HashMap<i64, RestingOrder>,
    positions: HashMap<String, (Decimal, Decimal)>,
    cash: Decimal,
}

impl Default for SimulatedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSession {
    /// A closed session with a fresh account.
    #[must_use]
    pub fn new() -> Self {
        let controls = SimulatedControls::default();
        controls.faults.lock().accounts = vec![DEFAULT_ACCOUNT.to_string()];
        Self {
            controls,
            open: false,
            endpoint: None,
            next_order_id: 1,
            resting: HashMap::new(),
            positions: HashMap::new(),
            cash: Decimal::from(STARTING_CASH),
        }
    }

    /// Handle for driving this session from outside the worker.
    #[must_use]
    pub fn controls(&self) -> SimulatedControls {
        self.controls.clone()
    }

    /// Endpoint of the last successful handshake.
    #[must_use]
    pub const fn endpoint(&self) -> Option<&GatewayEndpoint> {
        self.endpoint.as_ref()
    }

    fn check_transport(&mut self) -> Result<(), SessionError> {
        let mut faults = self.controls.faults.lock();
        if std::mem::take(&mut faults.drop_transport) {
            self.open = false;
        }
        drop(faults);

        if self.open {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    fn begin_operation(&mut self) -> Result<(), SessionError> {
        self.check_transport()?;
        self.controls.counters.operations.fetch_add(1, Ordering::SeqCst);

        let (delay, failure) = {
            let faults = self.controls.faults.lock();
            (faults.operation_delay, faults.fail_operations.clone())
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        failure.map_or(Ok(()), |reason| Err(SessionError::Rejected(reason)))
    }

    fn mark(&self, symbol: &str) -> Decimal {
        self.controls
            .faults
            .lock()
            .marks
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_MARK)
    }

    fn account(&self) -> String {
        self.controls
            .faults
            .lock()
            .accounts
            .first()
            .cloned()
            .unwrap_or_default()
    }

    fn fill(&mut self, symbol: &str, action: OrderAction, quantity: u32) -> Decimal {
        let price = self.mark(symbol);
        let signed = match action {
            OrderAction::Buy => Decimal::from(quantity),
            OrderAction::Sell => -Decimal::from(quantity),
        };

        let entry = self
            .positions
            .entry(symbol.to_string())
            .or_insert((Decimal::ZERO, Decimal::ZERO));
        let (held, avg_cost) = *entry;
        let next = held + signed;

        // Average cost only moves when adding in the direction already held.
        let next_avg = if next.is_zero() {
            Decimal::ZERO
        } else if held.is_zero() || held.is_sign_positive() == signed.is_sign_positive() {
            (held * avg_cost + signed * price) / next
        } else if held.is_sign_positive() != next.is_sign_positive() {
            price
        } else {
            avg_cost
        };
        *entry = (next, next_avg);
        self.cash -= signed * price;
        price
    }

    fn allocate_order_id(&mut self) -> i64 {
        let id = self.next_order_id;
        self.next_order_id += 1;
        id
    }
}

impl GatewaySession for SimulatedSession {
    fn connect(&mut self, endpoint: &GatewayEndpoint, timeout: Duration) -> Result<(), SessionError> {
        self.controls.counters.connects.fetch_add(1, Ordering::SeqCst);

        let (delay, refusal) = {
            let mut faults = self.controls.faults.lock();
            faults.drop_transport = false;
            (faults.connect_delay, faults.refuse_connect.clone())
        };

        if delay > timeout {
            std::thread::sleep(timeout);
            return Err(SessionError::Handshake(format!(
                "no reply from {}:{} within {}s",
                endpoint.host,
                endpoint.port,
                timeout.as_secs_f64()
            )));
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if let Some(reason) = refusal {
            self.open = false;
            return Err(SessionError::Handshake(reason));
        }

        self.open = true;
        self.endpoint = Some(endpoint.clone());
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.open {
            self.controls
                .counters
                .disconnects
                .fetch_add(1, Ordering::SeqCst);
        }
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open && !self.controls.faults.lock().drop_transport
    }

    fn managed_accounts(&mut self) -> Result<Vec<String>, SessionError> {
        self.check_transport()?;
        Ok(self.controls.faults.lock().accounts.clone())
    }

    fn server_time(&mut self) -> Result<DateTime<Utc>, SessionError> {
        self.controls.counters.probes.fetch_add(1, Ordering::SeqCst);
        self.check_transport()?;

        let (delay, fail) = {
            let faults = self.controls.faults.lock();
            (faults.probe_delay, faults.fail_probes)
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if fail {
            return Err(SessionError::Transport("server time request unanswered".to_string()));
        }
        Ok(Utc::now())
    }

    fn place_order(&mut self, order: &OrderRequest) -> Result<OrderAck, SessionError> {
        self.begin_operation()?;
        let order_id = self.allocate_order_id();

        match order.kind {
            OrderKind::Market => {
                let price = self.fill(&order.symbol, order.action, order.quantity);
                Ok(OrderAck {
                    order_id,
                    status: "Filled".to_string(),
                    filled: Decimal::from(order.quantity),
                    avg_fill_price: price,
                })
            }
            OrderKind::Stop { .. } => {
                self.resting.insert(
                    order_id,
                    RestingOrder {
                        symbol: order.symbol.clone(),
                        action: order.action,
                        quantity: order.quantity,
                        kind: order.kind.clone(),
                    },
                );
                Ok(OrderAck {
                    order_id,
                    status: "PreSubmitted".to_string(),
                    filled: Decimal::ZERO,
                    avg_fill_price: Decimal::ZERO,
                })
            }
        }
    }

    fn modify_order(&mut self, order_id: i64, order: &OrderRequest) -> Result<OrderAck, SessionError> {
        self.begin_operation()?;
        let resting = self
            .resting
            .get_mut(&order_id)
            .ok_or(SessionError::OrderNotFound(order_id))?;

        resting.quantity = order.quantity;
        resting.kind = order.kind.clone();
        Ok(OrderAck {
            order_id,
            status: "PreSubmitted".to_string(),
            filled: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
        })
    }

    fn cancel_order(&mut self, order_id: i64) -> Result<(), SessionError> {
        self.begin_operation()?;
        self.resting
            .remove(&order_id)
            .map(|_| ())
            .ok_or(SessionError::OrderNotFound(order_id))
    }

    fn positions(&mut self) -> Result<Vec<Position>, SessionError> {
        self.begin_operation()?;
        let account = self.account();
        let mut positions: Vec<Position> = self
            .positions
            .iter()
            .map(|(symbol, (qty, avg_cost))| Position {
                symbol: symbol.clone(),
                position: *qty,
                avg_cost: *avg_cost,
                account: account.clone(),
            })
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    fn open_orders(&mut self) -> Result<Vec<OpenOrder>, SessionError> {
        self.begin_operation()?;
        let mut orders: Vec<OpenOrder> = self
            .resting
            .iter()
            .map(|(id, order)| OpenOrder {
                order_id: *id,
                symbol: order.symbol.clone(),
                action: order.action,
                quantity: Decimal::from(order.quantity),
                order_type: order.kind.as_str().to_string(),
                status: "PreSubmitted".to_string(),
            })
            .collect();
        orders.sort_by_key(|o| o.order_id);
        Ok(orders)
    }

    fn account_values(&mut self) -> Result<Vec<AccountValue>, SessionError> {
        self.begin_operation()?;
        let market_value: Decimal = self
            .positions
            .iter()
            .map(|(symbol, (qty, _))| *qty * self.mark(symbol))
            .sum();
        let net_liquidation = self.cash + market_value;

        Ok(vec![
            AccountValue::new("NetLiquidation", net_liquidation.to_string()),
            AccountValue::new("AvailableFunds", self.cash.to_string()),
            AccountValue::new("BuyingPower", (self.cash * Decimal::from(4)).to_string()),
            AccountValue::new("TotalCashValue", self.cash.to_string()),
        ])
    }
}
