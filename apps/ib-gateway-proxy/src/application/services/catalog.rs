//! Operation dispatch.
//!
//! Maps a [`DomainOperation`] onto the session calls that implement it.
//! Runs on the gateway worker only.

use crate::application::ports::{GatewaySession, SessionError};
use crate::domain::operations::{AccountSummary, DomainOperation, OperationOutput};

/// Run one domain operation against an open session.
///
/// # Errors
///
/// Returns `SessionError::NotConnected` when the transport is closed, and
/// whatever the session reports for the call itself otherwise.
pub fn run_operation(
    session: &mut dyn GatewaySession,
    operation: &DomainOperation,
    account_id: Option<String>,
) -> Result<OperationOutput, SessionError> {
    if !session.is_open() {
        return Err(SessionError::NotConnected);
    }

    match operation {
        DomainOperation::PlaceOrder(order) => {
            let ack = session.place_order(order)?;
            tracing::info!(
                action = order.action.as_str(),
                order_type = order.kind.as_str(),
                quantity = order.quantity,
                symbol = %order.symbol,
                order_id = ack.order_id,
                "Order placed"
            );
            Ok(OperationOutput::Order(ack))
        }
        DomainOperation::ModifyOrder { order_id, order } => {
            let ack = session.modify_order(*order_id, order)?;
            tracing::info!(
                order_id,
                symbol = %order.symbol,
                stop_price = ?order.stop_price(),
                "Order modified"
            );
            Ok(OperationOutput::Order(ack))
        }
        DomainOperation::CancelOrder { order_id } => {
            session.cancel_order(*order_id)?;
            tracing::info!(order_id, "Order cancelled");
            Ok(OperationOutput::Cancelled { success: true })
        }
        DomainOperation::Positions => {
            let positions = session
                .positions()?
                .into_iter()
                .filter(|p| !p.position.is_zero())
                .collect();
            Ok(OperationOutput::Positions(positions))
        }
        DomainOperation::OpenOrders => Ok(OperationOutput::Orders(session.open_orders()?)),
        DomainOperation::AccountSummary => {
            let values = session.account_values()?;
            Ok(OperationOutput::Account(AccountSummary::from_values(
                account_id, &values,
            )))
        }
    }
}
