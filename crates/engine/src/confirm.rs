use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use common::{ExchangeClient, OrderState, TradeSignalEvent};
use strategy::PositionLedger;

/// Delay between order status queries; the first query waits one interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(15);
/// Give up on an order that has not completed after this long.
pub const MAX_WAIT: Duration = Duration::from_secs(80);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPolicy {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            max_wait: MAX_WAIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmState {
    Waiting,
    /// The order completed and its event was recorded in the ledger.
    Completed(TradeSignalEvent),
    /// The wait budget ran out; nothing was recorded.
    Expired,
    /// The status query failed, found no order, or the ledger refused the fill.
    Failed(String),
}

impl ConfirmState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConfirmState::Waiting)
    }
}

/// Bounded wait for one accepted order to complete.
pub struct OrderConfirmation<'a> {
    exchange: &'a dyn ExchangeClient,
    product_code: &'a str,
    acceptance_id: &'a str,
    decided_at: DateTime<Utc>,
    policy: ConfirmPolicy,
    state: ConfirmState,
}

impl<'a> OrderConfirmation<'a> {
    pub fn new(
        exchange: &'a dyn ExchangeClient,
        product_code: &'a str,
        acceptance_id: &'a str,
        decided_at: DateTime<Utc>,
        policy: ConfirmPolicy,
    ) -> Self {
        Self {
            exchange,
            product_code,
            acceptance_id,
            decided_at,
            policy,
            state: ConfirmState::Waiting,
        }
    }

    pub fn state(&self) -> &ConfirmState {
        &self.state
    }

    /// Poll until the order completes, a query fails, or the budget runs out.
    /// A completed order is appended to `ledger` stamped with the decision
    /// time.
    pub async fn wait(mut self, ledger: &mut PositionLedger) -> ConfirmState {
        let deadline = sleep(self.policy.max_wait);
        tokio::pin!(deadline);
        let mut ticker = interval_at(
            Instant::now() + self.policy.poll_interval,
            self.policy.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.state.is_terminal() {
            tokio::select! {
                biased;
                _ = &mut deadline => {
                    warn!(acceptance_id = %self.acceptance_id, "Order not completed in time");
                    self.state = ConfirmState::Expired;
                }
                _ = ticker.tick() => self.poll(ledger).await,
            }
        }
        self.state
    }

    async fn poll(&mut self, ledger: &mut PositionLedger) {
        let orders = match self
            .exchange
            .list_orders(self.product_code, self.acceptance_id)
            .await
        {
            Ok(orders) => orders,
            Err(e) => {
                warn!(acceptance_id = %self.acceptance_id, error = %e, "Order status query failed");
                self.state = ConfirmState::Failed(e.to_string());
                return;
            }
        };

        let Some(order) = orders.first() else {
            self.state = ConfirmState::Failed(format!("no order found for {}", self.acceptance_id));
            return;
        };
        if order.state != OrderState::Completed {
            debug!(acceptance_id = %self.acceptance_id, state = ?order.state, "Order still pending");
            return;
        }

        let event = TradeSignalEvent {
            time: self.decided_at,
            product_code: self.product_code.to_string(),
            side: order.side,
            price: order.average_price,
            size: order.size,
        };
        if ledger.append(event.clone()) {
            info!(
                acceptance_id = %self.acceptance_id,
                side = %event.side,
                price = event.price,
                size = event.size,
                "Order completed"
            );
            self.state = ConfirmState::Completed(event);
        } else {
            warn!(acceptance_id = %self.acceptance_id, side = %event.side, "Ledger refused completed order");
            self.state = ConfirmState::Failed("ledger refused completed order".into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{minute, order_status, Reply, ScriptedExchange};
    use common::OrderSide;

    #[tokio::test(start_paused = true)]
    async fn completed_order_is_recorded_at_decision_time() {
        let exchange = ScriptedExchange::new().with_replies(vec![
            Reply::Orders(vec![order_status(OrderSide::Buy, OrderState::Active, 0.0, 0.5)]),
            Reply::Orders(vec![order_status(OrderSide::Buy, OrderState::Completed, 101.5, 0.5)]),
        ]);
        let mut ledger = PositionLedger::new();
        let started = Instant::now();

        let state = OrderConfirmation::new(&exchange, "BTC_USD", "ID1", minute(3), ConfirmPolicy::default())
            .wait(&mut ledger)
            .await;

        let ConfirmState::Completed(event) = state else {
            panic!("expected completion, got {state:?}");
        };
        assert_eq!(event.time, minute(3));
        assert_eq!(event.price, 101.5);
        assert_eq!(ledger.len(), 1);
        assert_eq!(exchange.polls(), 2);
        assert_eq!(started.elapsed(), POLL_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_order_expires_without_recording() {
        let exchange = ScriptedExchange::new().with_replies(vec![Reply::Orders(vec![
            order_status(OrderSide::Buy, OrderState::Active, 0.0, 0.5),
        ])]);
        let mut ledger = PositionLedger::new();
        let started = Instant::now();

        let state = OrderConfirmation::new(&exchange, "BTC_USD", "ID1", minute(3), ConfirmPolicy::default())
            .wait(&mut ledger)
            .await;

        assert_eq!(state, ConfirmState::Expired);
        assert!(ledger.is_empty());
        // polls at 15, 30, 45, 60 and 75 seconds
        assert_eq!(exchange.polls(), 5);
        assert_eq!(started.elapsed(), MAX_WAIT);
    }

    #[tokio::test(start_paused = true)]
    async fn query_error_fails_immediately() {
        let exchange = ScriptedExchange::new().with_replies(vec![Reply::Fail("timeout".into())]);
        let mut ledger = PositionLedger::new();

        let state = OrderConfirmation::new(&exchange, "BTC_USD", "ID1", minute(3), ConfirmPolicy::default())
            .wait(&mut ledger)
            .await;

        assert!(matches!(state, ConfirmState::Failed(_)));
        assert_eq!(exchange.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_order_fails() {
        let exchange = ScriptedExchange::new().with_replies(vec![Reply::Orders(Vec::new())]);
        let mut ledger = PositionLedger::new();

        let state = OrderConfirmation::new(&exchange, "BTC_USD", "ID1", minute(3), ConfirmPolicy::default())
            .wait(&mut ledger)
            .await;

        assert!(matches!(state, ConfirmState::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn refused_fill_is_a_failure() {
        // a sell with nothing bought
        let exchange = ScriptedExchange::new().with_replies(vec![Reply::Orders(vec![
            order_status(OrderSide::Sell, OrderState::Completed, 100.0, 1.0),
        ])]);
        let mut ledger = PositionLedger::new();

        let state = OrderConfirmation::new(&exchange, "BTC_USD", "ID1", minute(3), ConfirmPolicy::default())
            .wait(&mut ledger)
            .await;

        assert!(matches!(state, ConfirmState::Failed(_)));
        assert!(ledger.is_empty());
    }
}
