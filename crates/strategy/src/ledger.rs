use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use common::{OrderSide, TradeSignalEvent};

/// Append-only record of executed buy/sell events for one product.
///
/// Sides alternate starting from BUY: a buy is accepted only after a sell
/// recorded at an earlier time (or on an empty ledger), and a sell only after
/// an earlier buy. Violating events are refused, not reported as errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionLedger {
    signals: Vec<TradeSignalEvent>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted history, oldest first. The history is
    /// trusted as-is; only new events are checked.
    pub fn from_events(signals: Vec<TradeSignalEvent>) -> Self {
        Self { signals }
    }

    pub fn signals(&self) -> &[TradeSignalEvent] {
        &self.signals
    }

    pub fn last(&self) -> Option<&TradeSignalEvent> {
        self.signals.last()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn can_buy(&self, time: DateTime<Utc>) -> bool {
        match self.signals.last() {
            None => true,
            Some(last) => last.side == OrderSide::Sell && last.time < time,
        }
    }

    pub fn can_sell(&self, time: DateTime<Utc>) -> bool {
        match self.signals.last() {
            None => false,
            Some(last) => last.side == OrderSide::Buy && last.time < time,
        }
    }

    pub fn can_trade(&self, side: OrderSide, time: DateTime<Utc>) -> bool {
        match side {
            OrderSide::Buy => self.can_buy(time),
            OrderSide::Sell => self.can_sell(time),
        }
    }

    /// Record an event if it keeps the ledger alternating. Returns whether
    /// the event was accepted.
    pub fn append(&mut self, event: TradeSignalEvent) -> bool {
        if !self.can_trade(event.side, event.time) {
            return false;
        }
        self.signals.push(event);
        true
    }

    pub fn buy(&mut self, product_code: &str, time: DateTime<Utc>, price: f64, size: f64) -> bool {
        self.append(TradeSignalEvent {
            time,
            product_code: product_code.to_string(),
            side: OrderSide::Buy,
            price,
            size,
        })
    }

    pub fn sell(&mut self, product_code: &str, time: DateTime<Utc>, price: f64, size: f64) -> bool {
        self.append(TradeSignalEvent {
            time,
            product_code: product_code.to_string(),
            side: OrderSide::Sell,
            price,
            size,
        })
    }

    /// Realized cash flow: buys subtract `price × size`, sells add it. While a
    /// position is still open the total as of the last sell is reported. A
    /// leading sell is ignored.
    pub fn profit(&self) -> f64 {
        let mut total = 0.0;
        let mut before_sell = 0.0;
        let mut holding = false;

        for (i, ev) in self.signals.iter().enumerate() {
            if i == 0 && ev.side == OrderSide::Sell {
                continue;
            }
            match ev.side {
                OrderSide::Buy => {
                    total -= ev.price * ev.size;
                    holding = true;
                }
                OrderSide::Sell => {
                    total += ev.price * ev.size;
                    holding = false;
                    before_sell = total;
                }
            }
        }

        if holding {
            before_sell
        } else {
            total
        }
    }

    /// Events at or after `time`; empty when there are none.
    pub fn get_after(&self, time: DateTime<Utc>) -> &[TradeSignalEvent] {
        match self.signals.iter().position(|ev| ev.time >= time) {
            Some(i) => &self.signals[i..],
            None => &[],
        }
    }
}

impl Serialize for PositionLedger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("PositionLedger", 2)?;
        s.serialize_field("signals", &self.signals)?;
        s.serialize_field("profit", &self.profit())?;
        s.end()
    }
}
