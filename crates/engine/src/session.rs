use tokio::sync::{Mutex, MutexGuard, Semaphore, SemaphorePermit};

use strategy::PositionLedger;

/// State carried across trade sessions of one running instance.
#[derive(Debug, Default)]
pub struct SessionState {
    pub ledger: PositionLedger,
    /// Sell once the close drops below this. Set on a completed buy, cleared
    /// on a completed sell.
    pub stop_loss_price: Option<f64>,
}

/// Single-flight guard around the decision-to-order path.
///
/// At most one session runs at any instant; a trigger that arrives while one
/// is running is dropped, not queued.
pub struct TradeSession {
    gate: Semaphore,
    state: Mutex<SessionState>,
}

/// A running session. Dropping it releases the gate.
pub struct ActiveSession<'a> {
    _permit: SemaphorePermit<'a>,
    pub state: MutexGuard<'a, SessionState>,
}

impl TradeSession {
    pub fn new(state: SessionState) -> Self {
        Self {
            gate: Semaphore::new(1),
            state: Mutex::new(state),
        }
    }

    /// Enter a session without waiting for another session. `None` when one
    /// is already running.
    pub async fn try_begin(&self) -> Option<ActiveSession<'_>> {
        let permit = self.gate.try_acquire().ok()?;
        let state = self.state.lock().await;
        Some(ActiveSession {
            _permit: permit,
            state,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.gate.available_permits() == 0
    }

    /// Waits for a running session to finish.
    pub async fn stop_loss_price(&self) -> Option<f64> {
        self.state.lock().await.stop_loss_price
    }

    pub async fn ledger(&self) -> PositionLedger {
        self.state.lock().await.ledger.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_session_is_refused_until_first_ends() {
        let session = TradeSession::new(SessionState::default());
        let first = session.try_begin().await;
        assert!(first.is_some());
        assert!(session.is_busy());
        assert!(session.try_begin().await.is_none());

        drop(first);
        assert!(!session.is_busy());
        assert!(session.try_begin().await.is_some());
    }

    #[tokio::test]
    async fn state_persists_between_sessions() {
        let session = TradeSession::new(SessionState::default());
        {
            let mut active = session.try_begin().await.unwrap();
            active.state.stop_loss_price = Some(90.0);
        }
        assert_eq!(session.stop_loss_price().await, Some(90.0));
    }
}
