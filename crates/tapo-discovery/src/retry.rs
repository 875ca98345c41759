//! Per-device connection retry budget

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Attempts allowed per device before it is given up on
pub const DEFAULT_RETRY_BUDGET: u32 = 20;

/// Delay before every attempt after the first
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Retry state of a single device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Never attempted
    Fresh,
    /// Attempted before, with attempts left
    Active { remaining: u32 },
    /// Budget used up; stays so for the lifetime of the ledger
    Exhausted,
}

/// What to do before the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptGate {
    Proceed,
    ProceedAfter(Duration),
    Refuse,
}

/// Remaining connection attempts keyed by accessory UUID.
///
/// Budgets only ever decrease; there is no reset.
#[derive(Debug)]
pub struct RetryLedger {
    budget: u32,
    delay: Duration,
    remaining: Mutex<HashMap<Uuid, u32>>,
}

impl Default for RetryLedger {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_BUDGET, DEFAULT_RETRY_DELAY)
    }
}

impl RetryLedger {
    pub fn new(budget: u32, delay: Duration) -> Self {
        Self {
            budget,
            delay,
            remaining: Mutex::new(HashMap::new()),
        }
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub async fn state(&self, uuid: &Uuid) -> RetryState {
        match self.remaining.lock().await.get(uuid) {
            None => RetryState::Fresh,
            Some(0) => RetryState::Exhausted,
            Some(&remaining) => RetryState::Active { remaining },
        }
    }

    pub async fn remaining(&self, uuid: &Uuid) -> Option<u32> {
        self.remaining.lock().await.get(uuid).copied()
    }

    /// Gate an attempt, creating the entry with the full budget on first use
    pub async fn begin_attempt(&self, uuid: Uuid) -> AttemptGate {
        let mut remaining = self.remaining.lock().await;
        match remaining.get(&uuid).copied() {
            None => {
                remaining.insert(uuid, self.budget);
                if self.budget == 0 {
                    AttemptGate::Refuse
                } else {
                    AttemptGate::Proceed
                }
            }
            Some(0) => AttemptGate::Refuse,
            Some(_) => AttemptGate::ProceedAfter(self.delay),
        }
    }

    /// Record a failed attempt, returning the attempts left
    pub async fn record_failure(&self, uuid: Uuid) -> u32 {
        let mut remaining = self.remaining.lock().await;
        let left = remaining.entry(uuid).or_insert(self.budget);
        *left = left.saturating_sub(1);
        *left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapo_core::derive_uuid;

    #[tokio::test]
    async fn test_fresh_uuid_starts_with_full_budget() {
        let ledger = RetryLedger::default();
        let uuid = derive_uuid("aa:bb:cc:dd:ee:ff");

        assert_eq!(ledger.state(&uuid).await, RetryState::Fresh);
        assert_eq!(ledger.begin_attempt(uuid).await, AttemptGate::Proceed);
        assert_eq!(ledger.remaining(&uuid).await, Some(20));
        assert_eq!(ledger.state(&uuid).await, RetryState::Active { remaining: 20 });
    }

    #[tokio::test]
    async fn test_later_attempts_wait() {
        let ledger = RetryLedger::default();
        let uuid = derive_uuid("aa:bb:cc:dd:ee:ff");

        ledger.begin_attempt(uuid).await;
        assert_eq!(ledger.record_failure(uuid).await, 19);
        assert_eq!(
            ledger.begin_attempt(uuid).await,
            AttemptGate::ProceedAfter(Duration::from_secs(10))
        );
    }

    #[tokio::test]
    async fn test_exhausted_after_budget() {
        let ledger = RetryLedger::default();
        let uuid = derive_uuid("aa:bb:cc:dd:ee:ff");

        for attempt in 0..20 {
            assert_ne!(ledger.begin_attempt(uuid).await, AttemptGate::Refuse, "attempt {attempt}");
            ledger.record_failure(uuid).await;
        }

        assert_eq!(ledger.state(&uuid).await, RetryState::Exhausted);
        assert_eq!(ledger.begin_attempt(uuid).await, AttemptGate::Refuse);
        // Further failures never go below zero or revive the entry
        assert_eq!(ledger.record_failure(uuid).await, 0);
        assert_eq!(ledger.begin_attempt(uuid).await, AttemptGate::Refuse);
    }

    #[tokio::test]
    async fn test_budgets_are_independent() {
        let ledger = RetryLedger::new(1, Duration::from_secs(1));
        let a = derive_uuid("aa:bb:cc:dd:ee:01");
        let b = derive_uuid("aa:bb:cc:dd:ee:02");

        ledger.begin_attempt(a).await;
        ledger.record_failure(a).await;

        assert_eq!(ledger.state(&a).await, RetryState::Exhausted);
        assert_eq!(ledger.state(&b).await, RetryState::Fresh);
        assert_eq!(ledger.begin_attempt(b).await, AttemptGate::Proceed);
    }

    #[tokio::test]
    async fn test_zero_budget_refuses_immediately() {
        let ledger = RetryLedger::new(0, Duration::from_secs(1));
        let uuid = derive_uuid("child-1");
        assert_eq!(ledger.begin_attempt(uuid).await, AttemptGate::Refuse);
    }
}
