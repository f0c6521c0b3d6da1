use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use saldo_core::AccountId;

/// Hands out one async lock per account so a host can keep ingestions for
/// the same account from interleaving. Different accounts never contend.
/// Entries for accounts nobody holds or waits on are dropped on the next
/// `lock`, so the map only grows with concurrent accounts.
#[derive(Clone, Default)]
pub struct AccountGate {
    locks: Arc<Mutex<HashMap<AccountId, Arc<Mutex<()>>>>>,
}

impl AccountGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `account`. Access ends when the guard
    /// is dropped.
    pub async fn lock(&self, account: AccountId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, held| Arc::strong_count(held) > 1);
            Arc::clone(locks.entry(account).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_account_waits() {
        let gate = AccountGate::new();
        let guard = gate.lock(AccountId(1)).await;

        let second = tokio::time::timeout(Duration::from_millis(50), gate.lock(AccountId(1))).await;
        assert!(second.is_err());

        drop(guard);
        let third = tokio::time::timeout(Duration::from_millis(50), gate.lock(AccountId(1))).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn released_accounts_are_forgotten() {
        let gate = AccountGate::new();
        for id in 1..=100 {
            drop(gate.lock(AccountId(id)).await);
        }
        assert_eq!(gate.tracked().await, 1);

        let held = gate.lock(AccountId(500)).await;
        drop(gate.lock(AccountId(501)).await);
        assert_eq!(gate.tracked().await, 2);
        drop(held);
    }

    #[tokio::test]
    async fn different_accounts_do_not_contend() {
        let gate = AccountGate::new();
        let _a = gate.lock(AccountId(1)).await;
        let b = tokio::time::timeout(Duration::from_millis(50), gate.lock(AccountId(2))).await;
        assert!(b.is_ok());
    }
}
