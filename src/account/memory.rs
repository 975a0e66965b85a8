//! In-process account store

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{AccountError, AccountGateway, AccountId, StreamRecord};

/// Account records kept in memory
///
/// Can be switched into an unavailable state to exercise best-effort paths.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    records: Mutex<HashMap<AccountId, StreamRecord>>,
    unavailable: AtomicBool,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record
    pub fn insert(&self, record: StreamRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record);
    }

    /// Snapshot of a record
    pub fn get(&self, account: &AccountId) -> Option<StreamRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account)
            .cloned()
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn update<F>(&self, account: &AccountId, f: F) -> Result<(), AccountError>
    where
        F: FnOnce(&mut StreamRecord),
    {
        self.check()?;
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        // Updating a missing record matches nothing, like the document store
        if let Some(record) = records.get_mut(account) {
            f(record);
        }
        Ok(())
    }

    fn check(&self) -> Result<(), AccountError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(AccountError::Unavailable("memory store offline".into()))
        } else {
            Ok(())
        }
    }
}

impl AccountGateway for MemoryAccountStore {
    async fn authenticate(&self, account: &AccountId, token: &str) -> Result<bool, AccountError> {
        self.check()?;
        Ok(self
            .get(account)
            .map(|r| r.is_active && r.stream_token == token)
            .unwrap_or(false))
    }

    async fn set_live(&self, account: &AccountId, live: bool) -> Result<(), AccountError> {
        self.update(account, |r| r.is_live = live)
    }

    async fn add_viewers(&self, account: &AccountId, delta: i64) -> Result<(), AccountError> {
        self.update(account, |r| r.viewers += delta)
    }

    async fn reset_viewers(&self, account: &AccountId) -> Result<(), AccountError> {
        self.update(account, |r| r.viewers = 0)
    }
}
