use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

use crate::account::{AccountId, AccountSnapshot};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Account {0} is not stored")]
    NotFound(AccountId),
}

/// Persistence capability for accounts. The ledger never calls it on its
/// own; integrations load snapshots with [`crate::account::Account::restore`]
/// and save them with [`crate::account::Account::snapshot`].
pub trait AccountStore {
    fn load(&self, account_id: &str) -> Result<AccountSnapshot, StoreError>;

    fn save(&self, snapshot: &AccountSnapshot) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    snapshots: RwLock<HashMap<AccountId, AccountSnapshot>>,
}

impl AccountStore for InMemoryAccountStore {
    fn load(&self, account_id: &str) -> Result<AccountSnapshot, StoreError> {
        self.snapshots
            .read()
            .get(account_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(account_id.to_string()))
    }

    fn save(&self, snapshot: &AccountSnapshot) -> Result<(), StoreError> {
        self.snapshots
            .write()
            .insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::account::{Account, NewAccount};

    use super::*;

    #[test]
    fn save_and_load() {
        let store = InMemoryAccountStore::default();
        let account = Account::new(NewAccount::checking("101-checking-1", dec!(1000)));
        account.withdraw(dec!(250)).unwrap();
        store.save(&account.snapshot()).unwrap();

        let restored = Account::restore(store.load("101-checking-1").unwrap());
        assert_eq!(restored.balance(), dec!(750));
        assert_eq!(restored.open_date(), account.open_date());

        // later saves replace the stored copy
        restored.deposit(dec!(50)).unwrap();
        store.save(&restored.snapshot()).unwrap();
        assert_eq!(store.load("101-checking-1").unwrap().balance, dec!(800));

        assert_eq!(
            store.load("missing").unwrap_err(),
            StoreError::NotFound("missing".to_string())
        );
    }
}
