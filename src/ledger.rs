use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    account::{
        Account, AccountError, AccountId, AccountSnapshot, AccountStatus, AccountType, CardNumber,
        NewAccount, Receipt,
    },
    command::{LedgerCommand, TransactionCommand},
    config::LedgerConfig,
    directory::{CardDirectory, InMemoryCardDirectory},
    registry::{AccountRegistry, AccountSummary, HolderId, IssuedCard, RegistryError},
};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("No account is associated with card {0}")]
    ReferenceNotFound(CardNumber),
    #[error("Account holder {0} is already registered")]
    HolderExists(HolderId),
    #[error("Account holder {0} is not registered")]
    HolderNotFound(HolderId),
    #[error("Bank balance exceeds the representable range")]
    BalanceOverflow,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Account(#[from] AccountError),
}

/// Id based pointer to an account, as resolved from a card.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AccountHandle {
    pub holder_id: HolderId,
    pub account_id: AccountId,
    pub account_type: AccountType,
}

/// Uniform result of a deposit or withdrawal: either the new balance and
/// time of the transaction, or the reason it was denied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionOutcome {
    pub status: bool,
    pub new_balance: Option<Decimal>,
    pub transaction_time: Option<DateTime<Utc>>,
    pub error: Option<AccountError>,
}

impl From<Result<Receipt, AccountError>> for TransactionOutcome {
    fn from(result: Result<Receipt, AccountError>) -> Self {
        match result {
            Ok(receipt) => Self {
                status: receipt.success,
                new_balance: Some(receipt.new_balance),
                transaction_time: Some(receipt.timestamp),
                error: None,
            },
            Err(err) => Self {
                status: false,
                new_balance: None,
                transaction_time: None,
                error: Some(err),
            },
        }
    }
}

#[derive(Debug)]
struct LedgerState<D> {
    registries: HashMap<HolderId, AccountRegistry>,
    directory: D,
}

impl<D: CardDirectory> LedgerState<D> {
    fn registry(&self, holder_id: &str) -> Result<&AccountRegistry, LedgerError> {
        self.registries
            .get(holder_id)
            .ok_or_else(|| LedgerError::HolderNotFound(holder_id.to_string()))
    }

    fn registry_mut(&mut self, holder_id: &str) -> Result<&mut AccountRegistry, LedgerError> {
        self.registries
            .get_mut(holder_id)
            .ok_or_else(|| LedgerError::HolderNotFound(holder_id.to_string()))
    }

    fn resolve(&self, card_number: &str) -> Result<(HolderId, &Account), LedgerError> {
        let not_found = || LedgerError::ReferenceNotFound(card_number.to_string());
        let holder_id = self.directory.holder_of(card_number).ok_or_else(not_found)?;
        let account = self
            .registries
            .get(&holder_id)
            .and_then(|registry| registry.account_for_card(card_number))
            .ok_or_else(not_found)?;
        Ok((holder_id, account))
    }
}

/// All account holders of one institution. Entry point for card
/// transactions and institution wide reporting.
///
/// Structural changes (new holders, accounts, cards) take the write lock.
/// Transactions and balance queries share the read lock and serialize only
/// on the per-account lock, so requests for different accounts run in
/// parallel.
#[derive(Debug)]
pub struct Ledger<D = InMemoryCardDirectory> {
    institution: String,
    withdrawal_limit: Decimal,
    state: RwLock<LedgerState<D>>,
}

impl Ledger<InMemoryCardDirectory> {
    pub fn new(config: &LedgerConfig) -> Self {
        Self::with_directory(config, InMemoryCardDirectory::default())
    }
}

impl Default for Ledger<InMemoryCardDirectory> {
    fn default() -> Self {
        Self::new(&LedgerConfig::default())
    }
}

impl<D: CardDirectory> Ledger<D> {
    pub fn with_directory(config: &LedgerConfig, directory: D) -> Self {
        Self {
            institution: config.institution.clone(),
            withdrawal_limit: config.withdrawal_limit,
            state: RwLock::new(LedgerState {
                registries: HashMap::new(),
                directory,
            }),
        }
    }

    pub fn institution(&self) -> &str {
        &self.institution
    }

    /// Adds a holder's registry to the ledger. Cards already issued on the
    /// registry become resolvable, and accounts opened without a withdrawal
    /// limit get the institution's one.
    pub fn register_holder(&self, mut registry: AccountRegistry) -> Result<(), LedgerError> {
        let mut state = self.state.write();
        let holder_id = registry.holder_id().clone();
        if state.registries.contains_key(&holder_id) {
            return Err(LedgerError::HolderExists(holder_id));
        }
        if let Some(card) = registry
            .issued_cards()
            .find(|card| state.directory.holder_of(&card.card_number).is_some())
        {
            return Err(RegistryError::CardExists(card.card_number.clone()).into());
        }
        registry.fill_withdrawal_limits(self.withdrawal_limit);
        for card in registry.issued_cards() {
            state
                .directory
                .link(card.card_number.clone(), holder_id.clone());
        }
        info!(
            institution = %self.institution,
            holder = %holder_id,
            accounts = %registry.account_summary(),
            "Account holder registered"
        );
        state.registries.insert(holder_id, registry);
        Ok(())
    }

    pub fn contains_holder(&self, holder_id: &str) -> bool {
        self.state.read().registries.contains_key(holder_id)
    }

    /// Holder ids in ascending order.
    pub fn holders(&self) -> Vec<HolderId> {
        let mut holders: Vec<HolderId> = self.state.read().registries.keys().cloned().collect();
        holders.sort();
        holders
    }

    /// Opens an account for a registered holder. Accounts opened without a
    /// withdrawal limit get the institution's one.
    pub fn open_account(
        &self,
        holder_id: &str,
        new_account: NewAccount,
    ) -> Result<AccountHandle, LedgerError> {
        let new_account = NewAccount {
            withdrawal_limit: new_account.withdrawal_limit.or(Some(self.withdrawal_limit)),
            ..new_account
        };
        let mut state = self.state.write();
        let account = state.registry_mut(holder_id)?.open_account(new_account)?;
        Ok(AccountHandle {
            holder_id: holder_id.to_string(),
            account_id: account.id().clone(),
            account_type: account.account_type(),
        })
    }

    pub fn register_card(
        &self,
        holder_id: &str,
        card: IssuedCard,
    ) -> Result<AccountHandle, LedgerError> {
        let mut state = self.state.write();
        if state.directory.holder_of(&card.card_number).is_some() {
            return Err(RegistryError::CardExists(card.card_number).into());
        }
        let card_number = card.card_number.clone();
        let registry = state.registry_mut(holder_id)?;
        registry.register_card(card)?;
        let handle = registry
            .account_for_card(&card_number)
            .map(|account| AccountHandle {
                holder_id: holder_id.to_string(),
                account_id: account.id().clone(),
                account_type: account.account_type(),
            })
            .ok_or_else(|| LedgerError::ReferenceNotFound(card_number.clone()))?;
        state.directory.link(card_number, holder_id.to_string());
        Ok(handle)
    }

    pub fn revoke_card(&self, card_number: &str) -> Result<IssuedCard, LedgerError> {
        let mut state = self.state.write();
        let holder_id = state
            .directory
            .holder_of(card_number)
            .ok_or_else(|| LedgerError::ReferenceNotFound(card_number.to_string()))?;
        let card = state
            .registry_mut(&holder_id)?
            .revoke_card(card_number)
            .ok_or_else(|| LedgerError::ReferenceNotFound(card_number.to_string()))?;
        state.directory.unlink(card_number);
        Ok(card)
    }

    /// Finds the account a card draws on.
    pub fn resolve(&self, card_number: &str) -> Result<AccountHandle, LedgerError> {
        let state = self.state.read();
        let (holder_id, account) = state.resolve(card_number)?;
        Ok(AccountHandle {
            holder_id,
            account_id: account.id().clone(),
            account_type: account.account_type(),
        })
    }

    #[instrument(skip(self))]
    pub fn deposit_transaction(
        &self,
        card_number: &str,
        amount: Decimal,
    ) -> Result<TransactionOutcome, LedgerError> {
        self.transact(card_number, TransactionCommand::deposit(amount))
    }

    #[instrument(skip(self))]
    pub fn withdrawal_transaction(
        &self,
        card_number: &str,
        amount: Decimal,
    ) -> Result<TransactionOutcome, LedgerError> {
        self.transact(card_number, TransactionCommand::withdraw(amount))
    }

    /// Unknown cards surface as errors, business rule denials come back as
    /// an unsuccessful outcome.
    fn transact(
        &self,
        card_number: &str,
        command: TransactionCommand,
    ) -> Result<TransactionOutcome, LedgerError> {
        let state = self.state.read();
        let (_, account) = state.resolve(card_number).inspect_err(|_| {
            warn!(card = %card_number, "Unknown card reference");
        })?;
        let result = account.execute(command);
        if let Err(err) = &result {
            warn!(account = %account.id(), action = ?command.action, error = %err, "Transaction denied");
        }
        Ok(result.into())
    }

    pub fn set_account_status(
        &self,
        holder_id: &str,
        account_id: &str,
        status: AccountStatus,
    ) -> Result<(), LedgerError> {
        let state = self.state.read();
        let account = state
            .registry(holder_id)?
            .account(account_id)
            .ok_or_else(|| RegistryError::AccountNotFound(account_id.to_string()))?;
        account.set_status(status)?;
        info!(holder = %holder_id, account = %account_id, status = %status, "Account status set");
        Ok(())
    }

    /// Runs `f` against the registry of a holder under the read lock.
    pub fn inspect<T>(
        &self,
        holder_id: &str,
        f: impl FnOnce(&AccountRegistry) -> T,
    ) -> Result<T, LedgerError> {
        let state = self.state.read();
        Ok(f(state.registry(holder_id)?))
    }

    pub fn holder_balance(&self, holder_id: &str) -> Result<Decimal, LedgerError> {
        self.inspect(holder_id, AccountRegistry::total_balance)?
            .map_err(LedgerError::from)
    }

    pub fn holder_summary(&self, holder_id: &str) -> Result<AccountSummary, LedgerError> {
        self.inspect(holder_id, AccountRegistry::account_summary)
    }

    pub fn snapshot_account(&self, handle: &AccountHandle) -> Result<AccountSnapshot, LedgerError> {
        self.inspect(&handle.holder_id, |registry| {
            registry
                .account(&handle.account_id)
                .map(Account::snapshot)
                .ok_or_else(|| RegistryError::AccountNotFound(handle.account_id.clone()))
        })?
        .map_err(LedgerError::from)
    }

    /// Total over every holder's registry, recomputed on every call.
    pub fn bank_balance(&self) -> Result<Decimal, LedgerError> {
        self.state
            .read()
            .registries
            .values()
            .try_fold(Decimal::ZERO, |total, registry| {
                total
                    .checked_add(registry.total_balance()?)
                    .ok_or(LedgerError::BalanceOverflow)
            })
    }

    /// Applies a parsed command. Only transactions produce an outcome.
    pub fn process(&self, command: LedgerCommand) -> Result<Option<TransactionOutcome>, LedgerError> {
        match command {
            LedgerCommand::RegisterHolder { holder_id } => {
                self.register_holder(AccountRegistry::new(holder_id))?;
            }
            LedgerCommand::OpenAccount { holder_id, account } => {
                self.open_account(&holder_id, account)?;
            }
            LedgerCommand::IssueCard { holder_id, card } => {
                self.register_card(&holder_id, card)?;
            }
            LedgerCommand::Transact {
                card_number,
                command,
            } => return self.transact(&card_number, command).map(Some),
            LedgerCommand::SetStatus {
                holder_id,
                account_id,
                status,
            } => {
                self.set_account_status(&holder_id, &account_id, status)?;
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::prelude::Zero;
    use rust_decimal_macros::dec;

    use super::*;

    const CARD: &str = "40001|101-checking-1";

    fn ledger() -> Ledger {
        let ledger = Ledger::default();
        ledger.register_holder(AccountRegistry::new("101")).unwrap();
        ledger
            .open_account("101", NewAccount::checking("101-checking-1", dec!(1000.00)))
            .unwrap();
        ledger
            .register_card("101", IssuedCard::new(CARD, "101-checking-1"))
            .unwrap();
        ledger
    }

    #[test]
    fn resolve_card() {
        let ledger = ledger();
        let handle = ledger.resolve(CARD).unwrap();
        assert_eq!(
            handle,
            AccountHandle {
                holder_id: "101".to_string(),
                account_id: "101-checking-1".to_string(),
                account_type: AccountType::Checking,
            }
        );

        let err = ledger.resolve("99999").unwrap_err();
        assert!(matches!(err, LedgerError::ReferenceNotFound(card) if card == "99999"));
    }

    #[test]
    fn transactions_produce_outcomes() {
        let ledger = ledger();
        let outcome = ledger.deposit_transaction(CARD, dec!(500.00)).unwrap();
        assert!(outcome.status);
        assert_eq!(outcome.new_balance, Some(dec!(1500.00)));
        assert!(outcome.transaction_time.is_some());
        assert!(outcome.error.is_none());

        let outcome = ledger.withdrawal_transaction(CARD, dec!(2000.00)).unwrap();
        assert!(!outcome.status);
        assert_eq!(outcome.new_balance, None);
        assert_eq!(
            outcome.error,
            Some(AccountError::InsufficientBalance {
                balance: dec!(1500.00),
                amount: dec!(2000.00)
            })
        );
        assert_eq!(ledger.bank_balance().unwrap(), dec!(1500.00));

        // unknown references are not folded into the outcome
        let err = ledger.withdrawal_transaction("nope", dec!(1)).unwrap_err();
        assert!(matches!(err, LedgerError::ReferenceNotFound(_)));
    }

    #[test]
    fn configured_withdrawal_limit() {
        let config = LedgerConfig {
            withdrawal_limit: dec!(100),
            ..Default::default()
        };
        let ledger = Ledger::new(&config);
        ledger.register_holder(AccountRegistry::new("7")).unwrap();
        ledger
            .open_account("7", NewAccount::checking("7-a", dec!(1000)))
            .unwrap();
        ledger
            .open_account("7", NewAccount::checking("7-b", dec!(1000)).with_withdrawal_limit(dec!(900)))
            .unwrap();
        ledger.register_card("7", IssuedCard::new("a", "7-a")).unwrap();
        ledger.register_card("7", IssuedCard::new("b", "7-b")).unwrap();

        let outcome = ledger.withdrawal_transaction("a", dec!(150)).unwrap();
        assert_eq!(outcome.error, Some(AccountError::ExceedsLimit { limit: dec!(100) }));
        let outcome = ledger.withdrawal_transaction("b", dec!(150)).unwrap();
        assert_eq!(outcome.new_balance, Some(dec!(850)));
    }

    #[test]
    fn configured_limit_reaches_registered_holders() {
        let config = LedgerConfig {
            withdrawal_limit: dec!(100),
            ..Default::default()
        };
        let ledger = Ledger::new(&config);
        let mut registry = AccountRegistry::new("8");
        registry
            .open_account(NewAccount::checking("8-a", dec!(1000)))
            .unwrap();
        registry
            .open_account(NewAccount::savings("8-b", dec!(1000)).with_withdrawal_limit(dec!(900)))
            .unwrap();
        registry.register_card(IssuedCard::new("a", "8-a")).unwrap();
        registry.register_card(IssuedCard::new("b", "8-b")).unwrap();
        ledger.register_holder(registry).unwrap();

        let outcome = ledger.withdrawal_transaction("a", dec!(150)).unwrap();
        assert_eq!(outcome.error, Some(AccountError::ExceedsLimit { limit: dec!(100) }));
        let outcome = ledger.withdrawal_transaction("b", dec!(150)).unwrap();
        assert_eq!(outcome.new_balance, Some(dec!(850)));
        let snapshot = ledger.snapshot_account(&ledger.resolve("a").unwrap()).unwrap();
        assert_eq!(snapshot.withdrawal_limit, dec!(100));
    }

    #[test]
    fn deposit_overflow_is_denied() {
        let ledger = ledger();
        let outcome = ledger.deposit_transaction(CARD, Decimal::MAX).unwrap();
        assert!(!outcome.status);
        assert_eq!(
            outcome.error,
            Some(AccountError::BalanceOverflow {
                balance: dec!(1000.00),
                amount: Decimal::MAX
            })
        );
        assert_eq!(ledger.bank_balance().unwrap(), dec!(1000.00));
    }

    #[test]
    fn bank_balance_overflow() {
        let ledger = Ledger::default();
        for holder in ["1", "2"] {
            let mut registry = AccountRegistry::new(holder);
            registry
                .open_account(NewAccount::checking(format!("{holder}-a"), Decimal::MAX))
                .unwrap();
            ledger.register_holder(registry).unwrap();
        }
        assert_eq!(ledger.holder_balance("1").unwrap(), Decimal::MAX);
        assert!(matches!(
            ledger.bank_balance().unwrap_err(),
            LedgerError::BalanceOverflow
        ));

        ledger
            .open_account("2", NewAccount::savings("2-b", Decimal::MAX))
            .unwrap();
        assert!(matches!(
            ledger.holder_balance("2").unwrap_err(),
            LedgerError::Registry(RegistryError::BalanceOverflow(holder)) if holder == "2"
        ));
        assert!(matches!(
            ledger.bank_balance().unwrap_err(),
            LedgerError::Registry(RegistryError::BalanceOverflow(_))
        ));
    }

    #[test]
    fn holder_registration() {
        let ledger = ledger();
        let err = ledger.register_holder(AccountRegistry::new("101")).unwrap_err();
        assert!(matches!(err, LedgerError::HolderExists(id) if id == "101"));

        let err = ledger
            .open_account("202", NewAccount::savings("202-savings-1", dec!(0.25)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::HolderNotFound(_)));

        // cards issued before registration resolve once registered
        let mut registry = AccountRegistry::new("202");
        registry
            .open_account(NewAccount::savings("202-savings-1", dec!(0.25)))
            .unwrap();
        registry
            .register_card(IssuedCard::new("50001|202-savings-1", "202-savings-1"))
            .unwrap();
        ledger.register_holder(registry).unwrap();
        assert_eq!(ledger.resolve("50001|202-savings-1").unwrap().holder_id, "202");
        assert_eq!(ledger.holders(), vec!["101".to_string(), "202".to_string()]);
        assert_eq!(ledger.bank_balance().unwrap(), dec!(1000.25));
    }

    #[test]
    fn card_numbers_are_unique_across_holders() {
        let ledger = ledger();
        let mut registry = AccountRegistry::new("202");
        registry
            .open_account(NewAccount::checking("202-checking-1", dec!(1)))
            .unwrap();
        registry
            .register_card(IssuedCard::new(CARD, "202-checking-1"))
            .unwrap();
        let err = ledger.register_holder(registry).unwrap_err();
        assert!(matches!(err, LedgerError::Registry(RegistryError::CardExists(_))));
        assert!(!ledger.contains_holder("202"));

        ledger.register_holder(AccountRegistry::new("202")).unwrap();
        ledger
            .open_account("202", NewAccount::checking("202-checking-1", dec!(1)))
            .unwrap();
        let err = ledger
            .register_card("202", IssuedCard::new(CARD, "202-checking-1"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Registry(RegistryError::CardExists(_))));
        assert_eq!(ledger.resolve(CARD).unwrap().holder_id, "101");
    }

    #[test]
    fn revoke_card() {
        let ledger = ledger();
        let card = ledger.revoke_card(CARD).unwrap();
        assert_eq!(card.account_id, "101-checking-1");
        assert!(matches!(
            ledger.deposit_transaction(CARD, dec!(1)).unwrap_err(),
            LedgerError::ReferenceNotFound(_)
        ));
        assert!(matches!(
            ledger.revoke_card(CARD).unwrap_err(),
            LedgerError::ReferenceNotFound(_)
        ));
    }

    #[test]
    fn status_changes() {
        let ledger = ledger();
        ledger
            .set_account_status("101", "101-checking-1", AccountStatus::Locked)
            .unwrap();
        let outcome = ledger.deposit_transaction(CARD, dec!(1.00)).unwrap();
        assert!(!outcome.status);
        assert!(matches!(outcome.error, Some(AccountError::AccountNotOpen { .. })));

        ledger
            .set_account_status("101", "101-checking-1", AccountStatus::Closed)
            .unwrap();
        let err = ledger
            .set_account_status("101", "101-checking-1", AccountStatus::Open)
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Account(AccountError::InvalidStatusTransition { .. })
        ));
        let err = ledger
            .set_account_status("101", "101-checking-9", AccountStatus::Open)
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Registry(RegistryError::AccountNotFound(_))
        ));
    }

    #[test]
    fn reporting() {
        let ledger = ledger();
        ledger
            .open_account("101", NewAccount::credit("101-credit-1", Decimal::zero()))
            .unwrap();
        assert_eq!(ledger.holder_balance("101").unwrap(), dec!(1000.00));
        assert_eq!(
            ledger.holder_summary("101").unwrap(),
            AccountSummary {
                checking: 1,
                savings: 0,
                credit: 1
            }
        );
        let snapshot = ledger.snapshot_account(&ledger.resolve(CARD).unwrap()).unwrap();
        assert_eq!(snapshot.balance, dec!(1000.00));
        assert_eq!(snapshot.linked_cards, vec![CARD.to_string()]);
        assert!(matches!(
            ledger.holder_balance("999").unwrap_err(),
            LedgerError::HolderNotFound(_)
        ));
    }

    #[test]
    fn outcome_from_denial() {
        let outcome = TransactionOutcome::from(Err(AccountError::ExceedsLimit { limit: dec!(5000) }));
        assert!(!outcome.status);
        assert_eq!(outcome.error, Some(AccountError::ExceedsLimit { limit: dec!(5000) }));
    }
}
