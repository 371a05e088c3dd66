use std::{collections::HashMap, fmt};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::account::{Account, AccountId, AccountType, CardNumber, NewAccount};

pub type HolderId = String;

/// Card metadata kept next to the account it draws on. PIN, CVV and expiry
/// checks happen outside of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCard {
    pub card_number: CardNumber,
    pub account_id: AccountId,
    pub cardholder: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

impl IssuedCard {
    pub fn new(card_number: impl Into<CardNumber>, account_id: impl Into<AccountId>) -> Self {
        Self {
            card_number: card_number.into(),
            account_id: account_id.into(),
            cardholder: None,
            expiry_date: None,
        }
    }

    pub fn with_cardholder(self, cardholder: impl Into<String>) -> Self {
        Self {
            cardholder: Some(cardholder.into()),
            ..self
        }
    }

    pub fn with_expiry_date(self, expiry_date: NaiveDate) -> Self {
        Self {
            expiry_date: Some(expiry_date),
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Account {0} already exists")]
    AccountExists(AccountId),
    #[error("Account {0} does not belong to this holder")]
    AccountNotFound(AccountId),
    #[error("Card {0} is already issued")]
    CardExists(CardNumber),
    #[error("Balance of holder {0} exceeds the representable range")]
    BalanceOverflow(HolderId),
}

/// Number of accounts per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub checking: usize,
    pub savings: usize,
    pub credit: usize,
}

impl fmt::Display for AccountSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Accounts: Checking: {}, Savings: {}, Credit: {}",
            self.checking, self.savings, self.credit
        )
    }
}

#[derive(Debug)]
struct CardEntry {
    card: IssuedCard,
    account_type: AccountType,
}

/// All accounts of one holder, partitioned by kind, plus the cards issued
/// against them.
#[derive(Debug)]
pub struct AccountRegistry {
    holder_id: HolderId,
    checking_accounts: HashMap<AccountId, Account>,
    savings_accounts: HashMap<AccountId, Account>,
    credit_accounts: HashMap<AccountId, Account>,
    issued_cards: HashMap<CardNumber, CardEntry>,
}

impl AccountRegistry {
    pub fn new(holder_id: impl Into<HolderId>) -> Self {
        Self {
            holder_id: holder_id.into(),
            checking_accounts: HashMap::new(),
            savings_accounts: HashMap::new(),
            credit_accounts: HashMap::new(),
            issued_cards: HashMap::new(),
        }
    }

    pub fn holder_id(&self) -> &HolderId {
        &self.holder_id
    }

    fn accounts_of(&self, account_type: AccountType) -> &HashMap<AccountId, Account> {
        match account_type {
            AccountType::Checking => &self.checking_accounts,
            AccountType::Savings => &self.savings_accounts,
            AccountType::Credit => &self.credit_accounts,
        }
    }

    fn accounts_of_mut(&mut self, account_type: AccountType) -> &mut HashMap<AccountId, Account> {
        match account_type {
            AccountType::Checking => &mut self.checking_accounts,
            AccountType::Savings => &mut self.savings_accounts,
            AccountType::Credit => &mut self.credit_accounts,
        }
    }

    /// Opens an account in the map matching its kind. Ids are unique across
    /// all kinds of one holder.
    pub fn open_account(&mut self, new_account: NewAccount) -> Result<&Account, RegistryError> {
        if self.account(&new_account.id).is_some() {
            return Err(RegistryError::AccountExists(new_account.id));
        }
        let account = Account::new(new_account);
        debug!(
            holder = %self.holder_id,
            account = %account.id(),
            account_type = ?account.account_type(),
            balance = %account.balance(),
            "Account opened"
        );
        let account_id = account.id().clone();
        Ok(self
            .accounts_of_mut(account.account_type())
            .entry(account_id)
            .or_insert(account))
    }

    pub fn account(&self, account_id: &str) -> Option<&Account> {
        self.checking_accounts
            .get(account_id)
            .or_else(|| self.savings_accounts.get(account_id))
            .or_else(|| self.credit_accounts.get(account_id))
    }

    fn account_mut(&mut self, account_id: &str) -> Option<&mut Account> {
        if let Some(account) = self.checking_accounts.get_mut(account_id) {
            return Some(account);
        }
        if let Some(account) = self.savings_accounts.get_mut(account_id) {
            return Some(account);
        }
        self.credit_accounts.get_mut(account_id)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.checking_accounts
            .values()
            .chain(self.savings_accounts.values())
            .chain(self.credit_accounts.values())
    }

    /// Balance over every account of the holder, recomputed on each call.
    pub fn total_balance(&self) -> Result<Decimal, RegistryError> {
        [AccountType::Checking, AccountType::Savings, AccountType::Credit]
            .into_iter()
            .try_fold(Decimal::ZERO, |total, account_type| {
                self.checked_add(total, self.kind_balance(account_type)?)
            })
    }

    pub fn kind_balance(&self, account_type: AccountType) -> Result<Decimal, RegistryError> {
        self.accounts_of(account_type)
            .values()
            .try_fold(Decimal::ZERO, |total, account| {
                self.checked_add(total, account.balance())
            })
    }

    fn checked_add(&self, total: Decimal, balance: Decimal) -> Result<Decimal, RegistryError> {
        total
            .checked_add(balance)
            .ok_or_else(|| RegistryError::BalanceOverflow(self.holder_id.clone()))
    }

    /// Gives every account opened without a withdrawal limit the given one.
    pub(crate) fn fill_withdrawal_limits(&mut self, limit: Decimal) {
        self.checking_accounts
            .values_mut()
            .chain(self.savings_accounts.values_mut())
            .chain(self.credit_accounts.values_mut())
            .for_each(|account| account.fill_withdrawal_limit(limit));
    }

    pub fn account_summary(&self) -> AccountSummary {
        AccountSummary {
            checking: self.checking_accounts.len(),
            savings: self.savings_accounts.len(),
            credit: self.credit_accounts.len(),
        }
    }

    /// Records an issued card and links it onto its account.
    pub fn register_card(&mut self, card: IssuedCard) -> Result<(), RegistryError> {
        if self.issued_cards.contains_key(&card.card_number) {
            return Err(RegistryError::CardExists(card.card_number));
        }
        let Some(account) = self.account_mut(&card.account_id) else {
            return Err(RegistryError::AccountNotFound(card.account_id));
        };
        account.link_card(card.card_number.clone());
        let account_type = account.account_type();
        debug!(holder = %self.holder_id, card = %card.card_number, account = %card.account_id, "Card registered");
        self.issued_cards
            .insert(card.card_number.clone(), CardEntry { card, account_type });
        Ok(())
    }

    /// Drops a card from the registry and unlinks it from its account.
    pub fn revoke_card(&mut self, card_number: &str) -> Option<IssuedCard> {
        let entry = self.issued_cards.remove(card_number)?;
        if let Some(account) = self
            .accounts_of_mut(entry.account_type)
            .get_mut(&entry.card.account_id)
        {
            account.unlink_card(card_number);
        }
        Some(entry.card)
    }

    pub fn issued_card(&self, card_number: &str) -> Option<&IssuedCard> {
        self.issued_cards.get(card_number).map(|entry| &entry.card)
    }

    pub fn issued_cards(&self) -> impl Iterator<Item = &IssuedCard> {
        self.issued_cards.values().map(|entry| &entry.card)
    }

    pub fn account_for_card(&self, card_number: &str) -> Option<&Account> {
        let entry = self.issued_cards.get(card_number)?;
        self.accounts_of(entry.account_type)
            .get(&entry.card.account_id)
    }
}
