use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::{Decimal, prelude::Zero};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::command::{TransactionAction, TransactionCommand};

pub type AccountId = String;
pub type CardNumber = String;

/// Single withdrawal cap applied when the opener does not provide one.
pub const DEFAULT_WITHDRAWAL_LIMIT: Decimal = Decimal::from_parts(5000, 0, 0, false, 0);
/// 0.001
pub const DEFAULT_INTEREST_RATE: Decimal = Decimal::from_parts(1, 0, 0, false, 3);
/// 0.15
pub const DEFAULT_APR_RATE: Decimal = Decimal::from_parts(15, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Open,
    Locked,
    Closed,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Open => f.write_str("open"),
            AccountStatus::Locked => f.write_str("locked"),
            AccountStatus::Closed => f.write_str("closed"),
        }
    }
}

/// Kind tag without payload, used to partition accounts inside a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Checking,
    Savings,
    Credit,
}

/// Account kind together with the rate it carries. Rates are stored only,
/// transactions never look at them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Checking,
    Savings { interest_rate: Decimal },
    Credit { apr_rate: Decimal },
}

impl AccountKind {
    pub fn account_type(&self) -> AccountType {
        match self {
            AccountKind::Checking => AccountType::Checking,
            AccountKind::Savings { .. } => AccountType::Savings,
            AccountKind::Credit { .. } => AccountType::Credit,
        }
    }
}

impl From<AccountType> for AccountKind {
    fn from(account_type: AccountType) -> Self {
        match account_type {
            AccountType::Checking => AccountKind::Checking,
            AccountType::Savings => AccountKind::Savings {
                interest_rate: DEFAULT_INTEREST_RATE,
            },
            AccountType::Credit => AccountKind::Credit {
                apr_rate: DEFAULT_APR_RATE,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum AccountError {
    #[error("{action:?} amount must not be negative")]
    NegativeAmount { action: TransactionAction },
    #[error("Account {id} is unable to transact because it maintains the status: {status}")]
    AccountNotOpen { id: AccountId, status: AccountStatus },
    #[error("Overdrawing account limit is prohibited, limited to {limit} per transaction")]
    ExceedsLimit { limit: Decimal },
    #[error("Overdrawing account is prohibited, balance {balance} is less than {amount}")]
    InsufficientBalance { balance: Decimal, amount: Decimal },
    #[error("Depositing {amount} would overflow balance {balance}")]
    BalanceOverflow { balance: Decimal, amount: Decimal },
    #[error("Account {id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        id: AccountId,
        from: AccountStatus,
        to: AccountStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountEventKind {
    Deposited,
    Withdrawn,
}

#[derive(Debug, Clone, Copy)]
pub struct AccountEvent {
    amount: Decimal,
    kind: AccountEventKind,
}

/// Proof of an applied deposit or withdrawal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub success: bool,
    pub new_balance: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Parameters for opening an account. Anything left as `None` is filled in
/// at the moment the account is built.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: AccountId,
    pub kind: AccountKind,
    pub opening_balance: Decimal,
    pub open_date: Option<NaiveDate>,
    pub status: AccountStatus,
    pub withdrawal_limit: Option<Decimal>,
}

impl NewAccount {
    pub fn new(id: impl Into<AccountId>, kind: AccountKind, opening_balance: Decimal) -> Self {
        Self {
            id: id.into(),
            kind,
            opening_balance,
            open_date: None,
            status: AccountStatus::Open,
            withdrawal_limit: None,
        }
    }

    pub fn checking(id: impl Into<AccountId>, opening_balance: Decimal) -> Self {
        Self::new(id, AccountType::Checking.into(), opening_balance)
    }

    pub fn savings(id: impl Into<AccountId>, opening_balance: Decimal) -> Self {
        Self::new(id, AccountType::Savings.into(), opening_balance)
    }

    pub fn credit(id: impl Into<AccountId>, opening_balance: Decimal) -> Self {
        Self::new(id, AccountType::Credit.into(), opening_balance)
    }

    pub fn with_open_date(self, open_date: NaiveDate) -> Self {
        Self {
            open_date: Some(open_date),
            ..self
        }
    }

    pub fn with_status(self, status: AccountStatus) -> Self {
        Self { status, ..self }
    }

    pub fn with_withdrawal_limit(self, limit: Decimal) -> Self {
        Self {
            withdrawal_limit: Some(limit),
            ..self
        }
    }
}

/// Serializable point-in-time copy of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: AccountId,
    pub kind: AccountKind,
    pub balance: Decimal,
    pub status: AccountStatus,
    pub withdrawal_limit: Decimal,
    pub open_date: NaiveDate,
    pub linked_cards: Vec<CardNumber>,
}

/// The part of an account that transactions mutate. Always accessed through
/// the owning account's mutex.
#[derive(Debug)]
struct AccountState {
    balance: Decimal,
    status: AccountStatus,
}

impl AccountState {
    fn apply(&mut self, event: &AccountEvent) {
        match event.kind {
            AccountEventKind::Deposited => {
                self.balance += event.amount;
            }
            AccountEventKind::Withdrawn => {
                self.balance -= event.amount;
            }
        }
    }
}

#[derive(Debug)]
pub struct Account {
    id: AccountId,
    kind: AccountKind,
    open_date: NaiveDate,
    withdrawal_limit: Option<Decimal>,
    linked_cards: BTreeSet<CardNumber>,
    state: Mutex<AccountState>,
}

impl Account {
    pub fn new(new_account: NewAccount) -> Self {
        let NewAccount {
            id,
            kind,
            opening_balance,
            open_date,
            status,
            withdrawal_limit,
        } = new_account;
        Self {
            id,
            kind,
            // today is taken per call, never cached
            open_date: open_date.unwrap_or_else(|| Utc::now().date_naive()),
            withdrawal_limit,
            linked_cards: BTreeSet::new(),
            state: Mutex::new(AccountState {
                balance: opening_balance.max(Decimal::zero()),
                status,
            }),
        }
    }

    /// Rebuilds an account from a stored snapshot.
    pub fn restore(snapshot: AccountSnapshot) -> Self {
        Self {
            id: snapshot.id,
            kind: snapshot.kind,
            open_date: snapshot.open_date,
            withdrawal_limit: Some(snapshot.withdrawal_limit),
            linked_cards: snapshot.linked_cards.into_iter().collect(),
            state: Mutex::new(AccountState {
                balance: snapshot.balance.max(Decimal::zero()),
                status: snapshot.status,
            }),
        }
    }

    pub fn id(&self) -> &AccountId {
        &self.id
    }

    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    pub fn account_type(&self) -> AccountType {
        self.kind.account_type()
    }

    pub fn open_date(&self) -> NaiveDate {
        self.open_date
    }

    /// Per transaction withdrawal cap. Falls back to
    /// [`DEFAULT_WITHDRAWAL_LIMIT`] while no limit has been assigned.
    pub fn withdrawal_limit(&self) -> Decimal {
        self.withdrawal_limit.unwrap_or(DEFAULT_WITHDRAWAL_LIMIT)
    }

    /// Assigns `limit` unless the account was opened with its own.
    pub(crate) fn fill_withdrawal_limit(&mut self, limit: Decimal) {
        self.withdrawal_limit.get_or_insert(limit);
    }

    pub fn linked_cards(&self) -> impl Iterator<Item = &CardNumber> {
        self.linked_cards.iter()
    }

    pub fn balance(&self) -> Decimal {
        self.state.lock().balance
    }

    pub fn status(&self) -> AccountStatus {
        self.state.lock().status
    }

    pub(crate) fn link_card(&mut self, card_number: CardNumber) -> bool {
        self.linked_cards.insert(card_number)
    }

    pub(crate) fn unlink_card(&mut self, card_number: &str) -> bool {
        self.linked_cards.remove(card_number)
    }

    pub fn deposit(&self, amount: Decimal) -> Result<Receipt, AccountError> {
        self.execute(TransactionCommand::deposit(amount))
    }

    pub fn withdraw(&self, amount: Decimal) -> Result<Receipt, AccountError> {
        self.execute(TransactionCommand::withdraw(amount))
    }

    /// Validates and applies a command while holding the account lock, so
    /// concurrent callers on the same account are serialized.
    pub fn execute(&self, command: TransactionCommand) -> Result<Receipt, AccountError> {
        let mut state = self.state.lock();
        let event = self.handle_transaction(&state, command)?;
        state.apply(&event);
        debug!(
            account = %self.id,
            kind = ?event.kind,
            amount = %event.amount,
            balance = %state.balance,
            "Transaction applied"
        );
        Ok(Receipt {
            success: true,
            new_balance: state.balance,
            timestamp: Utc::now(),
        })
    }

    fn handle_transaction(
        &self,
        state: &AccountState,
        command: TransactionCommand,
    ) -> Result<AccountEvent, AccountError> {
        let TransactionCommand { action, amount } = command;
        if amount < Decimal::zero() {
            return Err(AccountError::NegativeAmount { action });
        }
        if state.status != AccountStatus::Open {
            return Err(AccountError::AccountNotOpen {
                id: self.id.clone(),
                status: state.status,
            });
        }

        match action {
            TransactionAction::Deposit => match state.balance.checked_add(amount) {
                Some(_) => Ok(AccountEvent {
                    amount,
                    kind: AccountEventKind::Deposited,
                }),
                None => Err(AccountError::BalanceOverflow {
                    balance: state.balance,
                    amount,
                }),
            },
            TransactionAction::Withdraw => {
                let limit = self.withdrawal_limit();
                // limit goes first: an oversized withdrawal is never reported as overdraft
                if amount > limit {
                    Err(AccountError::ExceedsLimit { limit })
                } else if amount > state.balance {
                    Err(AccountError::InsufficientBalance {
                        balance: state.balance,
                        amount,
                    })
                } else {
                    Ok(AccountEvent {
                        amount,
                        kind: AccountEventKind::Withdrawn,
                    })
                }
            }
        }
    }

    /// Administrative status change. Open and Locked convert freely, Closed
    /// is terminal.
    pub fn set_status(&self, status: AccountStatus) -> Result<(), AccountError> {
        let mut state = self.state.lock();
        if state.status == AccountStatus::Closed && status != AccountStatus::Closed {
            return Err(AccountError::InvalidStatusTransition {
                id: self.id.clone(),
                from: state.status,
                to: status,
            });
        }
        debug!(account = %self.id, from = %state.status, to = %status, "Status changed");
        state.status = status;
        Ok(())
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        let state = self.state.lock();
        AccountSnapshot {
            id: self.id.clone(),
            kind: self.kind,
            balance: state.balance,
            status: state.status,
            withdrawal_limit: self.withdrawal_limit(),
            open_date: self.open_date,
            linked_cards: self.linked_cards.iter().cloned().collect(),
        }
    }
}
