use rust_decimal::{Decimal, prelude::Zero};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    account::{AccountId, AccountStatus, AccountType, CardNumber, NewAccount},
    registry::{HolderId, IssuedCard},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionAction {
    Deposit,
    Withdraw,
}

/// A balance mutation addressed to a single account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionCommand {
    pub action: TransactionAction,
    pub amount: Decimal,
}

impl TransactionCommand {
    pub fn deposit(amount: Decimal) -> Self {
        Self {
            action: TransactionAction::Deposit,
            amount,
        }
    }

    pub fn withdraw(amount: Decimal) -> Self {
        Self {
            action: TransactionAction::Withdraw,
            amount,
        }
    }
}

/// Operation kinds understood by [`LedgerCommand::parse_command`].
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Holder,
    Open,
    Card,
    Deposit,
    Withdrawal,
    Lock,
    Unlock,
    Close,
}

/// Loosely typed operation arguments, as they come from an external source.
#[derive(Debug, Clone, Default)]
pub struct OperationFields {
    pub holder: Option<HolderId>,
    pub account: Option<AccountId>,
    pub account_type: Option<AccountType>,
    pub card: Option<CardNumber>,
    pub amount: Option<Decimal>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Field `{field}` is required for {kind:?}")]
    FieldRequired {
        kind: OperationKind,
        field: &'static str,
    },
}

#[derive(Debug, Clone)]
pub enum LedgerCommand {
    RegisterHolder {
        holder_id: HolderId,
    },
    OpenAccount {
        holder_id: HolderId,
        account: NewAccount,
    },
    IssueCard {
        holder_id: HolderId,
        card: IssuedCard,
    },
    Transact {
        card_number: CardNumber,
        command: TransactionCommand,
    },
    SetStatus {
        holder_id: HolderId,
        account_id: AccountId,
        status: AccountStatus,
    },
}

impl LedgerCommand {
    pub fn parse_command(
        kind: OperationKind,
        fields: OperationFields,
    ) -> Result<Self, CommandError> {
        let OperationFields {
            holder,
            account,
            account_type,
            card,
            amount,
        } = fields;
        let require = |value: Option<String>, field| {
            value.ok_or(CommandError::FieldRequired { kind, field })
        };

        match kind {
            OperationKind::Holder => Ok(Self::RegisterHolder {
                holder_id: require(holder, "holder")?,
            }),
            OperationKind::Open => {
                let account_type = account_type.ok_or(CommandError::FieldRequired {
                    kind,
                    field: "account_type",
                })?;
                Ok(Self::OpenAccount {
                    holder_id: require(holder, "holder")?,
                    account: NewAccount::new(
                        require(account, "account")?,
                        account_type.into(),
                        amount.unwrap_or_else(Decimal::zero),
                    ),
                })
            }
            OperationKind::Card => Ok(Self::IssueCard {
                holder_id: require(holder, "holder")?,
                card: IssuedCard::new(require(card, "card")?, require(account, "account")?),
            }),
            OperationKind::Deposit => Ok(Self::Transact {
                card_number: require(card, "card")?,
                command: TransactionCommand::deposit(Self::require_amount(kind, amount)?),
            }),
            OperationKind::Withdrawal => Ok(Self::Transact {
                card_number: require(card, "card")?,
                command: TransactionCommand::withdraw(Self::require_amount(kind, amount)?),
            }),
            OperationKind::Lock => {
                Self::parse_status_command(kind, holder, account, AccountStatus::Locked)
            }
            OperationKind::Unlock => {
                Self::parse_status_command(kind, holder, account, AccountStatus::Open)
            }
            OperationKind::Close => {
                Self::parse_status_command(kind, holder, account, AccountStatus::Closed)
            }
        }
    }

    fn require_amount(
        kind: OperationKind,
        amount: Option<Decimal>,
    ) -> Result<Decimal, CommandError> {
        amount.ok_or(CommandError::FieldRequired {
            kind,
            field: "amount",
        })
    }

    fn parse_status_command(
        kind: OperationKind,
        holder: Option<HolderId>,
        account: Option<AccountId>,
        status: AccountStatus,
    ) -> Result<Self, CommandError> {
        let Some(holder_id) = holder else {
            return Err(CommandError::FieldRequired {
                kind,
                field: "holder",
            });
        };
        let Some(account_id) = account else {
            return Err(CommandError::FieldRequired {
                kind,
                field: "account",
            });
        };
        Ok(Self::SetStatus {
            holder_id,
            account_id,
            status,
        })
    }
}
