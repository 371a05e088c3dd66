//! Replays a CSV script of ledger operations and reports holder balances.
//! It bootstraps [`crate::ledger::Ledger`] for the binary and the
//! integration tests; the ledger itself knows nothing about CSV.

use std::io::{Read, Write};

use crate::{
    account::{AccountError, AccountType},
    command::{CommandError, LedgerCommand},
    config::LedgerConfig,
    ledger::{Ledger, LedgerError},
    registry::RegistryError,
};
use anyhow::Result;
use csv_parser::CsvOperationParser;
use csv_printer::{HolderBalance, print_balances};
use thiserror::Error;
use tracing::info;
pub mod csv_parser;
pub mod csv_printer;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Malformed row: {0}")]
    Parse(#[from] csv::Error),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Business rule denial of a deposit or withdrawal.
    #[error("Transaction denied: {0}")]
    Denied(AccountError),
}

pub struct Service<'w, R, W: 'w> {
    pub config: LedgerConfig,
    pub input: R,
    pub output: &'w mut W,
    pub error_printer: Box<dyn FnMut(u64, ReplayError)>,
}

impl<'w, R, W> Service<'w, R, W>
where
    R: Read,
    W: Write + 'w,
{
    pub fn run(mut self) -> Result<()> {
        let parser = CsvOperationParser::new(self.input);

        let ledger = Ledger::new(&self.config);

        for (line, row) in parser {
            if let Err(err) = Self::replay(&ledger, row) {
                (self.error_printer)(line, err);
            }
        }

        let bank_balance = ledger.bank_balance()?;
        info!(
            institution = %ledger.institution(),
            bank_balance = %bank_balance,
            "Replay finished"
        );

        let mut balances = Vec::new();
        for holder_id in ledger.holders() {
            let balance = ledger.inspect(&holder_id, |registry| {
                Ok::<_, RegistryError>(HolderBalance {
                    holder: holder_id.clone(),
                    checking: registry.kind_balance(AccountType::Checking)?,
                    savings: registry.kind_balance(AccountType::Savings)?,
                    credit: registry.kind_balance(AccountType::Credit)?,
                    total: registry.total_balance()?,
                })
            })??;
            balances.push(balance);
        }
        print_balances(self.output, balances)
    }

    fn replay(
        ledger: &Ledger,
        row: csv::Result<csv_parser::Operation>,
    ) -> std::result::Result<(), ReplayError> {
        let (kind, fields) = row?.into_parts();
        let command = LedgerCommand::parse_command(kind, fields)?;
        match ledger.process(command)? {
            Some(outcome) => match outcome.error {
                Some(err) => Err(ReplayError::Denied(err)),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }
}
