use std::io::Read;

use crate::{
    account::{AccountId, AccountType, CardNumber},
    command::{OperationFields, OperationKind},
    registry::HolderId,
};
use csv::{DeserializeRecordsIntoIter, Trim};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub holder: Option<HolderId>,
    pub account: Option<AccountId>,
    pub account_type: Option<AccountType>,
    pub card: Option<CardNumber>,
    pub amount: Option<Decimal>,
}

impl Operation {
    pub fn into_parts(self) -> (OperationKind, OperationFields) {
        (
            self.kind,
            OperationFields {
                holder: self.holder,
                account: self.account,
                account_type: self.account_type,
                card: self.card,
                amount: self.amount,
            },
        )
    }
}

/// Parses a list of ledger operations in CSV format. Yields the line number
/// of each row together with the parsed row, or the reason it could not be
/// parsed.
pub struct CsvOperationParser<R> {
    iter: DeserializeRecordsIntoIter<R, Operation>,
}

impl<R> CsvOperationParser<R>
where
    R: Read,
{
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(source);

        Self {
            iter: reader.into_deserialize(),
        }
    }
}

impl<R> Iterator for CsvOperationParser<R>
where
    R: Read,
{
    type Item = (u64, csv::Result<Operation>);

    fn next(&mut self) -> Option<Self::Item> {
        let curr_line = self.iter.reader().position().line();
        self.iter.next().map(|row| (curr_line, row))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn parse_rows() {
        let input = "type,holder,account,account_type,card,amount
open, 101, 101-checking-1, checking, , 1000.00
deposit, , , , 40001|101-checking-1, 2.5
withdrawal,,,,40001|101-checking-1
";
        let rows: Vec<_> = CsvOperationParser::new(input.as_bytes()).collect();
        assert_eq!(rows.len(), 3);

        let open = rows[0].1.as_ref().unwrap();
        assert_eq!(open.kind, OperationKind::Open);
        assert_eq!(open.account_type, Some(AccountType::Checking));
        assert_eq!(open.card, None);
        assert_eq!(open.amount, Some(dec!(1000.00)));

        let deposit = rows[1].1.as_ref().unwrap();
        assert_eq!(deposit.card.as_deref(), Some("40001|101-checking-1"));
        assert_eq!(deposit.amount, Some(dec!(2.5)));

        // short rows are accepted, missing fields are left for command parsing
        let withdrawal = rows[2].1.as_ref().unwrap();
        assert_eq!(withdrawal.amount, None);
    }

    #[test]
    fn report_bad_rows() {
        let input = "type,holder,account,account_type,card,amount
transfer,101,,,,
";
        let rows: Vec<_> = CsvOperationParser::new(input.as_bytes()).collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].1.is_err());
    }
}
