use std::io::Write;

use anyhow::Context;
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::registry::HolderId;

/// Balance report line for one account holder.
#[derive(Debug, Serialize)]
pub struct HolderBalance {
    pub holder: HolderId,
    pub checking: Decimal,
    pub savings: Decimal,
    pub credit: Decimal,
    pub total: Decimal,
}

/// Writes one CSV line per holder, preceded by a header.
pub fn print_balances<W: Write>(
    output: &mut W,
    balances: impl IntoIterator<Item = HolderBalance>,
) -> anyhow::Result<()> {
    let mut writer = Writer::from_writer(output);
    for balance in balances {
        let holder = balance.holder.clone();
        writer
            .serialize(balance)
            .with_context(|| format!("Failed to write balance of holder {holder}"))?;
    }
    writer.flush().context("Failed to flush balance report")?;
    Ok(())
}
