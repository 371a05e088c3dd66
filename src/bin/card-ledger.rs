use std::fs::File;

use anyhow::{Context, Result};
use card_ledger::{
    bin_utils::{ReplayError, Service},
    config::LedgerConfig,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // stdout carries the report, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = LedgerConfig::from_env();
    config.validate().context("Invalid ledger configuration")?;

    let filename = std::env::args()
        .nth(1)
        .context("Expected a file name as the first argument")?;
    let file = File::open(&filename).with_context(|| format!("Failed to open `{filename}`"))?;

    let service = Service {
        config,
        input: file,
        output: &mut std::io::stdout(),
        error_printer: Box::new(|line, err| {
            match err {
                ReplayError::Denied(_) => {
                    // business rule denials are already logged by the ledger
                }
                err => eprintln!("Error at line {line}: {err}"),
            }
        }),
    };
    service.run()
}
