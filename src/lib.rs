/// Single account balance and status, with deposit and withdrawal as
/// guarded transitions. State is modified by events produced from commands.
pub mod account;

/// Transaction commands executed by [`account`], and parsing of loosely
/// typed ledger operations into [`command::LedgerCommand`].
pub mod command;

/// Institution settings.
pub mod config;

/// Card number to account holder resolution.
pub mod directory;

/// Institution wide entry point: routes card transactions to accounts and
/// aggregates balances.
pub mod ledger;

/// Accounts of one holder, partitioned by kind.
pub mod registry;

/// Persistence capability for account snapshots, plus "in memory" implementation.
///
/// NOTE: The ledger never calls it; it is the integration point for a
/// durable backend.
pub mod storage;

/// CSV replay driver for the binary. It could be a crate of its own, but the
/// integration tests drive it too, so it lives here.
pub mod bin_utils;
