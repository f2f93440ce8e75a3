//! BankSim Core
//!
//! Account ledger and transaction-processing core: customers, accounts and
//! transactions, with funds transfers that are atomic, balance-consistent
//! and idempotent under concurrent use.
//!
//! # Architecture
//!
//! - **Identity Store**: customers keyed by id and Aadhar number, hashed PINs
//! - **Account Store**: one row per account number, balances never negative
//! - **Ledger Engine**: validate, lock, commit, log, notify
//! - **Transaction Log**: append-only rows, two per transfer
//! - **Notifier**: best-effort delivery on its own task
//!
//! # Invariants
//!
//! - Money conservation: every transfer debits and credits the same amount
//! - Non-negativity: no committed state has a negative balance
//! - Atomicity: both balances and the pending log entry land in one batch
//! - Audit completeness: every committed transfer gets exactly two rows

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod accounts;
pub mod bank;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod journal;
pub mod ledger;
pub mod locks;
pub mod metrics;
pub mod notify;
pub mod retry;
pub mod storage;
pub mod types;
pub mod validation;

// Re-exports
pub use bank::Bank;
pub use config::Config;
pub use error::{Error, ErrorBody, Result};
pub use ledger::{LedgerEngine, TransferState};
pub use notify::{LogNotifier, NotificationGateway};
pub use storage::Storage;
pub use types::{
    Account, AccountInput, AccountNumber, AccountPatch, AccountStatus, AccountType, Customer,
    CustomerId, CustomerInput, CustomerPatch, CustomerStatus, DepositInput, Transaction,
    TransactionMode, TransactionType, TransferCompleted, TransferInput, TransferResult,
};
