//! Ledger engine
//!
//! Runs the transfer state machine:
//!
//! ```text
//! Validating → Locking → Committing → Logging → Notifying → Done
//!     │           │           │
//!     └───────────┴───────────┴──→ Failed(reason)
//! ```
//!
//! Validation is read-only and happens before any lock. Both account locks
//! are taken in ascending account-number order; under them the balances are
//! re-read, checked and written together with the pending log entry in one
//! RocksDB batch. Nothing after the commit can undo it: the log write is
//! retried until it lands and notification failures are only logged.

use crate::{
    accounts::AccountStore,
    config::LedgerConfig,
    identity::IdentityStore,
    journal::{PendingEntry, TransactionLog},
    locks::{LockGuard, LockTable},
    metrics::Metrics,
    notify::NotifierHandle,
    storage::Storage,
    types::{
        Account, AccountNumber, DepositInput, Transaction, TransactionType, TransferInput,
        TransferResult,
    },
    validation, Error, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;

/// Longest accepted idempotency key
const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Stage of a transfer, reported when it fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Input, account and PIN checks
    Validating,
    /// Waiting for the account locks
    Locking,
    /// Balance re-check and atomic write
    Committing,
    /// Writing the transaction rows
    Logging,
    /// Handing the event to the notifier
    Notifying,
    /// Finished
    Done,
}

/// Stored outcome of a keyed transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IdempotencyRecord {
    /// Request parameters the key was first used with
    pub fingerprint: String,
    pub result: TransferResult,
}

/// Transfer and deposit processing
pub struct LedgerEngine {
    storage: Arc<Storage>,
    identity: Arc<IdentityStore>,
    accounts: Arc<AccountStore>,
    journal: Arc<TransactionLog>,
    notifier: NotifierHandle,
    locks: Arc<LockTable<AccountNumber>>,
    idempotency_locks: LockTable<String>,
    max_amount: Decimal,
    log_wait: Duration,
    metrics: Metrics,
}

impl std::fmt::Debug for LedgerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEngine")
            .field("locks", &self.locks)
            .field("max_amount", &self.max_amount)
            .field("log_wait", &self.log_wait)
            .finish_non_exhaustive()
    }
}

impl LedgerEngine {
    /// Assemble the engine from its collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<Storage>,
        identity: Arc<IdentityStore>,
        accounts: Arc<AccountStore>,
        journal: Arc<TransactionLog>,
        notifier: NotifierHandle,
        locks: Arc<LockTable<AccountNumber>>,
        config: &LedgerConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            identity,
            accounts,
            journal,
            notifier,
            locks,
            idempotency_locks: LockTable::new(Duration::from_millis(config.lock_timeout_ms)),
            max_amount: config.max_amount,
            log_wait: Duration::from_millis(config.log_wait_ms),
            metrics,
        }
    }

    /// Move `amount` from the sender to the receiver
    pub async fn process_transfer(&self, input: TransferInput) -> Result<TransferResult> {
        let mut state = TransferState::Validating;
        let result = self.run_transfer(input, &mut state).await;
        self.finish("transfer", state, &result);
        result
    }

    /// Credit one account with no internal sender
    pub async fn deposit(&self, input: DepositInput) -> Result<TransferResult> {
        let mut state = TransferState::Validating;
        let result = self.run_deposit(input, &mut state).await;
        self.finish("deposit", state, &result);
        result
    }

    fn finish(&self, kind: &str, state: TransferState, result: &Result<TransferResult>) {
        match result {
            Ok(result) if result.replayed => {
                tracing::info!(transfer_id = %result.transfer_id, "Idempotent replay");
            }
            Ok(_) => self.metrics.record_transfer(kind),
            Err(e) => {
                self.metrics.record_failure(e.code());
                tracing::warn!(
                    kind,
                    state = ?state,
                    code = e.code(),
                    error = %e,
                    "Transfer failed"
                );
            }
        }
    }

    async fn run_transfer(
        &self,
        input: TransferInput,
        state: &mut TransferState,
    ) -> Result<TransferResult> {
        // Validating
        let amount = validation::amount("amount", input.amount, self.max_amount)?;
        let sender_number = AccountNumber::new(input.sender_account_number.trim());
        let receiver_number = AccountNumber::new(input.receiver_account_number.trim());
        if sender_number == receiver_number {
            return Err(Error::SelfTransfer);
        }
        let description = clean_description(input.description);

        let key = idempotency_key(input.idempotency_key.as_deref())?;
        let fingerprint = format!(
            "{}|{}|{}|{}|{}",
            sender_number,
            receiver_number,
            amount.normalize(),
            input.transaction_mode,
            description.as_deref().unwrap_or("")
        );

        // Requests sharing a key run one at a time
        let _key_guard = match &key {
            Some(k) => Some(self.idempotency_locks.acquire(k).await?),
            None => None,
        };

        let sender = self.load(&sender_number)?;
        let receiver = self.load(&receiver_number)?;

        if let Some(k) = &key {
            if let Some(record) = self.storage.get_idempotency(k)? {
                // Only the sender may learn how a key was used
                self.check_pin(&sender, &input.sender_pin).await?;
                if record.fingerprint != fingerprint {
                    return Err(Error::IdempotencyConflict(k.clone()));
                }
                return Ok(TransferResult {
                    replayed: true,
                    ..record.result
                });
            }
        }

        ensure_active(&sender)?;
        ensure_active(&receiver)?;
        self.check_pin(&sender, &input.sender_pin).await?;

        // Locking
        *state = TransferState::Locking;
        let guard = self
            .locks
            .acquire_all(&[sender_number.clone(), receiver_number.clone()])
            .await?;

        // Committing
        *state = TransferState::Committing;
        let started = Instant::now();

        let mut sender = self.load(&sender_number)?;
        let mut receiver = self.load(&receiver_number)?;
        ensure_active(&sender)?;
        ensure_active(&receiver)?;

        self.accounts.adjust_balance(&guard, &mut sender, -amount)?;
        self.accounts.adjust_balance(&guard, &mut receiver, amount)?;

        let pending = self.journal.prepare_transfer(
            &sender_number,
            &receiver_number,
            amount,
            input.transaction_mode,
            description,
        );
        let result = TransferResult {
            transfer_id: pending.transfer_id,
            debit: pending.row(TransactionType::Debited).cloned(),
            credit: credit_row(&pending)?,
            sender: Some(sender.clone()),
            receiver: receiver.clone(),
            replayed: false,
        };
        let record = key.as_ref().map(|_| IdempotencyRecord {
            fingerprint,
            result: result.clone(),
        });

        self.storage
            .commit_transfer(&[&sender, &receiver], &pending, key.as_deref().zip(record.as_ref()))?;
        self.committed(started, guard);

        tracing::info!(
            transfer_id = %result.transfer_id,
            sender = %sender_number,
            receiver = %receiver_number,
            amount = %amount,
            mode = %input.transaction_mode,
            "Transfer committed"
        );

        // Logging
        *state = TransferState::Logging;
        self.record(pending).await;

        // Notifying
        *state = TransferState::Notifying;
        self.notifier.notify(result.completed_event());

        *state = TransferState::Done;
        Ok(result)
    }

    async fn run_deposit(
        &self,
        input: DepositInput,
        state: &mut TransferState,
    ) -> Result<TransferResult> {
        let amount = validation::amount("amount", input.amount, self.max_amount)?;
        let number = AccountNumber::new(input.account_number.trim());
        let description = clean_description(input.description);
        ensure_active(&self.load(&number)?)?;

        *state = TransferState::Locking;
        let guard = self.locks.acquire(&number).await?;

        *state = TransferState::Committing;
        let started = Instant::now();

        let mut account = self.load(&number)?;
        ensure_active(&account)?;
        self.accounts.adjust_balance(&guard, &mut account, amount)?;

        let pending =
            self.journal
                .prepare_credit(&number, amount, input.transaction_mode, description);
        let result = TransferResult {
            transfer_id: pending.transfer_id,
            debit: None,
            credit: credit_row(&pending)?,
            sender: None,
            receiver: account.clone(),
            replayed: false,
        };

        self.storage.commit_transfer(&[&account], &pending, None)?;
        self.committed(started, guard);

        tracing::info!(
            transfer_id = %result.transfer_id,
            account = %number,
            amount = %amount,
            "Deposit committed"
        );

        *state = TransferState::Logging;
        self.record(pending).await;

        *state = TransferState::Notifying;
        self.notifier.notify(result.completed_event());

        *state = TransferState::Done;
        Ok(result)
    }

    fn committed(&self, started: Instant, guard: LockGuard<AccountNumber>) {
        drop(guard);
        self.metrics.record_commit_duration(started.elapsed().as_secs_f64());
        self.metrics.log_pending.inc();
    }

    /// Write the log rows, waiting at most `log_wait`. A slower write keeps
    /// retrying on its own task.
    async fn record(&self, pending: PendingEntry) {
        let transfer_id = pending.transfer_id;
        let journal = self.journal.clone();
        let task = tokio::spawn(async move { journal.append(&pending).await });

        match tokio::time::timeout(self.log_wait, task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                // Entry stays in the outbox and is replayed on next open
                tracing::error!(transfer_id = %transfer_id, error = %e, "Transaction log write failed");
            }
            Ok(Err(e)) => {
                tracing::error!(transfer_id = %transfer_id, error = %e, "Transaction log task aborted");
            }
            Err(_) => {
                tracing::warn!(
                    transfer_id = %transfer_id,
                    "Transaction log write still retrying in background"
                );
            }
        }
    }

    fn load(&self, number: &AccountNumber) -> Result<Account> {
        self.storage
            .get_account(number)?
            .ok_or_else(|| Error::AccountNotFound(number.to_string()))
    }

    async fn check_pin(&self, sender: &Account, pin: &str) -> Result<()> {
        if self.identity.verify_pin(&sender.customer_id, pin).await? {
            Ok(())
        } else {
            Err(Error::InvalidPin)
        }
    }
}

fn ensure_active(account: &Account) -> Result<()> {
    if account.is_active() {
        Ok(())
    } else {
        Err(Error::AccountNotActive(account.account_number.to_string()))
    }
}

fn credit_row(pending: &PendingEntry) -> Result<Transaction> {
    pending
        .row(TransactionType::Credited)
        .cloned()
        .ok_or_else(|| Error::Internal("Pending entry without credit row".to_string()))
}

fn clean_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

fn idempotency_key(raw: Option<&str>) -> Result<Option<String>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(k) if k.len() > MAX_IDEMPOTENCY_KEY_LEN => Err(Error::invalid(
            "idempotencyKey",
            format!("must be at most {} characters", MAX_IDEMPOTENCY_KEY_LEN),
        )),
        Some(k) => Ok(Some(k.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_normalization() {
        assert_eq!(idempotency_key(None).unwrap(), None);
        assert_eq!(idempotency_key(Some("  ")).unwrap(), None);
        assert_eq!(
            idempotency_key(Some(" req-1 ")).unwrap(),
            Some("req-1".to_string())
        );
        let long = "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        assert!(matches!(
            idempotency_key(Some(&long)),
            Err(Error::InvalidField { field: "idempotencyKey", .. })
        ));
    }

    #[test]
    fn test_clean_description() {
        assert_eq!(clean_description(Some("  rent ".into())), Some("rent".into()));
        assert_eq!(clean_description(Some("   ".into())), None);
        assert_eq!(clean_description(None), None);
    }
}
