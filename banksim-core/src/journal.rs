//! Transaction log
//!
//! Append-only record of completed money movements. Every committed transfer
//! produces a [`PendingEntry`] inside its commit batch; the entry is then
//! moved into the `transactions` column family with retries until it lands.
//! Sequence numbers and timestamps are handed out under one lock so row ids
//! and `transaction_time` both increase monotonically.

use crate::{
    config::RetryConfig,
    metrics::Metrics,
    retry::RetryStrategy,
    storage::Storage,
    types::{
        parse_transaction_id, transaction_id, AccountNumber, Transaction, TransactionMode,
        TransactionType,
    },
    Error, Result,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Log row with its storage sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LogRow {
    pub seq: u64,
    pub transaction: Transaction,
}

/// Rows of one committed transfer, not yet in the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PendingEntry {
    pub transfer_id: Uuid,
    pub rows: Vec<LogRow>,
}

impl PendingEntry {
    /// Row with the given side
    pub fn row(&self, side: TransactionType) -> Option<&Transaction> {
        self.rows
            .iter()
            .map(|r| &r.transaction)
            .find(|t| t.transaction_type == side)
    }
}

#[derive(Debug)]
struct Sequencer {
    next_seq: u64,
    last_time: Option<DateTime<Utc>>,
}

impl Sequencer {
    /// Reserve `count` sequence numbers and one commit time
    fn stamp(&mut self, count: u64) -> (u64, DateTime<Utc>) {
        let first = self.next_seq;
        self.next_seq += count;

        let now = Utc::now();
        let time = match self.last_time {
            Some(last) if now <= last => last + ChronoDuration::microseconds(1),
            _ => now,
        };
        self.last_time = Some(time);

        (first, time)
    }
}

/// Transaction log over the shared storage
pub struct TransactionLog {
    storage: Arc<Storage>,
    sequencer: Mutex<Sequencer>,
    retry: RetryStrategy,
    metrics: Metrics,
}

impl std::fmt::Debug for TransactionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLog")
            .field("next_seq", &self.sequencer.lock().next_seq)
            .finish_non_exhaustive()
    }
}

impl TransactionLog {
    /// Open the log, continuing after the highest sequence already used by
    /// either the log or an outstanding pending entry
    pub fn open(storage: Arc<Storage>, retry: RetryConfig, metrics: Metrics) -> Result<Self> {
        let mut last = 0;
        let mut last_time = None;

        if let Some(seq) = storage.last_transaction_seq()? {
            last = seq;
            last_time = storage.get_transaction(seq)?.map(|row| row.transaction_time);
        }
        for entry in storage.pending_entries()? {
            for row in &entry.rows {
                last = last.max(row.seq);
                last_time = last_time.max(Some(row.transaction.transaction_time));
            }
        }

        Ok(Self {
            storage,
            sequencer: Mutex::new(Sequencer {
                next_seq: last + 1,
                last_time,
            }),
            retry: RetryStrategy::unbounded(retry),
            metrics,
        })
    }

    /// Build the DEBITED/CREDITED pair for a transfer. Nothing is written.
    pub(crate) fn prepare_transfer(
        &self,
        sender: &AccountNumber,
        receiver: &AccountNumber,
        amount: Decimal,
        mode: TransactionMode,
        description: Option<String>,
    ) -> PendingEntry {
        let transfer_id = Uuid::now_v7();
        let (first, time) = self.sequencer.lock().stamp(2);
        let debit_id = transaction_id(first);
        let credit_id = transaction_id(first + 1);

        let debit = Transaction {
            transaction_id: debit_id.clone(),
            transfer_id,
            account_number: sender.clone(),
            counterpart_transaction_id: Some(credit_id.clone()),
            sender_account_number: Some(sender.clone()),
            receiver_account_number: receiver.clone(),
            transaction_amount: amount,
            transaction_type: TransactionType::Debited,
            transaction_mode: mode,
            description: description.clone(),
            transaction_time: time,
        };
        let credit = Transaction {
            transaction_id: credit_id,
            account_number: receiver.clone(),
            counterpart_transaction_id: Some(debit_id),
            transaction_type: TransactionType::Credited,
            description,
            ..debit.clone()
        };

        PendingEntry {
            transfer_id,
            rows: vec![
                LogRow {
                    seq: first,
                    transaction: debit,
                },
                LogRow {
                    seq: first + 1,
                    transaction: credit,
                },
            ],
        }
    }

    /// Build the single CREDITED row of a pure credit. Nothing is written.
    pub(crate) fn prepare_credit(
        &self,
        receiver: &AccountNumber,
        amount: Decimal,
        mode: TransactionMode,
        description: Option<String>,
    ) -> PendingEntry {
        let transfer_id = Uuid::now_v7();
        let (seq, time) = self.sequencer.lock().stamp(1);

        PendingEntry {
            transfer_id,
            rows: vec![LogRow {
                seq,
                transaction: Transaction {
                    transaction_id: transaction_id(seq),
                    transfer_id,
                    account_number: receiver.clone(),
                    counterpart_transaction_id: None,
                    sender_account_number: None,
                    receiver_account_number: receiver.clone(),
                    transaction_amount: amount,
                    transaction_type: TransactionType::Credited,
                    transaction_mode: mode,
                    description,
                    transaction_time: time,
                },
            }],
        }
    }

    /// Write a committed entry's rows, retrying transient failures until
    /// they land
    pub(crate) async fn append(&self, pending: &PendingEntry) -> Result<()> {
        let log_retries = self.metrics.log_retries.clone();

        let result = self
            .retry
            .execute_with_retry(
                || async { self.storage.append_transactions(pending) },
                "append_transactions",
                || log_retries.inc(),
            )
            .await;

        // A failed entry stays in the outbox and is counted again by `recover`
        self.metrics.log_pending.dec();
        result?;

        tracing::info!(
            transfer_id = %pending.transfer_id,
            rows = pending.rows.len(),
            "Transaction rows recorded"
        );
        Ok(())
    }

    /// Write every entry left in the outbox by an earlier run
    pub(crate) async fn recover(&self) -> Result<usize> {
        let pending = self.storage.pending_entries()?;
        let count = pending.len();

        for entry in &pending {
            self.metrics.log_pending.inc();
            self.append(entry).await?;
        }

        if count > 0 {
            tracing::warn!(entries = count, "Recovered unlogged transfers from outbox");
        }
        Ok(count)
    }

    /// Rows for one account, newest first
    pub fn list_by_account(&self, account: &AccountNumber) -> Result<Vec<Transaction>> {
        if self.storage.get_account(account)?.is_none() {
            return Err(Error::NotFound(format!("Account {}", account)));
        }
        self.storage.list_transactions_for_account(account)
    }

    /// Every row, newest first
    pub fn list_all(&self) -> Result<Vec<Transaction>> {
        self.storage.list_transactions()
    }

    /// Row by transaction id
    pub fn get(&self, id: &str) -> Result<Transaction> {
        let seq = parse_transaction_id(id)
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", id)))?;
        self.storage
            .get_transaction(seq)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", id)))
    }
}
