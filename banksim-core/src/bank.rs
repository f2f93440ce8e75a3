//! Bank facade
//!
//! Ties storage, the identity and account stores, the ledger engine, the
//! transaction log and the notifier into one API.
//!
//! # Example
//!
//! ```no_run
//! use banksim_core::{Bank, Config};
//!
//! #[tokio::main]
//! async fn main() -> banksim_core::Result<()> {
//!     let bank = Bank::open(Config::default()).await?;
//!
//!     // let customer = bank.onboard(input).await?;
//!     // let result = bank.transfer(transfer).await?;
//!
//!     bank.shutdown().await?;
//!     Ok(())
//! }
//! ```

use crate::{
    accounts::AccountStore,
    crypto::PinHasher,
    identity::IdentityStore,
    journal::TransactionLog,
    ledger::LedgerEngine,
    locks::LockTable,
    metrics::Metrics,
    notify::{spawn_notifier, LogNotifier, NotificationGateway, NotifierHandle},
    storage::{Storage, StorageStats},
    types::{
        Account, AccountInput, AccountNumber, AccountPatch, Customer, CustomerId, CustomerInput,
        CustomerPatch, DepositInput, Transaction, TransferInput, TransferResult,
    },
    Config, Error, Result,
};
use std::sync::Arc;
use tokio::time::Duration;

/// Banking core
pub struct Bank {
    storage: Arc<Storage>,
    identity: Arc<IdentityStore>,
    accounts: Arc<AccountStore>,
    journal: Arc<TransactionLog>,
    ledger: LedgerEngine,
    notifier: NotifierHandle,
    metrics: Metrics,
    config: Config,
}

impl std::fmt::Debug for Bank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bank")
            .field("data_dir", &self.config.data_dir)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl Bank {
    /// Open with the logging notification gateway
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with_gateway(config, Arc::new(LogNotifier)).await
    }

    /// Open with a custom notification gateway
    pub async fn open_with_gateway(
        config: Config,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Metrics::new()
            .map_err(|e| Error::Internal(format!("Failed to create metrics: {}", e)))?;

        let lock_timeout = Duration::from_millis(config.ledger.lock_timeout_ms);
        let account_locks = Arc::new(LockTable::new(lock_timeout));

        let identity = Arc::new(IdentityStore::new(
            storage.clone(),
            PinHasher::new(&config.security)?,
            lock_timeout,
            metrics.clone(),
        ));
        let accounts = Arc::new(AccountStore::new(
            storage.clone(),
            account_locks.clone(),
            &config.ledger,
            metrics.clone(),
        ));
        let journal = Arc::new(TransactionLog::open(
            storage.clone(),
            config.retry.clone(),
            metrics.clone(),
        )?);

        // Transfers committed before a crash get their rows now
        journal.recover().await?;

        let notifier = if config.notifications.enabled {
            spawn_notifier(gateway, config.notifications.mailbox_capacity, metrics.clone())
        } else {
            NotifierHandle::disabled(metrics.clone())
        };

        let ledger = LedgerEngine::new(
            storage.clone(),
            identity.clone(),
            accounts.clone(),
            journal.clone(),
            notifier.clone(),
            account_locks,
            &config.ledger,
            metrics.clone(),
        );

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            data_dir = ?config.data_dir,
            "Bank opened"
        );

        Ok(Self {
            storage,
            identity,
            accounts,
            journal,
            ledger,
            notifier,
            metrics,
            config,
        })
    }

    // Customers

    /// Onboard a customer
    pub async fn onboard(&self, input: CustomerInput) -> Result<Customer> {
        self.identity.onboard(input).await
    }

    /// Customer by id
    pub fn get_customer(&self, id: &CustomerId) -> Result<Customer> {
        self.identity.find_by_id(id)
    }

    /// Customer by Aadhar number
    pub fn get_customer_by_aadhar(&self, aadhar: &str) -> Result<Customer> {
        self.identity.find_by_aadhar(aadhar)
    }

    /// Edit a customer profile
    pub async fn update_customer(&self, id: &CustomerId, patch: CustomerPatch) -> Result<Customer> {
        self.identity.update(id, patch).await
    }

    /// Every customer
    pub fn list_customers(&self) -> Result<Vec<Customer>> {
        self.identity.list_all()
    }

    /// Check a customer's PIN
    pub async fn verify_pin(&self, id: &CustomerId, pin: &str) -> Result<bool> {
        self.identity.verify_pin(id, pin).await
    }

    // Accounts

    /// Open an account
    pub async fn create_account(&self, input: AccountInput) -> Result<Account> {
        self.accounts.create(input).await
    }

    /// Account by number
    pub fn get_account(&self, number: &AccountNumber) -> Result<Account> {
        self.accounts.find_by_number(number)
    }

    /// Accounts of the customer with this Aadhar number
    pub fn get_accounts(&self, aadhar: &str) -> Result<Vec<Account>> {
        self.accounts.list_by_aadhar(aadhar)
    }

    /// Accounts owned by a customer id
    pub fn get_accounts_by_customer(&self, id: &CustomerId) -> Result<Vec<Account>> {
        self.accounts.list_by_customer(id)
    }

    /// Every account
    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        self.accounts.list_all()
    }

    /// Edit an account's mutable fields
    pub async fn update_account(&self, number: &AccountNumber, patch: AccountPatch) -> Result<Account> {
        self.accounts.update(number, patch).await
    }

    // Money movement

    /// Transfer between two accounts
    pub async fn transfer(&self, input: TransferInput) -> Result<TransferResult> {
        self.ledger.process_transfer(input).await
    }

    /// Credit an account with no internal sender
    pub async fn deposit(&self, input: DepositInput) -> Result<TransferResult> {
        self.ledger.deposit(input).await
    }

    /// Transactions of one account, or all of them, newest first
    pub fn list_transactions(&self, account: Option<&AccountNumber>) -> Result<Vec<Transaction>> {
        match account {
            Some(number) => self.journal.list_by_account(number),
            None => self.journal.list_all(),
        }
    }

    /// Transaction by id
    pub fn get_transaction(&self, id: &str) -> Result<Transaction> {
        self.journal.get(id)
    }

    // Operations

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    /// Wait for queued notifications to be handled
    pub async fn flush_notifications(&self) -> Result<()> {
        self.notifier.flush().await
    }

    /// Drain notifications and stop the notifier
    pub async fn shutdown(&self) -> Result<()> {
        self.notifier.flush().await?;
        self.notifier.shutdown().await?;
        tracing::info!("Bank shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountType, TransactionMode};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    async fn open_bank(lock_timeout_ms: u64) -> (Bank, AccountNumber, AccountNumber, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::for_testing(temp_dir.path());
        config.ledger.lock_timeout_ms = lock_timeout_ms;
        let bank = Bank::open(config).await.unwrap();

        let mut numbers = Vec::new();
        for (aadhar, number) in [("300000000001", "6000000001"), ("300000000002", "6000000002")] {
            bank.onboard(CustomerInput {
                name: "Kiran Das".into(),
                phone_number: "9000000001".into(),
                email: "kiran@example.com".into(),
                address: "12 MG Road, Bengaluru".into(),
                customer_pin: "1357".into(),
                aadhar_number: aadhar.into(),
                dob: NaiveDate::from_ymd_opt(1992, 8, 9).unwrap(),
                status: None,
            })
            .await
            .unwrap();
            let account = bank
                .create_account(AccountInput {
                    aadhar_number: aadhar.into(),
                    account_number: number.into(),
                    account_type: AccountType::Savings,
                    account_name: "Kiran Das".into(),
                    phone_number_linked: "9000000001".into(),
                    bank_name: "Bank of Baroda".into(),
                    ifsc_code: "BARB0MGROAD".into(),
                    balance: Some(Decimal::new(50_000, 2)),
                    status: None,
                })
                .await
                .unwrap();
            numbers.push(account.account_number);
        }

        let b = numbers.pop().unwrap();
        let a = numbers.pop().unwrap();
        (bank, a, b, temp_dir)
    }

    #[tokio::test]
    async fn test_transfer_lock_timeout_has_no_effect() {
        let (bank, a, b, _temp) = open_bank(30).await;

        let held = bank.accounts.lock_table().acquire(&b).await.unwrap();
        let err = bank
            .transfer(TransferInput {
                sender_account_number: a.to_string(),
                sender_pin: "1357".into(),
                receiver_account_number: b.to_string(),
                amount: Decimal::new(10_000, 2),
                transaction_mode: TransactionMode::Imps,
                description: None,
                idempotency_key: None,
            })
            .await
            .unwrap_err();
        drop(held);

        assert!(matches!(err, Error::LockTimeout(_)));
        assert_eq!(err.code(), "LOCK_TIMEOUT");
        assert_eq!(bank.get_account(&a).unwrap().balance, Decimal::new(50_000, 2));
        assert_eq!(bank.get_account(&b).unwrap().balance, Decimal::new(50_000, 2));
        assert!(bank.list_transactions(None).unwrap().is_empty());
        assert_eq!(bank.stats().unwrap().pending_log_entries, 0);
        assert_eq!(
            bank.metrics().transfer_failures.with_label_values(&["LOCK_TIMEOUT"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_deposit_lock_timeout_has_no_effect() {
        let (bank, a, _b, _temp) = open_bank(30).await;

        let held = bank.accounts.lock_table().acquire(&a).await.unwrap();
        let err = bank
            .deposit(DepositInput {
                account_number: a.to_string(),
                amount: Decimal::new(10_000, 2),
                transaction_mode: TransactionMode::Neft,
                description: None,
            })
            .await
            .unwrap_err();
        drop(held);

        assert!(matches!(err, Error::LockTimeout(_)));
        assert_eq!(bank.get_account(&a).unwrap().balance, Decimal::new(50_000, 2));
        assert!(bank.list_transactions(Some(&a)).unwrap().is_empty());
    }
}
