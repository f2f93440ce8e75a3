//! Account store
//!
//! One row per account number. Balances only change through
//! [`AccountStore::adjust_balance`], which needs the caller to hold that
//! account's lock; profile edits take the same lock.

use crate::{
    config::LedgerConfig,
    locks::{LockGuard, LockTable},
    metrics::Metrics,
    storage::{Storage, SEQ_ACCOUNT},
    types::{
        Account, AccountInput, AccountNumber, AccountPatch, AccountStatus, CustomerId,
        MINOR_UNIT_SCALE,
    },
    validation, Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Account records
pub struct AccountStore {
    storage: Arc<Storage>,
    locks: Arc<LockTable<AccountNumber>>,
    create_lock: Mutex<()>,
    min_opening_balance: Decimal,
    max_amount: Decimal,
    metrics: Metrics,
}

impl std::fmt::Debug for AccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountStore")
            .field("min_opening_balance", &self.min_opening_balance)
            .field("max_amount", &self.max_amount)
            .finish_non_exhaustive()
    }
}

impl AccountStore {
    /// Create store sharing the ledger's account lock table
    pub fn new(
        storage: Arc<Storage>,
        locks: Arc<LockTable<AccountNumber>>,
        config: &LedgerConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            locks,
            create_lock: Mutex::new(()),
            min_opening_balance: config.min_opening_balance,
            max_amount: config.max_amount,
            metrics,
        }
    }

    /// Open a new account for the customer owning `input.aadhar_number`
    pub async fn create(&self, input: AccountInput) -> Result<Account> {
        let aadhar = validation::aadhar_number(&input.aadhar_number)?;
        let number = AccountNumber::new(validation::account_number(&input.account_number)?);
        let account_name = validation::person_name("accountName", &input.account_name)?;
        let phone_number_linked =
            validation::phone_number("phoneNumberLinked", &input.phone_number_linked)?;
        let bank_name = validation::bank_name(&input.bank_name)?;
        let ifsc_code = validation::ifsc_code(&input.ifsc_code)?;

        let balance = input.balance.unwrap_or(self.min_opening_balance);
        if balance < self.min_opening_balance {
            return Err(Error::invalid(
                "balance",
                format!("opening balance must be at least {}", self.min_opening_balance),
            ));
        }
        if balance > self.max_amount {
            return Err(Error::invalid(
                "balance",
                format!("opening balance must not exceed {}", self.max_amount),
            ));
        }
        if balance.normalize().scale() > MINOR_UNIT_SCALE {
            return Err(Error::invalid("balance", "must have at most 2 decimal places"));
        }

        let _guard = self.create_lock.lock().await;

        let owner = self
            .storage
            .customer_id_by_aadhar(&aadhar)?
            .ok_or_else(|| Error::UnknownOwner(aadhar.clone()))?;

        if self.storage.get_account(&number)?.is_some() {
            return Err(Error::DuplicateAccount(number.to_string()));
        }

        let seq = self.storage.sequence(SEQ_ACCOUNT)? + 1;
        let now = Utc::now();
        let account = Account {
            account_id: format!("ACC_{:06}", seq),
            account_number: number,
            customer_id: owner,
            account_type: input.account_type,
            account_name,
            phone_number_linked,
            bank_name,
            ifsc_code,
            balance,
            status: input.status.unwrap_or(AccountStatus::Active),
            created_at: now,
            modified_at: now,
        };

        self.storage.insert_account(&account, seq)?;
        self.metrics.accounts_opened.inc();

        tracing::info!(
            account = %account.account_number,
            customer_id = %account.customer_id,
            balance = %account.balance,
            "Account opened"
        );

        Ok(account)
    }

    /// Account by number
    pub fn find_by_number(&self, number: &AccountNumber) -> Result<Account> {
        self.storage
            .get_account(number)?
            .ok_or_else(|| Error::NotFound(format!("Account {}", number)))
    }

    /// Whether the account exists
    pub fn exists(&self, number: &AccountNumber) -> Result<bool> {
        Ok(self.storage.get_account(number)?.is_some())
    }

    /// Accounts of the customer with this Aadhar number
    pub fn list_by_aadhar(&self, aadhar: &str) -> Result<Vec<Account>> {
        let owner = self
            .storage
            .customer_id_by_aadhar(aadhar.trim())?
            .ok_or_else(|| Error::NotFound(format!("Customer with Aadhar {}", aadhar.trim())))?;
        self.storage.list_accounts_by_customer(&owner)
    }

    /// Accounts owned by a customer id
    pub fn list_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Account>> {
        if self.storage.get_customer(customer_id)?.is_none() {
            return Err(Error::NotFound(format!("Customer {}", customer_id)));
        }
        self.storage.list_accounts_by_customer(customer_id)
    }

    /// Every account, ordered by account number
    pub fn list_all(&self) -> Result<Vec<Account>> {
        self.storage.list_accounts()
    }

    /// Edit type, name, linked phone or status
    pub async fn update(&self, number: &AccountNumber, patch: AccountPatch) -> Result<Account> {
        let _guard = self.locks.acquire(number).await?;
        let mut account = self.find_by_number(number)?;

        if let Some(balance) = patch.balance {
            if balance != account.balance {
                return Err(Error::ImmutableField("balance"));
            }
        }
        if let Some(ifsc) = &patch.ifsc_code {
            if ifsc.trim().to_uppercase() != account.ifsc_code {
                return Err(Error::ImmutableField("ifscCode"));
            }
        }
        if let Some(bank_name) = &patch.bank_name {
            if bank_name.trim() != account.bank_name {
                return Err(Error::ImmutableField("bankName"));
            }
        }
        if let Some(account_number) = &patch.account_number {
            if account_number.trim() != account.account_number.as_str() {
                return Err(Error::ImmutableField("accountNumber"));
            }
        }

        if let Some(account_type) = patch.account_type {
            account.account_type = account_type;
        }
        if let Some(name) = &patch.account_name {
            account.account_name = validation::person_name("accountName", name)?;
        }
        if let Some(phone) = &patch.phone_number_linked {
            account.phone_number_linked = validation::phone_number("phoneNumberLinked", phone)?;
        }
        if let Some(status) = patch.status {
            account.status = status;
        }

        account.modified_at = Utc::now();
        self.storage.put_account(&account)?;

        tracing::info!(
            account = %account.account_number,
            status = ?account.status,
            "Account updated"
        );

        Ok(account)
    }

    /// Apply `delta` to an account held under `guard`. Only the in-memory
    /// row changes; the ledger persists it in its commit batch.
    pub(crate) fn adjust_balance(
        &self,
        guard: &LockGuard<AccountNumber>,
        account: &mut Account,
        delta: Decimal,
    ) -> Result<()> {
        if !guard.covers(&account.account_number) {
            return Err(Error::Internal(format!(
                "Balance change on {} without its lock",
                account.account_number
            )));
        }

        let updated = account.balance.checked_add(delta).ok_or_else(|| {
            Error::invalid("amount", "would overflow the account balance")
        })?;
        if updated < Decimal::ZERO {
            return Err(Error::InsufficientFunds {
                account: account.account_number.to_string(),
                available: account.balance,
            });
        }

        account.balance = updated;
        account.modified_at = Utc::now();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn lock_table(&self) -> &LockTable<AccountNumber> {
        &self.locks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountType, AadharNumber, Customer, CustomerId, CustomerRecord, CustomerStatus};
    use crate::Config;
    use chrono::NaiveDate;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_store() -> (AccountStore, Arc<LockTable<AccountNumber>>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::for_testing(temp_dir.path());
        let storage = Arc::new(Storage::open(&config).unwrap());

        let now = Utc::now();
        storage
            .insert_customer(
                &CustomerRecord {
                    customer: Customer {
                        customer_id: CustomerId::from_sequence(1),
                        aadhar_number: AadharNumber::new("111122223333"),
                        name: "Asha Rao".into(),
                        phone_number: "9876543210".into(),
                        email: "asha@example.com".into(),
                        address: "Pune".into(),
                        dob: NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
                        status: CustomerStatus::Active,
                        created_at: now,
                        modified_at: now,
                    },
                    pin_hash: String::new(),
                },
                1,
            )
            .unwrap();

        let locks = Arc::new(LockTable::new(Duration::from_millis(100)));
        let store = AccountStore::new(
            storage,
            locks.clone(),
            &config.ledger,
            Metrics::new().unwrap(),
        );
        (store, locks, temp_dir)
    }

    fn input(number: &str) -> AccountInput {
        AccountInput {
            aadhar_number: "111122223333".into(),
            account_number: number.into(),
            account_type: AccountType::Savings,
            account_name: "Asha Rao".into(),
            phone_number_linked: "9876543210".into(),
            bank_name: "State Bank".into(),
            ifsc_code: "sbin0001234".into(),
            balance: None,
            status: None,
        }
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let (store, _locks, _temp) = test_store();
        let account = store.create(input("1000000001")).await.unwrap();

        assert_eq!(account.account_id, "ACC_000001");
        assert_eq!(account.balance, Decimal::new(5000, 2));
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.ifsc_code, "SBIN0001234");
        assert!(store.exists(&account.account_number).unwrap());
    }

    #[tokio::test]
    async fn test_create_rejections() {
        let (store, _locks, _temp) = test_store();
        store.create(input("1000000001")).await.unwrap();

        let err = store.create(input("1000000001")).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateAccount(_)));

        let mut low = input("1000000002");
        low.balance = Some(Decimal::new(4999, 2));
        let err = store.create(low).await.unwrap_err();
        assert!(matches!(err, Error::InvalidField { field: "balance", .. }));

        let mut huge = input("1000000004");
        huge.balance = Some(Decimal::MAX);
        let err = store.create(huge).await.unwrap_err();
        assert!(matches!(err, Error::InvalidField { field: "balance", .. }));

        let err = store.create(input("123")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidField { field: "accountNumber", .. }));

        let mut orphan = input("1000000003");
        orphan.aadhar_number = "999988887777".into();
        let err = store.create(orphan).await.unwrap_err();
        assert!(matches!(err, Error::UnknownOwner(_)));
    }

    #[tokio::test]
    async fn test_list_by_aadhar() {
        let (store, _locks, _temp) = test_store();
        store.create(input("1000000001")).await.unwrap();
        store.create(input("1000000002")).await.unwrap();

        assert_eq!(store.list_by_aadhar("111122223333").unwrap().len(), 2);
        assert!(matches!(
            store.list_by_aadhar("999988887777"),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_customer() {
        let (store, _locks, _temp) = test_store();
        store.create(input("1000000001")).await.unwrap();
        store.create(input("1000000002")).await.unwrap();

        let owned = store.list_by_customer(&CustomerId::from_sequence(1)).unwrap();
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|a| a.customer_id == CustomerId::from_sequence(1)));
        assert!(matches!(
            store.list_by_customer(&CustomerId::from_sequence(9)),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_rules() {
        let (store, _locks, _temp) = test_store();
        let account = store.create(input("1000000001")).await.unwrap();
        let number = account.account_number.clone();

        let patch = AccountPatch {
            account_name: Some("Asha Savings".into()),
            status: Some(AccountStatus::Suspended),
            balance: Some(account.balance),
            ..Default::default()
        };
        let updated = store.update(&number, patch).await.unwrap();
        assert_eq!(updated.account_name, "Asha Savings");
        assert_eq!(updated.status, AccountStatus::Suspended);
        assert_eq!(updated.balance, account.balance);

        let patch = AccountPatch {
            balance: Some(Decimal::new(1_000_000, 2)),
            ..Default::default()
        };
        let err = store.update(&number, patch).await.unwrap_err();
        assert!(matches!(err, Error::ImmutableField("balance")));

        let patch = AccountPatch {
            bank_name: Some("Other Bank".into()),
            ..Default::default()
        };
        let err = store.update(&number, patch).await.unwrap_err();
        assert!(matches!(err, Error::ImmutableField("bankName")));
    }

    #[tokio::test]
    async fn test_update_waits_for_lock() {
        let (store, locks, _temp) = test_store();
        let account = store.create(input("1000000001")).await.unwrap();

        let _held = locks.acquire(&account.account_number).await.unwrap();
        let err = store
            .update(&account.account_number, AccountPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LockTimeout(_)));
    }

    #[tokio::test]
    async fn test_adjust_balance_requires_guard() {
        let (store, locks, _temp) = test_store();
        let mut account = store.create(input("1000000001")).await.unwrap();
        let other = AccountNumber::new("1000000009");

        let wrong = locks.acquire(&other).await.unwrap();
        assert!(matches!(
            store.adjust_balance(&wrong, &mut account, Decimal::ONE),
            Err(Error::Internal(_))
        ));
        drop(wrong);

        let guard = locks.acquire(&account.account_number).await.unwrap();
        let err = store
            .adjust_balance(&guard, &mut account, Decimal::new(-5001, 2))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
        assert_eq!(account.balance, Decimal::new(5000, 2));

        store
            .adjust_balance(&guard, &mut account, Decimal::new(-5000, 2))
            .unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_adjust_balance_overflow_is_rejected() {
        let (store, locks, _temp) = test_store();
        let mut account = store.create(input("1000000001")).await.unwrap();
        account.balance = Decimal::MAX;

        let guard = locks.acquire(&account.account_number).await.unwrap();
        let err = store
            .adjust_balance(&guard, &mut account, Decimal::ONE)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidField { field: "amount", .. }));
        assert_eq!(account.balance, Decimal::MAX);
    }
}
