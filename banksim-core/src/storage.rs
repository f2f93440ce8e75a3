//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `customers` - Customer rows with PIN hash (key: customer_id)
//! - `accounts` - Account rows (key: account_number)
//! - `transactions` - Append-only transaction log (key: sequence, big-endian)
//! - `indices` - Secondary indices (Aadhar → customer, owner → accounts, account → rows)
//! - `outbox` - Committed transfers whose log rows are not yet written (key: transfer_id)
//! - `idempotency` - Stored transfer results (key: client idempotency key)
//! - `meta` - Id sequences

use crate::{
    error::{Error, Result},
    journal::PendingEntry,
    ledger::IdempotencyRecord,
    types::{Account, AccountNumber, CustomerId, CustomerRecord, Transaction},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Column family names
const CF_CUSTOMERS: &str = "customers";
const CF_ACCOUNTS: &str = "accounts";
const CF_TRANSACTIONS: &str = "transactions";
const CF_INDICES: &str = "indices";
const CF_OUTBOX: &str = "outbox";
const CF_IDEMPOTENCY: &str = "idempotency";
const CF_META: &str = "meta";

const ALL_CFS: [&str; 7] = [
    CF_CUSTOMERS,
    CF_ACCOUNTS,
    CF_TRANSACTIONS,
    CF_INDICES,
    CF_OUTBOX,
    CF_IDEMPOTENCY,
    CF_META,
];

/// Sequence names in the `meta` column family
pub(crate) const SEQ_CUSTOMER: &str = "seq/customer";
pub(crate) const SEQ_ACCOUNT: &str = "seq/account";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_CUSTOMERS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_OUTBOX, Options::default()),
            ColumnFamilyDescriptor::new(CF_IDEMPOTENCY, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            "Opened RocksDB at {:?} with {} column families",
            path,
            ALL_CFS.iter().filter(|cf| db.cf_handle(cf).is_some()).count()
        );

        Ok(Self {
            db,
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    // Column family options

    fn cf_options_rows() -> Options {
        let mut opts = Options::default();
        // Rows are read on every transfer, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helpers

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::PersistenceFailure(format!("Column family {} not found", name)))
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &opts)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn put_in<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        batch.put_cf(cf, key, bincode::serialize(value)?);
        Ok(())
    }

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf_handle(cf_name)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }

    fn scan_all<T: DeserializeOwned>(&self, cf_name: &str, mode: IteratorMode<'_>) -> Result<Vec<T>> {
        let cf = self.cf_handle(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, mode) {
            let (_, value) = item?;
            rows.push(bincode::deserialize(&value)?);
        }
        Ok(rows)
    }

    // Index key helpers

    fn index_key_aadhar(aadhar: &str) -> Vec<u8> {
        let mut key = b"aadhar|".to_vec();
        key.extend_from_slice(aadhar.as_bytes());
        key
    }

    fn index_key_owner(customer_id: &CustomerId, account: Option<&AccountNumber>) -> Vec<u8> {
        let mut key = b"owner|".to_vec();
        key.extend_from_slice(customer_id.as_str().as_bytes());
        key.push(b'|');
        if let Some(account) = account {
            key.extend_from_slice(account.as_str().as_bytes());
        }
        key
    }

    fn index_key_account_txn(account: &AccountNumber, seq: Option<u64>) -> Vec<u8> {
        let mut key = b"txn|".to_vec();
        key.extend_from_slice(account.as_str().as_bytes());
        key.push(b'|');
        if let Some(seq) = seq {
            key.extend_from_slice(&seq.to_be_bytes());
        }
        key
    }

    // Sequences

    /// Last value handed out for a sequence (0 when never used)
    pub fn sequence(&self, name: &str) -> Result<u64> {
        Ok(self.get::<u64>(CF_META, name.as_bytes())?.unwrap_or(0))
    }

    // Customer operations

    /// Get customer row by id
    pub(crate) fn get_customer(&self, id: &CustomerId) -> Result<Option<CustomerRecord>> {
        self.get(CF_CUSTOMERS, id.as_str().as_bytes())
    }

    /// Resolve an Aadhar number to its customer id
    pub fn customer_id_by_aadhar(&self, aadhar: &str) -> Result<Option<CustomerId>> {
        self.get(CF_INDICES, &Self::index_key_aadhar(aadhar))
    }

    /// Insert a new customer with its Aadhar index and sequence (atomic)
    pub(crate) fn insert_customer(&self, record: &CustomerRecord, seq: u64) -> Result<()> {
        let mut batch = WriteBatch::default();
        let customer = &record.customer;

        self.put_in(&mut batch, CF_CUSTOMERS, customer.customer_id.as_str().as_bytes(), record)?;
        self.put_in(
            &mut batch,
            CF_INDICES,
            &Self::index_key_aadhar(customer.aadhar_number.as_str()),
            &customer.customer_id,
        )?;
        self.put_in(&mut batch, CF_META, SEQ_CUSTOMER.as_bytes(), &seq)?;

        self.write(batch)?;

        tracing::debug!(customer_id = %customer.customer_id, "Customer inserted");
        Ok(())
    }

    /// Overwrite an existing customer row
    pub(crate) fn put_customer(&self, record: &CustomerRecord) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.put_in(
            &mut batch,
            CF_CUSTOMERS,
            record.customer.customer_id.as_str().as_bytes(),
            record,
        )?;
        self.write(batch)
    }

    /// All customer rows in id order
    pub(crate) fn list_customers(&self) -> Result<Vec<CustomerRecord>> {
        self.scan_all(CF_CUSTOMERS, IteratorMode::Start)
    }

    // Account operations

    /// Get account by number
    pub fn get_account(&self, number: &AccountNumber) -> Result<Option<Account>> {
        self.get(CF_ACCOUNTS, number.as_str().as_bytes())
    }

    /// Insert a new account with its owner index and sequence (atomic)
    pub fn insert_account(&self, account: &Account, seq: u64) -> Result<()> {
        let mut batch = WriteBatch::default();

        self.put_in(&mut batch, CF_ACCOUNTS, account.account_number.as_str().as_bytes(), account)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::index_key_owner(&account.customer_id, Some(&account.account_number)),
            b"",
        );
        self.put_in(&mut batch, CF_META, SEQ_ACCOUNT.as_bytes(), &seq)?;

        self.write(batch)?;

        tracing::debug!(account = %account.account_number, "Account inserted");
        Ok(())
    }

    /// Overwrite an existing account row
    pub fn put_account(&self, account: &Account) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.put_in(&mut batch, CF_ACCOUNTS, account.account_number.as_str().as_bytes(), account)?;
        self.write(batch)
    }

    /// All accounts in account-number order
    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        self.scan_all(CF_ACCOUNTS, IteratorMode::Start)
    }

    /// Accounts owned by one customer, in account-number order
    pub fn list_accounts_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Account>> {
        let prefix = Self::index_key_owner(customer_id, None);
        let mut accounts = Vec::new();

        for (key, _) in self.scan_prefix(CF_INDICES, &prefix)? {
            let number = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            let number = AccountNumber::new(number);
            let account = self.get_account(&number)?.ok_or_else(|| {
                Error::Internal(format!("Owner index points at missing account {}", number))
            })?;
            accounts.push(account);
        }

        Ok(accounts)
    }

    // Ledger operations

    /// Write post-transfer balances, the pending log entry and the
    /// idempotency record in one batch. Either all land or none do.
    pub(crate) fn commit_transfer(
        &self,
        accounts: &[&Account],
        pending: &PendingEntry,
        idempotency: Option<(&str, &IdempotencyRecord)>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        for account in accounts {
            self.put_in(
                &mut batch,
                CF_ACCOUNTS,
                account.account_number.as_str().as_bytes(),
                *account,
            )?;
        }

        self.put_in(&mut batch, CF_OUTBOX, pending.transfer_id.as_bytes(), pending)?;

        if let Some((key, record)) = idempotency {
            self.put_in(&mut batch, CF_IDEMPOTENCY, key.as_bytes(), record)?;
        }

        self.write(batch)?;

        tracing::debug!(transfer_id = %pending.transfer_id, "Transfer committed");
        Ok(())
    }

    /// Move a pending entry into the transaction log (atomic)
    pub(crate) fn append_transactions(&self, pending: &PendingEntry) -> Result<()> {
        let mut batch = WriteBatch::default();
        let cf_indices = self.cf_handle(CF_INDICES)?;

        for row in &pending.rows {
            self.put_in(&mut batch, CF_TRANSACTIONS, &row.seq.to_be_bytes(), &row.transaction)?;
            batch.put_cf(
                cf_indices,
                Self::index_key_account_txn(&row.transaction.account_number, Some(row.seq)),
                b"",
            );
        }

        let cf_outbox = self.cf_handle(CF_OUTBOX)?;
        batch.delete_cf(cf_outbox, pending.transfer_id.as_bytes());

        self.write(batch)?;

        tracing::debug!(
            transfer_id = %pending.transfer_id,
            rows = pending.rows.len(),
            "Transactions appended"
        );
        Ok(())
    }

    /// Entries committed but not yet logged
    pub(crate) fn pending_entries(&self) -> Result<Vec<PendingEntry>> {
        self.scan_all(CF_OUTBOX, IteratorMode::Start)
    }

    /// Get transaction row by sequence
    pub fn get_transaction(&self, seq: u64) -> Result<Option<Transaction>> {
        self.get(CF_TRANSACTIONS, &seq.to_be_bytes())
    }

    /// Every transaction row, newest first
    pub fn list_transactions(&self) -> Result<Vec<Transaction>> {
        self.scan_all(CF_TRANSACTIONS, IteratorMode::End)
    }

    /// Rows touching one account, newest first
    pub fn list_transactions_for_account(&self, account: &AccountNumber) -> Result<Vec<Transaction>> {
        let prefix = Self::index_key_account_txn(account, None);
        let mut rows = Vec::new();

        for (key, _) in self.scan_prefix(CF_INDICES, &prefix)?.into_iter().rev() {
            let seq_bytes: [u8; 8] = key[prefix.len()..]
                .try_into()
                .map_err(|_| Error::Internal("Malformed transaction index key".to_string()))?;
            let seq = u64::from_be_bytes(seq_bytes);
            let row = self.get_transaction(seq)?.ok_or_else(|| {
                Error::Internal(format!("Transaction index points at missing row {}", seq))
            })?;
            rows.push(row);
        }

        Ok(rows)
    }

    /// Highest sequence in the transaction log
    pub fn last_transaction_seq(&self) -> Result<Option<u64>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let mut iter = self.db.iterator_cf(cf, IteratorMode::End);
        match iter.next() {
            Some(item) => {
                let (key, _) = item?;
                let seq_bytes: [u8; 8] = key[..]
                    .try_into()
                    .map_err(|_| Error::Internal("Malformed transaction key".to_string()))?;
                Ok(Some(u64::from_be_bytes(seq_bytes)))
            }
            None => Ok(None),
        }
    }

    /// Stored result for an idempotency key
    pub(crate) fn get_idempotency(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        self.get(CF_IDEMPOTENCY, key.as_bytes())
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_customers: self.approximate_count(CF_CUSTOMERS)?,
            total_accounts: self.approximate_count(CF_ACCOUNTS)?,
            total_transactions: self.approximate_count(CF_TRANSACTIONS)?,
            pending_log_entries: self.pending_entries()?.len() as u64,
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Estimated customer rows
    pub total_customers: u64,
    /// Estimated account rows
    pub total_accounts: u64,
    /// Estimated transaction rows
    pub total_transactions: u64,
    /// Committed transfers still waiting for their log rows
    pub pending_log_entries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::LogRow;
    use crate::types::{AccountStatus, AccountType, TransactionMode, TransactionType};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::for_testing(temp_dir.path());
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_account(number: &str, owner: &str) -> Account {
        Account {
            account_id: "ACC_000001".into(),
            account_number: AccountNumber::new(number),
            customer_id: CustomerId::new(owner),
            account_type: AccountType::Savings,
            account_name: "Asha Rao".into(),
            phone_number_linked: "9876543210".into(),
            bank_name: "State Bank".into(),
            ifsc_code: "SBIN0001234".into(),
            balance: Decimal::new(50000, 2),
            status: AccountStatus::Active,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        }
    }

    fn test_row(seq: u64, account: &str) -> LogRow {
        LogRow {
            seq,
            transaction: Transaction {
                transaction_id: crate::types::transaction_id(seq),
                transfer_id: Uuid::now_v7(),
                account_number: AccountNumber::new(account),
                counterpart_transaction_id: None,
                sender_account_number: None,
                receiver_account_number: AccountNumber::new(account),
                transaction_amount: Decimal::new(1000, 2),
                transaction_type: TransactionType::Credited,
                transaction_mode: TransactionMode::Upi,
                description: None,
                transaction_time: Utc::now(),
            },
        }
    }

    #[test]
    fn test_storage_open() {
        let (storage, _temp) = test_storage();
        for cf in ALL_CFS {
            assert!(storage.db.cf_handle(cf).is_some());
        }
    }

    #[test]
    fn test_account_roundtrip_and_owner_index() {
        let (storage, _temp) = test_storage();
        let owner = CustomerId::new("CUST_000001");

        storage.insert_account(&test_account("1000000001", owner.as_str()), 1).unwrap();
        storage.insert_account(&test_account("1000000002", owner.as_str()), 2).unwrap();
        storage.insert_account(&test_account("2000000001", "CUST_000002"), 3).unwrap();

        let fetched = storage.get_account(&AccountNumber::new("1000000001")).unwrap().unwrap();
        assert_eq!(fetched.balance, Decimal::new(50000, 2));

        let owned = storage.list_accounts_by_customer(&owner).unwrap();
        assert_eq!(owned.len(), 2);
        assert_eq!(storage.list_accounts().unwrap().len(), 3);
        assert_eq!(storage.sequence(SEQ_ACCOUNT).unwrap(), 3);
    }

    #[test]
    fn test_owner_prefix_does_not_bleed() {
        let (storage, _temp) = test_storage();
        storage.insert_account(&test_account("1000000001", "CUST_1"), 1).unwrap();
        storage.insert_account(&test_account("1000000002", "CUST_10"), 2).unwrap();

        let owned = storage.list_accounts_by_customer(&CustomerId::new("CUST_1")).unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].account_number.as_str(), "1000000001");
    }

    #[test]
    fn test_pending_entry_moves_to_log() {
        let (storage, _temp) = test_storage();
        let account = test_account("1000000001", "CUST_000001");
        let pending = PendingEntry {
            transfer_id: Uuid::now_v7(),
            rows: vec![test_row(1, "1000000001"), test_row(2, "1000000001")],
        };

        storage.commit_transfer(&[&account], &pending, None).unwrap();
        assert_eq!(storage.pending_entries().unwrap().len(), 1);
        assert!(storage.list_transactions().unwrap().is_empty());

        storage.append_transactions(&pending).unwrap();
        assert!(storage.pending_entries().unwrap().is_empty());

        let rows = storage
            .list_transactions_for_account(&AccountNumber::new("1000000001"))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].transaction_id, "TXN_000002"); // newest first
        assert_eq!(storage.last_transaction_seq().unwrap(), Some(2));
    }
}
