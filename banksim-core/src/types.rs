//! Core types for the banking core
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)
//! - Strongly typed boundary inputs (unknown fields rejected)

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fractional digits carried by every amount (paise)
pub const MINOR_UNIT_SCALE: u32 = 2;

/// External account number (10-18 digits)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Create new account number without validation
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// System-assigned customer identifier (`CUST_000001`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier for the n-th onboarded customer
    pub fn from_sequence(seq: u64) -> Self {
        Self(format!("CUST_{:06}", seq))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// National identifier (12 digits)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AadharNumber(String);

impl AadharNumber {
    /// Wrap without validation
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AadharNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Customer lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerStatus {
    /// May transact
    Active,
    /// Deactivated (customers are never deleted)
    Inactive,
}

/// Account lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Accepts debits and credits
    Active,
    /// Closed by the customer
    Inactive,
    /// Frozen by the bank
    Blocked,
    /// Temporarily suspended
    Suspended,
}

/// Account product type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    /// Savings account
    Savings,
    /// Current account
    Current,
    /// Fixed deposit
    Fixed,
    /// Recurring deposit
    Recurring,
}

/// Side of a transaction row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    /// Money left the row's account
    Debited,
    /// Money entered the row's account
    Credited,
}

/// Payment rail the customer selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionMode {
    /// Unified Payments Interface
    Upi,
    /// National Electronic Funds Transfer
    Neft,
    /// Immediate Payment Service
    Imps,
    /// Real Time Gross Settlement
    Rtgs,
    /// Internal book transfer
    Transfer,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionMode::Upi => "UPI",
            TransactionMode::Neft => "NEFT",
            TransactionMode::Imps => "IMPS",
            TransactionMode::Rtgs => "RTGS",
            TransactionMode::Transfer => "TRANSFER",
        };
        f.write_str(s)
    }
}

/// Onboarded customer (the PIN hash is never part of this view)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// System-assigned id
    pub customer_id: CustomerId,
    /// National identifier
    pub aadhar_number: AadharNumber,
    /// Full name
    pub name: String,
    /// Contact phone
    pub phone_number: String,
    /// Contact email
    pub email: String,
    /// Postal address
    pub address: String,
    /// Date of birth
    pub dob: NaiveDate,
    /// Lifecycle status
    pub status: CustomerStatus,
    /// Onboarding time
    pub created_at: DateTime<Utc>,
    /// Last profile edit
    pub modified_at: DateTime<Utc>,
}

/// Stored customer row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CustomerRecord {
    pub customer: Customer,
    pub pin_hash: String,
}

/// Bank account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// System-assigned id
    pub account_id: String,
    /// External account number
    pub account_number: AccountNumber,
    /// Owning customer
    pub customer_id: CustomerId,
    /// Product type
    pub account_type: AccountType,
    /// Display name
    pub account_name: String,
    /// Phone registered for alerts
    pub phone_number_linked: String,
    /// Bank name (immutable)
    pub bank_name: String,
    /// IFSC routing code (immutable)
    pub ifsc_code: String,
    /// Current balance, never negative
    pub balance: Decimal,
    /// Lifecycle status
    pub status: AccountStatus,
    /// Opening time
    pub created_at: DateTime<Utc>,
    /// Last edit or balance change
    pub modified_at: DateTime<Utc>,
}

impl Account {
    /// Whether the account may send or receive money
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// One row of the transaction log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique row id (`TXN_000001`)
    pub transaction_id: String,
    /// Transfer this row belongs to; shared by both sides
    pub transfer_id: Uuid,
    /// Account whose balance this row describes
    pub account_number: AccountNumber,
    /// Id of the opposite row of the same transfer
    pub counterpart_transaction_id: Option<String>,
    /// Debited account, absent for pure credits
    pub sender_account_number: Option<AccountNumber>,
    /// Credited account
    pub receiver_account_number: AccountNumber,
    /// Amount moved, always positive
    pub transaction_amount: Decimal,
    /// Side of this row
    pub transaction_type: TransactionType,
    /// Payment rail
    pub transaction_mode: TransactionMode,
    /// Free text from the customer
    pub description: Option<String>,
    /// Commit time
    pub transaction_time: DateTime<Utc>,
}

/// Format the log sequence number as a transaction id
pub fn transaction_id(seq: u64) -> String {
    format!("TXN_{:06}", seq)
}

/// Parse a transaction id back to its log sequence number
pub fn parse_transaction_id(id: &str) -> Option<u64> {
    id.strip_prefix("TXN_")?.parse().ok()
}

/// Onboarding request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CustomerInput {
    /// Full name
    pub name: String,
    /// 10 digit phone
    pub phone_number: String,
    /// Email address
    pub email: String,
    /// Postal address
    pub address: String,
    /// 4-6 digit PIN in clear; hashed before storage
    pub customer_pin: String,
    /// 12 digit national identifier
    pub aadhar_number: String,
    /// Date of birth (`YYYY-MM-DD`)
    pub dob: NaiveDate,
    /// Initial status, Inactive when absent
    #[serde(default)]
    pub status: Option<CustomerStatus>,
}

/// Customer profile edit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CustomerPatch {
    /// New name
    #[serde(default)]
    pub name: Option<String>,
    /// New phone
    #[serde(default)]
    pub phone_number: Option<String>,
    /// New email
    #[serde(default)]
    pub email: Option<String>,
    /// New address
    #[serde(default)]
    pub address: Option<String>,
    /// New PIN; empty leaves the current PIN
    #[serde(default)]
    pub customer_pin: Option<String>,
    /// New status
    #[serde(default)]
    pub status: Option<CustomerStatus>,
    /// Immutable; accepted only when equal to the stored value
    #[serde(default)]
    pub aadhar_number: Option<String>,
    /// Immutable; accepted only when equal to the stored value
    #[serde(default)]
    pub dob: Option<NaiveDate>,
}

/// Account opening request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AccountInput {
    /// Owner's Aadhar number
    pub aadhar_number: String,
    /// Requested account number
    pub account_number: String,
    /// Product type
    pub account_type: AccountType,
    /// Display name
    pub account_name: String,
    /// Phone registered for alerts
    pub phone_number_linked: String,
    /// Bank name
    pub bank_name: String,
    /// IFSC routing code
    pub ifsc_code: String,
    /// Opening balance, minimum opening balance when absent
    #[serde(default)]
    pub balance: Option<Decimal>,
    /// Initial status, Active when absent
    #[serde(default)]
    pub status: Option<AccountStatus>,
}

/// Account edit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AccountPatch {
    /// New product type
    #[serde(default)]
    pub account_type: Option<AccountType>,
    /// New display name
    #[serde(default)]
    pub account_name: Option<String>,
    /// New alert phone
    #[serde(default)]
    pub phone_number_linked: Option<String>,
    /// New status
    #[serde(default)]
    pub status: Option<AccountStatus>,
    /// Immutable; only the ledger moves money
    #[serde(default)]
    pub balance: Option<Decimal>,
    /// Immutable
    #[serde(default)]
    pub ifsc_code: Option<String>,
    /// Immutable
    #[serde(default)]
    pub bank_name: Option<String>,
    /// Immutable
    #[serde(default)]
    pub account_number: Option<String>,
}

/// Funds transfer request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransferInput {
    /// Debited account
    pub sender_account_number: String,
    /// PIN of the sender account's owner
    pub sender_pin: String,
    /// Credited account
    pub receiver_account_number: String,
    /// Amount to move
    pub amount: Decimal,
    /// Payment rail
    pub transaction_mode: TransactionMode,
    /// Free text
    #[serde(default)]
    pub description: Option<String>,
    /// Client-generated key collapsing retries of one logical request
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Pure credit with no internal sender
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DepositInput {
    /// Credited account
    pub account_number: String,
    /// Amount to credit
    pub amount: Decimal,
    /// Payment rail
    pub transaction_mode: TransactionMode,
    /// Free text
    #[serde(default)]
    pub description: Option<String>,
}

/// Outcome of a committed transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    /// Shared id of the transfer's rows
    pub transfer_id: Uuid,
    /// Debit row (absent for pure credits)
    pub debit: Option<Transaction>,
    /// Credit row
    pub credit: Transaction,
    /// Sender account after commit (absent for pure credits)
    pub sender: Option<Account>,
    /// Receiver account after commit
    pub receiver: Account,
    /// True when served from the idempotency record
    pub replayed: bool,
}

/// Event handed to the notification gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferCompleted {
    /// Transfer id
    pub transfer_id: Uuid,
    /// Id of the credit row
    pub transaction_id: String,
    /// Debited account, absent for pure credits
    pub sender: Option<AccountNumber>,
    /// Credited account
    pub receiver: AccountNumber,
    /// Amount moved
    pub amount: Decimal,
    /// Payment rail
    pub mode: TransactionMode,
    /// Free text
    pub description: Option<String>,
    /// Commit time
    pub completed_at: DateTime<Utc>,
}

impl TransferResult {
    /// Notification event describing this transfer
    pub fn completed_event(&self) -> TransferCompleted {
        TransferCompleted {
            transfer_id: self.transfer_id,
            transaction_id: self.credit.transaction_id.clone(),
            sender: self.credit.sender_account_number.clone(),
            receiver: self.credit.receiver_account_number.clone(),
            amount: self.credit.transaction_amount,
            mode: self.credit.transaction_mode,
            description: self.credit.description.clone(),
            completed_at: self.credit.transaction_time,
        }
    }
}
