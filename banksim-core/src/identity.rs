//! Identity store
//!
//! Customer onboarding, lookup, profile edits and PIN verification.
//! Customers are keyed by id with a unique Aadhar index; they are never
//! deleted, only set Inactive.

use crate::{
    crypto::PinHasher,
    locks::LockTable,
    metrics::Metrics,
    storage::{Storage, SEQ_CUSTOMER},
    types::{
        AadharNumber, Customer, CustomerId, CustomerInput, CustomerPatch, CustomerRecord,
        CustomerStatus,
    },
    validation, Error, Result,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Customer records and PIN checks
pub struct IdentityStore {
    storage: Arc<Storage>,
    hasher: PinHasher,
    /// Serializes the Aadhar uniqueness check with id allocation
    create_lock: Mutex<()>,
    update_locks: LockTable<CustomerId>,
    metrics: Metrics,
}

impl std::fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStore")
            .field("update_locks", &self.update_locks)
            .finish_non_exhaustive()
    }
}

impl IdentityStore {
    /// Create store over shared storage
    pub fn new(
        storage: Arc<Storage>,
        hasher: PinHasher,
        lock_timeout: std::time::Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            hasher,
            create_lock: Mutex::new(()),
            update_locks: LockTable::new(lock_timeout),
            metrics,
        }
    }

    /// Register a new customer
    pub async fn onboard(&self, input: CustomerInput) -> Result<Customer> {
        let name = validation::person_name("name", &input.name)?;
        let phone_number = validation::phone_number("phoneNumber", &input.phone_number)?;
        let email = validation::email(&input.email)?;
        let address = validation::non_empty("address", &input.address)?;
        let pin = validation::pin(&input.customer_pin)?;
        let aadhar = validation::aadhar_number(&input.aadhar_number)?;
        let dob = validation::date_of_birth(input.dob, Utc::now().date_naive())?;

        // Hash outside the creation lock
        let pin_hash = self.hasher.hash_async(pin).await?;

        let _guard = self.create_lock.lock().await;

        if self.storage.customer_id_by_aadhar(&aadhar)?.is_some() {
            return Err(Error::DuplicateIdentity(aadhar));
        }

        let seq = self.storage.sequence(SEQ_CUSTOMER)? + 1;
        let now = Utc::now();
        let customer = Customer {
            customer_id: CustomerId::from_sequence(seq),
            aadhar_number: AadharNumber::new(aadhar),
            name,
            phone_number,
            email,
            address,
            dob,
            status: input.status.unwrap_or(CustomerStatus::Inactive),
            created_at: now,
            modified_at: now,
        };

        self.storage.insert_customer(
            &CustomerRecord {
                customer: customer.clone(),
                pin_hash,
            },
            seq,
        )?;
        self.metrics.customers_onboarded.inc();

        tracing::info!(
            customer_id = %customer.customer_id,
            status = ?customer.status,
            "Customer onboarded"
        );

        Ok(customer)
    }

    /// Customer by Aadhar number
    pub fn find_by_aadhar(&self, aadhar: &str) -> Result<Customer> {
        let id = self
            .storage
            .customer_id_by_aadhar(aadhar.trim())?
            .ok_or_else(|| Error::NotFound(format!("Customer with Aadhar {}", aadhar.trim())))?;
        self.find_by_id(&id)
    }

    /// Customer by id
    pub fn find_by_id(&self, id: &CustomerId) -> Result<Customer> {
        self.storage
            .get_customer(id)?
            .map(|record| record.customer)
            .ok_or_else(|| Error::NotFound(format!("Customer {}", id)))
    }

    /// Every customer, ordered by id
    pub fn list_all(&self) -> Result<Vec<Customer>> {
        Ok(self
            .storage
            .list_customers()?
            .into_iter()
            .map(|record| record.customer)
            .collect())
    }

    /// Check a PIN. Unknown customers and wrong PINs look the same.
    pub async fn verify_pin(&self, id: &CustomerId, pin: &str) -> Result<bool> {
        let stored = self.storage.get_customer(id)?.map(|record| record.pin_hash);
        self.hasher.verify_async(pin.to_string(), stored).await
    }

    /// Apply a profile edit
    pub async fn update(&self, id: &CustomerId, patch: CustomerPatch) -> Result<Customer> {
        let _guard = self.update_locks.acquire(id).await?;

        let mut record = self
            .storage
            .get_customer(id)?
            .ok_or_else(|| Error::NotFound(format!("Customer {}", id)))?;
        let customer = &mut record.customer;

        if let Some(aadhar) = &patch.aadhar_number {
            if aadhar.trim() != customer.aadhar_number.as_str() {
                return Err(Error::ImmutableField("aadharNumber"));
            }
        }
        if let Some(dob) = patch.dob {
            if dob != customer.dob {
                return Err(Error::ImmutableField("dob"));
            }
        }

        if let Some(name) = &patch.name {
            customer.name = validation::person_name("name", name)?;
        }
        if let Some(phone) = &patch.phone_number {
            customer.phone_number = validation::phone_number("phoneNumber", phone)?;
        }
        if let Some(email) = &patch.email {
            customer.email = validation::email(email)?;
        }
        if let Some(address) = &patch.address {
            customer.address = validation::non_empty("address", address)?;
        }
        if let Some(status) = patch.status {
            customer.status = status;
        }

        let pin_changed = match patch.customer_pin.as_deref().map(str::trim) {
            Some(pin) if !pin.is_empty() => {
                let pin = validation::pin(pin)?;
                record.pin_hash = self.hasher.hash_async(pin).await?;
                true
            }
            _ => false,
        };

        record.customer.modified_at = Utc::now();
        self.storage.put_customer(&record)?;

        tracing::info!(
            customer_id = %record.customer.customer_id,
            pin_changed,
            "Customer updated"
        );

        Ok(record.customer)
    }
}
