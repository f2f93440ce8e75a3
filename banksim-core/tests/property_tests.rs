//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Money conservation: total balance is unchanged by any transfer sequence
//! - Non-negativity: no account ever goes below zero
//! - Audit completeness: two rows per committed transfer, none for rejections
//! - Replay safety: a state reopened from disk matches the live state

use banksim_core::{
    AccountInput, AccountNumber, AccountType, Bank, Config, CustomerInput, Error,
    TransactionMode, TransferInput,
};
use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;

const ACCOUNTS: usize = 3;
const PIN: &str = "2468";

/// Strategy for generating transfer amounts (paise)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..50_000i64).prop_map(|paise| Decimal::new(paise, 2))
}

/// Strategy for generating payment rails
fn mode_strategy() -> impl Strategy<Value = TransactionMode> {
    prop_oneof![
        Just(TransactionMode::Upi),
        Just(TransactionMode::Neft),
        Just(TransactionMode::Imps),
        Just(TransactionMode::Rtgs),
        Just(TransactionMode::Transfer),
    ]
}

/// Strategy for one transfer between two of the test accounts
fn step_strategy() -> impl Strategy<Value = (usize, usize, Decimal, TransactionMode)> {
    (0..ACCOUNTS, 0..ACCOUNTS, amount_strategy(), mode_strategy())
}

/// Opening balances in paise, at least the 50.00 minimum
fn balances_strategy() -> impl Strategy<Value = Vec<Decimal>> {
    prop::collection::vec(
        (5_000i64..100_000i64).prop_map(|paise| Decimal::new(paise, 2)),
        ACCOUNTS,
    )
}

async fn setup(config: Config, balances: &[Decimal]) -> (Bank, Vec<AccountNumber>) {
    let bank = Bank::open(config).await.unwrap();
    let mut numbers = Vec::new();

    for (i, opening) in balances.iter().enumerate() {
        let aadhar = format!("20000000000{}", i);
        bank.onboard(CustomerInput {
            name: "Meera Iyer".into(),
            phone_number: "9988776655".into(),
            email: "meera@example.com".into(),
            address: "7 Anna Salai, Chennai".into(),
            customer_pin: PIN.into(),
            aadhar_number: aadhar.clone(),
            dob: NaiveDate::from_ymd_opt(1979, 11, 2).unwrap(),
            status: None,
        })
        .await
        .unwrap();

        let account = bank
            .create_account(AccountInput {
                aadhar_number: aadhar,
                account_number: format!("700000000{}", i),
                account_type: AccountType::Current,
                account_name: "Meera Iyer".into(),
                phone_number_linked: "9988776655".into(),
                bank_name: "Indian Bank".into(),
                ifsc_code: "IDIB000C001".into(),
                balance: Some(*opening),
                status: None,
            })
            .await
            .unwrap();
        numbers.push(account.account_number);
    }

    (bank, numbers)
}

fn total(bank: &Bank) -> Decimal {
    bank.list_accounts().unwrap().iter().map(|a| a.balance).sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: balances are conserved and never negative
    #[test]
    fn prop_conservation_and_non_negativity(
        balances in balances_strategy(),
        steps in prop::collection::vec(step_strategy(), 1..25),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let temp_dir = tempfile::tempdir().unwrap();
            let (bank, numbers) = setup(Config::for_testing(temp_dir.path()), &balances).await;
            let opening_total: Decimal = balances.iter().copied().sum();
            let mut committed = 0usize;

            for (from, to, amount, mode) in steps {
                let result = bank.transfer(TransferInput {
                    sender_account_number: numbers[from].to_string(),
                    sender_pin: PIN.into(),
                    receiver_account_number: numbers[to].to_string(),
                    amount,
                    transaction_mode: mode,
                    description: None,
                    idempotency_key: None,
                }).await;

                match result {
                    Ok(_) => committed += 1,
                    Err(Error::SelfTransfer) => prop_assert_eq!(from, to),
                    Err(Error::InsufficientFunds { available, .. }) => {
                        prop_assert!(available < amount)
                    }
                    Err(e) => prop_assert!(false, "unexpected error: {}", e),
                }

                prop_assert_eq!(total(&bank), opening_total);
                for account in bank.list_accounts().unwrap() {
                    prop_assert!(account.balance >= Decimal::ZERO);
                }
            }

            prop_assert_eq!(bank.list_transactions(None).unwrap().len(), 2 * committed);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Property: reopening the data directory yields the same balances
    #[test]
    fn prop_state_survives_reopen(
        balances in balances_strategy(),
        steps in prop::collection::vec(step_strategy(), 1..10),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let temp_dir = tempfile::tempdir().unwrap();
            let config = Config::for_testing(temp_dir.path());

            let before = {
                let (bank, numbers) = setup(config.clone(), &balances).await;
                for (from, to, amount, mode) in steps {
                    let _ = bank.transfer(TransferInput {
                        sender_account_number: numbers[from].to_string(),
                        sender_pin: PIN.into(),
                        receiver_account_number: numbers[to].to_string(),
                        amount,
                        transaction_mode: mode,
                        description: None,
                        idempotency_key: None,
                    }).await;
                }
                bank.shutdown().await.unwrap();
                (bank.list_accounts().unwrap(), bank.list_transactions(None).unwrap())
            };

            let bank = Bank::open(config).await.unwrap();
            prop_assert_eq!(bank.list_accounts().unwrap(), before.0);
            prop_assert_eq!(bank.list_transactions(None).unwrap(), before.1);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
