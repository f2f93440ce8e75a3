//! Field validation for onboarding, account opening and transfers
//!
//! - Phone, email, name, Aadhar, PIN, account number, IFSC, bank name formats
//! - Age window derived from date of birth
//! - Amount sign, upper bound and minor-unit precision

use crate::types::MINOR_UNIT_SCALE;
use crate::{Error, Result};
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9]\d{9}$").unwrap());
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());
static NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z\s]{2,100}$").unwrap());
static AADHAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{12}$").unwrap());
static PIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4,6}$").unwrap());
static ACCOUNT_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{10,18}$").unwrap());
static IFSC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{4}0[A-Z0-9]{6}$").unwrap());

/// Minimum customer age at onboarding
pub const MIN_AGE_YEARS: u32 = 18;

/// Upper bound on a plausible customer age
pub const MAX_AGE_YEARS: u32 = 120;

fn check(re: &Regex, field: &'static str, value: &str, requirement: &str) -> Result<String> {
    let trimmed = value.trim();
    if re.is_match(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(Error::invalid(field, requirement))
    }
}

/// 10 digits, not starting with 0
pub fn phone_number(field: &'static str, value: &str) -> Result<String> {
    check(&PHONE, field, value, "must be 10 digits and cannot start with 0")
}

/// `local@domain.tld`
pub fn email(value: &str) -> Result<String> {
    check(&EMAIL, "email", value, "must be a valid email address")
}

/// 2-100 letters and spaces
pub fn person_name(field: &'static str, value: &str) -> Result<String> {
    check(&NAME, field, value, "must be 2-100 letters and spaces")
}

/// Exactly 12 digits
pub fn aadhar_number(value: &str) -> Result<String> {
    check(&AADHAR, "aadharNumber", value, "must be exactly 12 digits")
}

/// 4-6 digits
pub fn pin(value: &str) -> Result<String> {
    check(&PIN, "customerPin", value, "must be 4-6 digits")
}

/// 10-18 digits
pub fn account_number(value: &str) -> Result<String> {
    check(&ACCOUNT_NUMBER, "accountNumber", value, "must be 10-18 digits")
}

/// `SBIN0001234` shape; input is upper-cased first
pub fn ifsc_code(value: &str) -> Result<String> {
    check(
        &IFSC,
        "ifscCode",
        &value.trim().to_uppercase(),
        "must be 4 letters, a 0, then 6 letters or digits",
    )
}

/// 2-100 letters and spaces
pub fn bank_name(value: &str) -> Result<String> {
    check(&NAME, "bankName", value, "must be 2-100 letters and spaces")
}

/// Non-empty after trimming
pub fn non_empty(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::invalid(field, "must not be empty"))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Whole years between `dob` and `today`
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age
}

/// Age must fall within [`MIN_AGE_YEARS`, `MAX_AGE_YEARS`] on `today`
pub fn date_of_birth(dob: NaiveDate, today: NaiveDate) -> Result<NaiveDate> {
    let age = age_on(dob, today);
    if age < MIN_AGE_YEARS as i32 {
        return Err(Error::invalid("dob", "customer must be at least 18 years old"));
    }
    if age > MAX_AGE_YEARS as i32 {
        return Err(Error::invalid("dob", "age cannot exceed 120 years"));
    }
    Ok(dob)
}

/// Strictly positive, at most `max`, with at most two fractional digits
pub fn amount(field: &'static str, value: Decimal, max: Decimal) -> Result<Decimal> {
    if value <= Decimal::ZERO {
        return Err(Error::invalid(field, "must be greater than zero"));
    }
    if value > max {
        return Err(Error::invalid(field, format!("must not exceed {}", max)));
    }
    if value.normalize().scale() > MINOR_UNIT_SCALE {
        return Err(Error::invalid(field, "must have at most 2 decimal places"));
    }
    Ok(value)
}
