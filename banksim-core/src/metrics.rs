//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the banking core.
//!
//! # Metrics
//!
//! - `banksim_transfers_total{kind}` - Committed transfers and deposits
//! - `banksim_transfer_failures_total{code}` - Rejected transfers by error code
//! - `banksim_commit_duration_seconds` - Histogram of lock-to-commit latency
//! - `banksim_log_retries_total` - Transaction log write retries
//! - `banksim_log_pending` - Committed transfers whose log rows are not yet written
//! - `banksim_notifications_dropped_total` - Events dropped on a full mailbox
//! - `banksim_notification_failures_total` - Gateway delivery failures
//! - `banksim_customers_onboarded_total` / `banksim_accounts_opened_total`

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed transfers, labelled `transfer` or `deposit`
    pub transfers_total: IntCounterVec,

    /// Failed transfers by error code
    pub transfer_failures: IntCounterVec,

    /// Commit duration histogram
    pub commit_duration: Histogram,

    /// Transaction log write retries
    pub log_retries: IntCounter,

    /// Transfers committed but not yet logged
    pub log_pending: IntGauge,

    /// Notifications dropped because the mailbox was full
    pub notifications_dropped: IntCounter,

    /// Notifications the gateway failed to deliver
    pub notification_failures: IntCounter,

    /// Customers onboarded
    pub customers_onboarded: IntCounter,

    /// Accounts opened
    pub accounts_opened: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("log_retries", &self.log_retries.get())
            .field("log_pending", &self.log_pending.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transfers_total = IntCounterVec::new(
            Opts::new("banksim_transfers_total", "Total number of committed transfers"),
            &["kind"],
        )?;
        registry.register(Box::new(transfers_total.clone()))?;

        let transfer_failures = IntCounterVec::new(
            Opts::new(
                "banksim_transfer_failures_total",
                "Total number of rejected transfers by error code",
            ),
            &["code"],
        )?;
        registry.register(Box::new(transfer_failures.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "banksim_commit_duration_seconds",
                "Histogram of lock-to-commit latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        let log_retries = IntCounter::new(
            "banksim_log_retries_total",
            "Total number of transaction log write retries",
        )?;
        registry.register(Box::new(log_retries.clone()))?;

        let log_pending = IntGauge::new(
            "banksim_log_pending",
            "Committed transfers whose log rows are not yet written",
        )?;
        registry.register(Box::new(log_pending.clone()))?;

        let notifications_dropped = IntCounter::new(
            "banksim_notifications_dropped_total",
            "Notifications dropped because the mailbox was full",
        )?;
        registry.register(Box::new(notifications_dropped.clone()))?;

        let notification_failures = IntCounter::new(
            "banksim_notification_failures_total",
            "Notifications the gateway failed to deliver",
        )?;
        registry.register(Box::new(notification_failures.clone()))?;

        let customers_onboarded = IntCounter::new(
            "banksim_customers_onboarded_total",
            "Total number of onboarded customers",
        )?;
        registry.register(Box::new(customers_onboarded.clone()))?;

        let accounts_opened = IntCounter::new(
            "banksim_accounts_opened_total",
            "Total number of opened accounts",
        )?;
        registry.register(Box::new(accounts_opened.clone()))?;

        Ok(Self {
            transfers_total,
            transfer_failures,
            commit_duration,
            log_retries,
            log_pending,
            notifications_dropped,
            notification_failures,
            customers_onboarded,
            accounts_opened,
            registry,
        })
    }

    /// Record a committed transfer (`kind` is `transfer` or `deposit`)
    pub fn record_transfer(&self, kind: &str) {
        self.transfers_total.with_label_values(&[kind]).inc();
    }

    /// Record a rejected transfer
    pub fn record_failure(&self, code: &str) {
        self.transfer_failures.with_label_values(&[code]).inc();
    }

    /// Record commit duration
    pub fn record_commit_duration(&self, duration_seconds: f64) {
        self.commit_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
