//! Payment scheduler

use crate::due::{due_status, DueStatus};
use crate::error::{SchedulerError, SchedulerResult};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tributary_chain::ChainClient;

pub const DEFAULT_PAYMENT_DELAY: Duration = Duration::from_millis(1000);

/// Counts reported at the end of each run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Policies listed for the gateway
    pub found: usize,
    /// Policies that passed the due filter
    pub due: usize,
    pub executed: usize,
    pub errors: usize,
}

/// Clears the in-progress flag however the run ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Executes due payments for every policy managed by one gateway.
pub struct PaymentScheduler {
    chain: Arc<dyn ChainClient>,
    gateway: Pubkey,
    payment_delay: Duration,
    dry_run: bool,
    running: AtomicBool,
}

impl PaymentScheduler {
    pub fn new(chain: Arc<dyn ChainClient>, gateway: Pubkey) -> Self {
        Self {
            chain,
            gateway,
            payment_delay: DEFAULT_PAYMENT_DELAY,
            dry_run: false,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_payment_delay(mut self, delay: Duration) -> Self {
        self.payment_delay = delay;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn gateway(&self) -> Pubkey {
        self.gateway
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one pass at the current time. Fails with
    /// [`SchedulerError::RunInProgress`] if another pass has not finished.
    pub async fn run_once(&self) -> SchedulerResult<RunSummary> {
        self.run_at(chrono::Utc::now().timestamp()).await
    }

    /// Run one pass treating `now` as the current unix time.
    pub async fn run_at(&self, now: i64) -> SchedulerResult<RunSummary> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SchedulerError::RunInProgress);
        }
        let _guard = RunGuard(&self.running);

        info!(gateway = %self.gateway, "Checking for payments to execute...");
        let policies = self.chain.policies_for_gateway(&self.gateway).await?;
        info!(count = policies.len(), "Found payment policies for this gateway");

        let mut summary = RunSummary {
            found: policies.len(),
            ..RunSummary::default()
        };

        for policy in &policies {
            match due_status(policy, now) {
                DueStatus::Due => {}
                DueStatus::RenewalsExhausted { max_renewals } => {
                    info!(policy_id = policy.policy_id, max_renewals, "Policy has reached max renewals");
                    continue;
                }
                status => {
                    debug!(policy = %policy.address, status = ?status, "Policy not due");
                    continue;
                }
            }

            if summary.due > 0 && !self.dry_run {
                tokio::time::sleep(self.payment_delay).await;
            }
            summary.due += 1;

            if self.dry_run {
                info!(policy = %policy.address, policy_id = policy.policy_id, "DRY RUN: Would execute payment");
                continue;
            }

            info!(policy = %policy.address, policy_id = policy.policy_id, "Executing payment");
            match self.chain.execute_payment(policy).await {
                Ok(signature) => {
                    summary.executed += 1;
                    info!(policy = %policy.address, signature = %signature, "Payment executed successfully");
                }
                Err(e) => {
                    summary.errors += 1;
                    error!(policy = %policy.address, policy_id = policy.policy_id, error = %e, "Error executing payment");
                }
            }
        }

        info!(
            found = summary.found,
            due = summary.due,
            executed = summary.executed,
            errors = summary.errors,
            "Payment execution completed"
        );
        Ok(summary)
    }
}
