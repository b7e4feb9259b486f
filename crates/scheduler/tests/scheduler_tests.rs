//! Payment scheduler run tests

use async_trait::async_trait;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tributary_chain::{
    ChainClient, ChainError, ChainResult, ConfirmedTransaction, PaymentPolicy, PolicyStatus, PolicyType,
    SignatureInfo,
};
use tributary_scheduler::{PaymentScheduler, RunSummary, SchedulerError};

const NOW: i64 = 1_700_000_000;

struct MockGateway {
    policies: Vec<PaymentPolicy>,
    failing: Vec<u64>,
    executed: Mutex<Vec<u64>>,
    listing_fails: AtomicBool,
    // when set, each payment waits for a permit
    gate: Option<Arc<Semaphore>>,
}

impl MockGateway {
    fn new(policies: Vec<PaymentPolicy>) -> Self {
        Self {
            policies,
            failing: Vec::new(),
            executed: Mutex::new(Vec::new()),
            listing_fails: AtomicBool::new(false),
            gate: None,
        }
    }

    fn executed(&self) -> Vec<u64> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MockGateway {
    fn program_id(&self) -> Pubkey {
        Pubkey::default()
    }

    async fn signatures_for_address(&self, _limit: usize) -> ChainResult<Vec<SignatureInfo>> {
        Ok(Vec::new())
    }

    async fn get_transaction(&self, _signature: &str) -> ChainResult<Option<ConfirmedTransaction>> {
        Ok(None)
    }

    async fn policies_for_gateway(&self, _gateway: &Pubkey) -> ChainResult<Vec<PaymentPolicy>> {
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(ChainError::rpc("connection refused"));
        }
        Ok(self.policies.clone())
    }

    async fn execute_payment(&self, policy: &PaymentPolicy) -> ChainResult<String> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.executed.lock().unwrap().push(policy.policy_id);
        if self.failing.contains(&policy.policy_id) {
            return Err(ChainError::Rpc("custom program error: 0x1770".to_string()));
        }
        Ok(format!("sig-{}", policy.policy_id))
    }
}

fn policy(policy_id: u64, status: PolicyStatus, next_payment_due: i64, max_renewals: Option<u64>, payment_count: u64) -> PaymentPolicy {
    PaymentPolicy {
        address: Pubkey::new_unique(),
        policy_id,
        status,
        next_payment_due,
        policy_type: PolicyType::Subscription { max_renewals },
        payment_count,
        fields: Value::Null,
    }
}

fn due(policy_id: u64) -> PaymentPolicy {
    policy(policy_id, PolicyStatus::Active, NOW - 1, None, 0)
}

fn scheduler(chain: Arc<MockGateway>) -> PaymentScheduler {
    PaymentScheduler::new(chain, Pubkey::new_unique()).with_payment_delay(Duration::ZERO)
}

#[tokio::test]
async fn test_failure_is_isolated_per_policy() {
    let mut chain = MockGateway::new(vec![due(1), due(2), due(3)]);
    chain.failing = vec![2];
    let chain = Arc::new(chain);

    let summary = scheduler(chain.clone()).run_at(NOW).await.unwrap();

    assert_eq!(chain.executed(), vec![1, 2, 3]);
    assert_eq!(summary, RunSummary { found: 3, due: 3, executed: 2, errors: 1 });
}

#[tokio::test]
async fn test_only_due_policies_are_executed() {
    let chain = Arc::new(MockGateway::new(vec![
        policy(1, PolicyStatus::Active, NOW - 1, Some(3), 3),
        policy(2, PolicyStatus::Active, NOW - 1, Some(3), 2),
        policy(3, PolicyStatus::Cancelled, NOW - 1_000, None, 0),
        policy(4, PolicyStatus::Active, NOW + 3_600, None, 0),
    ]));

    let summary = scheduler(chain.clone()).run_at(NOW).await.unwrap();

    assert_eq!(chain.executed(), vec![2]);
    assert_eq!(summary, RunSummary { found: 4, due: 1, executed: 1, errors: 0 });
}

#[tokio::test]
async fn test_listing_failure_aborts_run() {
    let chain = Arc::new(MockGateway::new(vec![due(1)]));
    chain.listing_fails.store(true, Ordering::SeqCst);
    let scheduler = scheduler(chain.clone());

    assert!(matches!(scheduler.run_at(NOW).await, Err(SchedulerError::Chain(_))));
    assert!(!scheduler.is_running());

    chain.listing_fails.store(false, Ordering::SeqCst);
    assert_eq!(scheduler.run_at(NOW).await.unwrap().executed, 1);
}

#[tokio::test]
async fn test_dry_run_submits_nothing() {
    let chain = Arc::new(MockGateway::new(vec![due(1), due(2)]));
    let summary = scheduler(chain.clone()).with_dry_run(true).run_at(NOW).await.unwrap();

    assert!(chain.executed().is_empty());
    assert_eq!(summary, RunSummary { found: 2, due: 2, executed: 0, errors: 0 });
}

#[tokio::test]
async fn test_overlapping_run_is_rejected() {
    let gate = Arc::new(Semaphore::new(0));
    let mut chain = MockGateway::new(vec![due(1)]);
    chain.gate = Some(gate.clone());
    let scheduler = Arc::new(scheduler(Arc::new(chain)));

    let first = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_at(NOW).await })
    };
    while !scheduler.is_running() {
        tokio::task::yield_now().await;
    }

    assert!(matches!(scheduler.run_at(NOW).await, Err(SchedulerError::RunInProgress)));

    gate.add_permits(1);
    let summary = first.await.unwrap().unwrap();
    assert_eq!(summary.executed, 1);
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_payments_are_spaced_out() {
    let chain = Arc::new(MockGateway::new(vec![due(1), due(2), due(3)]));
    let scheduler = PaymentScheduler::new(chain, Pubkey::new_unique()).with_payment_delay(Duration::from_millis(30));

    let started = std::time::Instant::now();
    scheduler.run_at(NOW).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(60));
}
