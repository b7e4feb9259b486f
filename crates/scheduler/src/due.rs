//! Payment due filter

use tributary_chain::{PaymentPolicy, PolicyStatus, PolicyType};

/// Why a policy is or is not executed in this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DueStatus {
    Due,
    Inactive,
    NotYetDue { due_in_secs: i64 },
    RenewalsExhausted { max_renewals: u64 },
}

impl DueStatus {
    pub fn is_due(&self) -> bool {
        matches!(self, DueStatus::Due)
    }
}

/// Classify `policy` at unix time `now`.
///
/// A policy is due when it is active, its next payment time has passed, and,
/// for subscriptions with a renewal cap, the cap has not been reached.
pub fn due_status(policy: &PaymentPolicy, now: i64) -> DueStatus {
    if policy.status != PolicyStatus::Active {
        return DueStatus::Inactive;
    }
    if policy.next_payment_due > now {
        return DueStatus::NotYetDue {
            due_in_secs: policy.next_payment_due - now,
        };
    }
    if let PolicyType::Subscription {
        max_renewals: Some(max_renewals),
    } = policy.policy_type
    {
        if policy.payment_count >= max_renewals {
            return DueStatus::RenewalsExhausted { max_renewals };
        }
    }
    DueStatus::Due
}

pub fn is_payment_due(policy: &PaymentPolicy, now: i64) -> bool {
    due_status(policy, now).is_due()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use solana_sdk::pubkey::Pubkey;

    const NOW: i64 = 1_700_000_000;

    fn policy(status: PolicyStatus, next_payment_due: i64, policy_type: PolicyType, payment_count: u64) -> PaymentPolicy {
        PaymentPolicy {
            address: Pubkey::new_unique(),
            policy_id: 1,
            status,
            next_payment_due,
            policy_type,
            payment_count,
            fields: Value::Null,
        }
    }

    fn capped(max: u64) -> PolicyType {
        PolicyType::Subscription { max_renewals: Some(max) }
    }

    #[test]
    fn test_renewal_cap() {
        let exhausted = policy(PolicyStatus::Active, NOW - 1, capped(3), 3);
        assert_eq!(due_status(&exhausted, NOW), DueStatus::RenewalsExhausted { max_renewals: 3 });

        let remaining = policy(PolicyStatus::Active, NOW - 1, capped(3), 2);
        assert!(is_payment_due(&remaining, NOW));
    }

    #[test]
    fn test_inactive_never_due() {
        for status in [PolicyStatus::Cancelled, PolicyStatus::Paused, PolicyStatus::Completed] {
            let p = policy(status, i64::MIN, PolicyType::Subscription { max_renewals: None }, 0);
            assert_eq!(due_status(&p, NOW), DueStatus::Inactive);
        }
    }

    #[test]
    fn test_due_time_boundary() {
        let unlimited = PolicyType::Subscription { max_renewals: None };
        assert!(is_payment_due(&policy(PolicyStatus::Active, NOW, unlimited.clone(), 50), NOW));
        assert_eq!(
            due_status(&policy(PolicyStatus::Active, NOW + 60, unlimited, 0), NOW),
            DueStatus::NotYetDue { due_in_secs: 60 }
        );
    }

    #[test]
    fn test_other_policy_types_ignore_renewals() {
        let p = policy(PolicyStatus::Active, NOW - 10, PolicyType::Other("Milestone".to_string()), 99);
        assert!(is_payment_due(&p, NOW));
    }
}
