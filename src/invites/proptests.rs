//! Property-based tests for invite issuance
//!
//! - Batch uniqueness against every code ever issued
//! - Redemption succeeds at most once per code

use super::code::SequenceCodeGenerator;
use super::ledger::InviteLedger;
use crate::error::TrustError;
use crate::registry::MemberId;
use proptest::prelude::*;
use std::collections::HashSet;

proptest! {
    /// Property: every code in the ledger is distinct, across many batches
    /// for many owners.
    #[test]
    fn issued_codes_are_unique_system_wide(
        batches in prop::collection::vec((1usize..20, 1usize..6), 1..30),
    ) {
        let mut ledger = InviteLedger::default();
        let mut total = 0;

        for (owner_n, count) in batches {
            let owner = MemberId::citizen(owner_n);
            let batch = ledger.issue_batch(&owner, count).unwrap();
            prop_assert_eq!(batch.len(), count);
            total += count;
        }

        let distinct: HashSet<_> = ledger.list().into_iter().map(|c| c.code).collect();
        prop_assert_eq!(distinct.len(), total);
    }

    /// Property: a generator that keeps proposing already-issued codes never
    /// produces a duplicate; it either finds a fresh code or fails cleanly.
    #[test]
    fn colliding_generator_never_emits_duplicates(
        pool in prop::collection::vec("[A-C]{1}", 1..12),
        count in 1usize..5,
    ) {
        let mut ledger = InviteLedger::new(Box::new(SequenceCodeGenerator::new(pool)));
        let owner = MemberId::new("seed-1");
        let before = ledger.len();

        match ledger.issue_batch(&owner, count) {
            Ok(batch) => {
                let distinct: HashSet<_> = batch.iter().map(|c| c.code.clone()).collect();
                prop_assert_eq!(distinct.len(), count);
                prop_assert_eq!(ledger.len(), before + count);
            }
            Err(err) => {
                prop_assert!(matches!(err, TrustError::InvariantViolation(_)));
                prop_assert_eq!(ledger.len(), before);
            }
        }
    }

    /// Property: redeeming a code twice yields exactly one success.
    #[test]
    fn redemption_succeeds_at_most_once(attempts in 2usize..6) {
        let mut ledger = InviteLedger::default();
        let owner = MemberId::new("seed-1");
        let code = ledger.issue_batch(&owner, 1).unwrap().remove(0).code;

        let successes = (0..attempts)
            .filter(|i| ledger.mark_redeemed(&code, &MemberId::citizen(i + 2)).is_ok())
            .count();
        prop_assert_eq!(successes, 1);
    }
}
