//! Property tests for score bounds and history length.

use proptest::prelude::*;

use crate::{IdentityRef, ReputationLedger, HISTORY_CAP};

proptest! {
    #[test]
    fn scores_stay_in_range(deltas in prop::collection::vec(-150i32..150, 1..80)) {
        let ledger = ReputationLedger::new();
        let id = IdentityRef::derive("prop");
        ledger.register(&id).unwrap();

        for delta in deltas {
            let entry = ledger.update_reporter(&id, delta, "prop").unwrap();
            prop_assert!(entry.new_value.value() <= 100);
            ledger.update_jury(&id, delta, "prop").unwrap();
        }

        let record = ledger.snapshot(&id).unwrap();
        prop_assert!(record.reporter_or_default().value() <= 100);
        prop_assert!(record.jury_or_default().value() <= 100);
    }

    #[test]
    fn history_never_exceeds_cap(updates in 0usize..200) {
        let ledger = ReputationLedger::new();
        let id = IdentityRef::derive("prop");
        ledger.register(&id).unwrap();

        for i in 0..updates {
            ledger.update_jury(&id, 1, &i.to_string()).unwrap();
        }

        let record = ledger.snapshot(&id).unwrap();
        prop_assert_eq!(record.history().len(), updates.min(HISTORY_CAP));
        if updates > HISTORY_CAP {
            let oldest = record.history().iter().next().map(|e| e.reason.clone());
            prop_assert_eq!(oldest, Some((updates - HISTORY_CAP).to_string()));
        }
    }

    #[test]
    fn vote_weight_in_range(delta in -200i32..200) {
        let ledger = ReputationLedger::new();
        let id = IdentityRef::derive("prop");
        ledger.register(&id).unwrap();
        ledger.update_jury(&id, delta, "prop").unwrap();
        let weight = ledger.vote_weight(&id).unwrap();
        prop_assert!((1..=10).contains(&weight));
    }
}
