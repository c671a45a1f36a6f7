//! Property-based tests for the wallet summary fold.
//!
//! - Summary is identical for every permutation of the entry set
//! - A credit followed by an equal debit nets to zero

use chrono::{Duration, TimeZone, Utc};
use mavuno_shared::types::{CompanyId, ProjectId, UserId};
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::entry::{EntryType, LedgerEntry, LedgerEntryInput, NewLedgerEntry};
use super::summary::WalletSummary;
use crate::scope::{Actor, ProjectScope};

/// Strategy to generate positive amounts (0.01 to 1,000,000.00).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn entry_type_strategy() -> impl Strategy<Value = EntryType> {
    prop_oneof![Just(EntryType::Credit), Just(EntryType::Debit)]
}

/// Entries with arbitrary, unordered client timestamps.
fn entries_strategy() -> impl Strategy<Value = Vec<LedgerEntry>> {
    prop::collection::vec(
        (entry_type_strategy(), positive_amount(), 0i64..100_000),
        0..40,
    )
    .prop_map(|raw| {
        let scope = ProjectScope::new(CompanyId::new(), ProjectId::new());
        let actor = Actor::new(UserId::new(), "prop");
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        raw.into_iter()
            .map(|(entry_type, amount, offset)| {
                let input = match entry_type {
                    EntryType::Credit => LedgerEntryInput::credit(amount, "c"),
                    EntryType::Debit => LedgerEntryInput::debit(amount, "d"),
                };
                let at = base + Duration::seconds(offset);
                NewLedgerEntry::build(scope, actor.clone(), input, at)
                    .unwrap()
                    .into_recorded(at)
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_summary_is_permutation_invariant(
        (entries, shuffled) in entries_strategy()
            .prop_flat_map(|e| (Just(e.clone()), Just(e).prop_shuffle()))
    ) {
        prop_assert_eq!(WalletSummary::fold(&entries), WalletSummary::fold(&shuffled));
    }

    #[test]
    fn prop_balance_is_received_minus_paid_out(entries in entries_strategy()) {
        let summary = WalletSummary::fold(&entries);
        prop_assert_eq!(summary.balance, summary.received - summary.paid_out);
        prop_assert_eq!(summary.entry_count, entries.len());
    }

    #[test]
    fn prop_credit_then_equal_debit_nets_zero(amount in positive_amount()) {
        let scope = ProjectScope::new(CompanyId::new(), ProjectId::new());
        let actor = Actor::new(UserId::new(), "prop");
        let now = Utc::now();
        let credit = NewLedgerEntry::build(scope, actor.clone(), LedgerEntryInput::credit(amount, "in"), now)
            .unwrap()
            .into_recorded(now);
        let debit = NewLedgerEntry::build(scope, actor, LedgerEntryInput::debit(amount, "out"), now)
            .unwrap()
            .into_recorded(now);

        let summary = WalletSummary::fold([&credit, &debit]);
        prop_assert_eq!(summary.balance, Decimal::ZERO);
        prop_assert_eq!(summary.received, amount);
        prop_assert_eq!(summary.paid_out, amount);
    }
}
