//! Picker and collection totals derived from weigh entries.

use mavuno_shared::types::PickerId;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{Picker, WeighEntry};
use crate::error::{CashError, CashResult};
use crate::ledger::check_stored_range;

/// Rounds to whole currency units, midpoint away from zero.
#[must_use]
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

fn checked_product(a: Decimal, b: Decimal, field: &'static str) -> CashResult<Decimal> {
    let product = a
        .checked_mul(b)
        .ok_or(CashError::AmountOutOfRange(field))?;
    check_stored_range(round_currency(product), field)
}

fn checked_sum<I>(values: I, field: &'static str) -> CashResult<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    let total = values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .ok_or(CashError::AmountOutOfRange(field))?;
    check_stored_range(total, field)
}

/// Pay owed for a weight at a given rate.
///
/// # Errors
///
/// `AmountOutOfRange` if the pay cannot be stored.
pub fn picker_pay(total_kg: Decimal, price_per_kg: Decimal) -> CashResult<Decimal> {
    checked_product(total_kg, price_per_kg, "total_pay")
}

/// Totals for one picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickerTotals {
    /// The picker.
    pub picker_id: PickerId,
    /// Sum of the picker's weigh entries.
    pub total_kg: Decimal,
    /// Rounded pay.
    pub total_pay: Decimal,
}

/// Totals for a whole collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionTotals {
    /// Per-picker totals, ordered by picker id.
    pub pickers: Vec<PickerTotals>,
    /// Sum of every weigh entry.
    pub total_harvest_kg: Decimal,
    /// Sum of every picker's rounded pay.
    pub total_picker_cost: Decimal,
}

impl CollectionTotals {
    /// Re-derives all totals from the full weigh-entry set.
    ///
    /// Pickers without entries get zero totals. The result does not depend
    /// on the order of `entries`.
    ///
    /// # Errors
    ///
    /// `AmountOutOfRange` if any total cannot be stored.
    pub fn derive(
        price_per_kg_picker: Decimal,
        pickers: &[Picker],
        entries: &[WeighEntry],
    ) -> CashResult<Self> {
        let mut by_picker: BTreeMap<PickerId, Vec<Decimal>> =
            pickers.iter().map(|p| (p.id, Vec::new())).collect();
        for entry in entries {
            by_picker.entry(entry.picker_id).or_default().push(entry.weight_kg);
        }

        let pickers = by_picker
            .into_iter()
            .map(|(picker_id, weights)| -> CashResult<PickerTotals> {
                let total_kg = checked_sum(weights, "total_kg")?;
                Ok(PickerTotals {
                    picker_id,
                    total_kg,
                    total_pay: picker_pay(total_kg, price_per_kg_picker)?,
                })
            })
            .collect::<CashResult<Vec<PickerTotals>>>()?;

        let total_harvest_kg = checked_sum(entries.iter().map(|e| e.weight_kg), "total_harvest_kg")?;
        let total_picker_cost = checked_sum(pickers.iter().map(|p| p.total_pay), "total_picker_cost")?;

        Ok(Self {
            pickers,
            total_harvest_kg,
            total_picker_cost,
        })
    }

    /// Totals for one picker, if present.
    #[must_use]
    pub fn picker(&self, picker_id: PickerId) -> Option<&PickerTotals> {
        self.pickers.iter().find(|p| p.picker_id == picker_id)
    }
}

/// Revenue and profit of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleFigures {
    /// `total_harvest_kg * price_per_kg_buyer`, rounded.
    pub total_revenue: Decimal,
    /// `total_revenue - total_picker_cost`.
    pub profit: Decimal,
}

/// Computes revenue and profit for a buyer price.
///
/// # Errors
///
/// `AmountOutOfRange` if revenue or profit cannot be stored.
pub fn sale_figures(
    total_harvest_kg: Decimal,
    price_per_kg_buyer: Decimal,
    total_picker_cost: Decimal,
) -> CashResult<SaleFigures> {
    let total_revenue = checked_product(total_harvest_kg, price_per_kg_buyer, "total_revenue")?;
    let profit = total_revenue
        .checked_sub(total_picker_cost)
        .ok_or(CashError::AmountOutOfRange("profit"))?;
    Ok(SaleFigures {
        total_revenue,
        profit: check_stored_range(profit, "profit")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mavuno_shared::types::{CollectionId, CompanyId, WeighEntryId};
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn picker(collection_id: CollectionId, number: u32) -> Picker {
        Picker {
            id: PickerId::new(),
            company_id: CompanyId::new(),
            collection_id,
            picker_number: number,
            picker_name: format!("Picker {number}"),
            total_kg: Decimal::ZERO,
            total_pay: Decimal::ZERO,
            is_paid: false,
            paid_at: None,
            payment_batch_id: None,
            payout_funding: None,
        }
    }

    fn weigh(picker: &Picker, kg: Decimal, trip: u32) -> WeighEntry {
        WeighEntry {
            id: WeighEntryId::new(),
            company_id: picker.company_id,
            picker_id: picker.id,
            collection_id: picker.collection_id,
            weight_kg: kg,
            trip_number: trip,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_two_trips_at_140_per_kg() {
        let collection_id = CollectionId::new();
        let p = picker(collection_id, 1);
        let entries = [weigh(&p, dec!(5), 1), weigh(&p, dec!(3), 2)];

        let totals = CollectionTotals::derive(dec!(140), std::slice::from_ref(&p), &entries).unwrap();

        let picker_totals = totals.picker(p.id).unwrap();
        assert_eq!(picker_totals.total_kg, dec!(8));
        assert_eq!(picker_totals.total_pay, dec!(1120));
        assert_eq!(totals.total_harvest_kg, dec!(8));
        assert_eq!(totals.total_picker_cost, dec!(1120));
    }

    #[test]
    fn test_picker_without_entries_has_zero_totals() {
        let collection_id = CollectionId::new();
        let a = picker(collection_id, 1);
        let b = picker(collection_id, 2);
        let entries = [weigh(&a, dec!(12.5), 1)];

        let totals = CollectionTotals::derive(dec!(100), &[a.clone(), b.clone()], &entries).unwrap();

        assert_eq!(totals.picker(b.id).unwrap().total_pay, Decimal::ZERO);
        assert_eq!(totals.total_picker_cost, dec!(1250));
    }

    #[test]
    fn test_cost_sums_rounded_pay() {
        let collection_id = CollectionId::new();
        let a = picker(collection_id, 1);
        let b = picker(collection_id, 2);
        // 0.25 kg * 2 = 0.5 each, rounded to 1 each
        let entries = [weigh(&a, dec!(0.25), 1), weigh(&b, dec!(0.25), 1)];

        let totals = CollectionTotals::derive(dec!(2), &[a, b], &entries).unwrap();

        assert_eq!(totals.total_picker_cost, dec!(2));
    }

    #[test]
    fn test_sale_figures() {
        let figures = sale_figures(dec!(100), dec!(180), dec!(12000)).unwrap();
        assert_eq!(figures.total_revenue, dec!(18000));
        assert_eq!(figures.profit, dec!(6000));
    }

    #[rstest]
    #[case(dec!(100), dec!(70000000000000000000000000000), "total_revenue")]
    #[case(dec!(1000000), dec!(1000000000), "total_revenue")]
    #[case(dec!(999999999999999), dec!(2), "total_revenue")]
    fn test_sale_figures_out_of_range(
        #[case] kg: Decimal,
        #[case] price: Decimal,
        #[case] field: &str,
    ) {
        assert!(matches!(
            sale_figures(kg, price, Decimal::ZERO),
            Err(CashError::AmountOutOfRange(f)) if f == field
        ));
    }

    #[rstest]
    #[case(dec!(8), dec!(140), Some(dec!(1120)))]
    #[case(dec!(99999999999999), dec!(10), Some(dec!(999999999999990)))]
    #[case(dec!(100000000000000), dec!(10), None)]
    #[case(Decimal::MAX, dec!(2), None)]
    fn test_picker_pay_bounds(
        #[case] kg: Decimal,
        #[case] price: Decimal,
        #[case] expected: Option<Decimal>,
    ) {
        assert_eq!(picker_pay(kg, price).ok(), expected);
    }

    #[test]
    fn test_derive_rejects_unstorable_weight_sum() {
        let collection_id = CollectionId::new();
        let p = picker(collection_id, 1);
        let entries = [
            weigh(&p, dec!(600000000000000), 1),
            weigh(&p, dec!(600000000000000), 2),
        ];

        let result = CollectionTotals::derive(dec!(1), std::slice::from_ref(&p), &entries);

        assert!(matches!(result, Err(CashError::AmountOutOfRange("total_kg"))));
    }

    #[rstest]
    #[case(dec!(0.5), dec!(1))]
    #[case(dec!(1.5), dec!(2))]
    #[case(dec!(2.5), dec!(3))]
    #[case(dec!(2.49), dec!(2))]
    #[case(dec!(-0.5), dec!(-1))]
    fn test_round_currency_midpoint_away_from_zero(#[case] input: Decimal, #[case] expected: Decimal) {
        assert_eq!(round_currency(input), expected);
    }

    proptest! {
        #[test]
        fn prop_totals_are_order_independent(
            weights in prop::collection::vec((0usize..3, 1i64..100_000i64), 0..30),
            rate in 1i64..50_000i64,
        ) {
            let collection_id = CollectionId::new();
            let pickers: Vec<Picker> = (1..=3).map(|n| picker(collection_id, n)).collect();
            let entries: Vec<WeighEntry> = weights
                .iter()
                .enumerate()
                .map(|(trip, (who, grams))| {
                    weigh(&pickers[*who], Decimal::new(*grams, 3), u32::try_from(trip).unwrap_or(0))
                })
                .collect();
            let mut reversed = entries.clone();
            reversed.reverse();
            let price = Decimal::new(rate, 2);

            prop_assert_eq!(
                CollectionTotals::derive(price, &pickers, &entries).ok(),
                CollectionTotals::derive(price, &pickers, &reversed).ok()
            );
        }
    }
}
