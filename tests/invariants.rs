//! Property-based invariants over the order/account arithmetic, run with
//! arbitrary fill sequences rather than a handful of fixed examples.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use paper_broker::domain::ids::IdSequence;
use paper_broker::{Order, OrderId, OrderStatus, OrderType, Side, Symbol, TimeInForce};

fn qty() -> impl Strategy<Value = Decimal> {
    (1u32..=1000u32).prop_map(|n| Decimal::new(n as i64, 2))
}

fn price() -> impl Strategy<Value = Decimal> {
    (100000i64..=120000i64).prop_map(|n| Decimal::new(n, 5))
}

proptest! {
    /// `filled_quantity + remaining_quantity == quantity` after any sequence
    /// of fills that never overfills the order.
    #[test]
    fn filled_plus_remaining_always_equals_quantity(
        total in qty(),
        fill_fracs in prop::collection::vec(1u32..=100u32, 1..6),
    ) {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let mut order = Order::new(
            OrderId::new("ORD-PROP"),
            Symbol::new("EURUSD"),
            OrderType::Limit,
            Side::Buy,
            total,
            Some(dec!(1.1000)),
            None,
            TimeInForce::Gtc,
            None,
            None,
            None,
            None,
            now,
        );

        let mut remaining = total;
        for frac in fill_fracs {
            if remaining <= Decimal::ZERO {
                break;
            }
            let step = (remaining * Decimal::new(frac as i64, 2)).min(remaining);
            if step <= Decimal::ZERO {
                continue;
            }
            order.apply_fill(dec!(1.1000), step, now);
            remaining -= step;
            prop_assert_eq!(order.filled_quantity + order.remaining_quantity, order.quantity);
            prop_assert!(order.remaining_quantity >= Decimal::ZERO);
        }
    }

    /// `avg_fill_price` is always the quantity-weighted mean of the applied
    /// fill prices, independent of how many fills it took to get there.
    #[test]
    fn avg_fill_price_matches_manual_weighted_mean(
        prices in prop::collection::vec(price(), 1..5),
        vols in prop::collection::vec(qty(), 1..5),
    ) {
        let n = prices.len().min(vols.len());
        prop_assume!(n > 0);
        let total: Decimal = vols[..n].iter().copied().sum();
        prop_assume!(total > Decimal::ZERO);

        let now = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let mut order = Order::new(
            OrderId::new("ORD-PROP-2"),
            Symbol::new("EURUSD"),
            OrderType::Market,
            Side::Buy,
            total * dec!(100),
            None,
            None,
            TimeInForce::Gtc,
            None,
            None,
            None,
            None,
            now,
        );

        let mut weighted_sum = Decimal::ZERO;
        let mut filled_so_far = Decimal::ZERO;
        for i in 0..n {
            order.apply_fill(prices[i], vols[i], now);
            weighted_sum += prices[i] * vols[i];
            filled_so_far += vols[i];
        }

        let expected = weighted_sum / filled_so_far;
        prop_assert_eq!(order.avg_fill_price, expected);
    }

    /// A terminal order can never transition again via `apply_fill`'s status
    /// assignment escaping to a non-terminal state once fully filled.
    #[test]
    fn fully_filled_order_stays_filled(total in qty()) {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let mut order = Order::new(
            OrderId::new("ORD-PROP-3"),
            Symbol::new("EURUSD"),
            OrderType::Market,
            Side::Buy,
            total,
            None,
            None,
            TimeInForce::Gtc,
            None,
            None,
            None,
            None,
            now,
        );
        order.apply_fill(dec!(1.1000), total, now);
        prop_assert_eq!(order.status, OrderStatus::Filled);
        prop_assert!(order.is_terminal());
    }
}

#[test]
fn id_sequence_never_repeats_within_one_process() {
    let seq = IdSequence::new("TST");
    let mut seen = std::collections::HashSet::new();
    for _ in 0..1000 {
        assert!(seen.insert(seq.next()));
    }
}
