//! Property-based tests for automatic fee evaluation
//!
//! For any valid pool and any signal set:
//! - The committed rate stays inside `[min, max]`
//! - One evaluation moves the rate by at most the configured cap
//! - A second evaluation inside the cooldown changes nothing

use chrono::{TimeZone, Utc};
use fee_engine::{evaluate, FeeAdjustmentParams, MarketSignals, Pool, PoolCreationParams, TokenInfo};
use ledger_core::{Address, Amount, Bps, Percent};
use proptest::prelude::*;
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
struct Band {
    min: u32,
    max: u32,
    current: u32,
    step: u32,
    factor: u32,
    cap_percent: u32,
}

fn band() -> impl Strategy<Value = Band> {
    (0u32..500, 1u32..2_000, 1u32..200, 1u32..=100, 1u32..=100)
        .prop_flat_map(|(min, width, step, factor, cap_percent)| {
            let max = min + width;
            (min..=max).prop_map(move |current| Band {
                min,
                max,
                current,
                step,
                factor,
                cap_percent,
            })
        })
}

fn signals() -> impl Strategy<Value = MarketSignals> {
    (0u64..3_000_000, 0u32..20, 0u64..400_000).prop_map(|(volume, volatility, liquidity)| {
        MarketSignals {
            volume_24h: Amount::from(volume),
            volatility: Decimal::from(volatility),
            liquidity: Amount::from(liquidity),
            price_change: Decimal::ZERO,
        }
    })
}

fn pool(band: &Band) -> Pool {
    let token = |seed: u64, symbol: &str| TokenInfo {
        address: Address::from_seed(seed),
        symbol: symbol.to_string(),
        decimals: 18,
    };
    let params = PoolCreationParams {
        token_a: token(0xa, "WETH"),
        token_b: token(0xb, "USDC"),
        initial_fee_rate: Bps::saturating(band.current),
        min_fee_rate: Bps::saturating(band.min),
        max_fee_rate: Bps::saturating(band.max),
        fee_adjustment_step: Bps::saturating(band.step),
        fee_adjustment_cooldown: 3600,
        fee_adjustment_params: FeeAdjustmentParams {
            adjustment_factor: Decimal::from(band.factor),
            max_adjustment_percent: Percent::from_int(band.cap_percent).unwrap(),
            ..FeeAdjustmentParams::default()
        },
        enable_dynamic_fee: true,
        name: None,
        description: None,
    };
    let created = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    Pool::from_params(params, Address::from_seed(1), created).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Evaluation never leaves the band and never exceeds the cap
    #[test]
    fn prop_rate_stays_in_band(band in band(), signals in signals()) {
        let mut pool = pool(&band);
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();

        let record = evaluate(&mut pool, &signals, now, &Address::zero()).unwrap();
        let rate = pool.fee_rate().get();
        prop_assert!(band.min <= rate && rate <= band.max);

        // Cap is a percentage of max(current, step), rounded half away from zero
        let base = u64::from(band.current.max(band.step));
        let cap = (base * u64::from(band.cap_percent) + 99) / 100;
        let moved = (i64::from(rate) - i64::from(band.current)).unsigned_abs();
        prop_assert!(moved <= cap);

        match record {
            Some(r) => {
                prop_assert_eq!(r.previous_fee_rate.get(), band.current);
                prop_assert_eq!(r.new_fee_rate.get(), rate);
                prop_assert_ne!(rate, band.current);
            }
            None => prop_assert_eq!(rate, band.current),
        }
    }

    /// A second evaluation inside the cooldown is a no-op
    #[test]
    fn prop_cooldown_blocks_second_adjustment(
        band in band(),
        first in signals(),
        second in signals(),
    ) {
        let mut pool = pool(&band);
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();

        if evaluate(&mut pool, &first, now, &Address::zero()).unwrap().is_some() {
            let rate = pool.fee_rate();
            let soon = now + chrono::Duration::seconds(3599);
            prop_assert!(evaluate(&mut pool, &second, soon, &Address::zero()).unwrap().is_none());
            prop_assert_eq!(pool.fee_rate(), rate);
        }
    }
}
