//! Decay-aware bid arithmetic.
//!
//! The contract emits bids with accrued decay included. The effective value
//! of a bid at placement time is the raw bid minus `timestamp · decay_rate`
//! (wei·seconds, as the contract accounts it), floored at zero. All math is
//! 256-bit integer; floating point never appears here.

use alloy::primitives::U256;

use crate::types::primitives::Wei;

/// Decay accrued at `timestamp_secs` under `decay_rate` wei per second.
#[must_use]
pub fn decay_amount(timestamp_secs: u64, decay_rate: Wei) -> Wei {
    Wei::new(U256::from(timestamp_secs).saturating_mul(decay_rate.as_u256()))
}

/// Effective bid value: `max(0, bid − timestamp · decay_rate)`.
///
/// Saturation at zero is mandatory - a fully decayed bid is worth exactly
/// zero, never an underflowed huge value.
#[must_use]
pub fn actual_bid(raw_bid: Wei, timestamp_secs: u64, decay_rate: Wei) -> Wei {
    raw_bid.saturating_sub(decay_amount(timestamp_secs, decay_rate))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn zero_rate_leaves_bid_untouched() {
        let bid = Wei::parse("1000000000000000000").unwrap();
        assert_eq!(actual_bid(bid, 1_700_000_000, Wei::ZERO), bid);
    }

    #[test]
    fn decay_subtracts_exactly() {
        // 2e18 bid at t=1000 under rate 1e12: decay = 1e15
        let bid = Wei::parse("2000000000000000000").unwrap();
        let rate = Wei::parse("1000000000000").unwrap();

        let result = actual_bid(bid, 1000, rate);
        assert_eq!(result.to_decimal_string(), "1999000000000000000");
    }

    #[test]
    fn decay_larger_than_bid_saturates_to_zero() {
        // Same bid, rate 3e15: decay = 3e18 > 2e18
        let bid = Wei::parse("2000000000000000000").unwrap();
        let rate = Wei::parse("3000000000000000").unwrap();

        assert_eq!(actual_bid(bid, 1000, rate), Wei::ZERO);
    }

    proptest! {
        #[test]
        fn never_exceeds_raw_bid(bid in any::<u128>(), rate in any::<u64>(), ts in any::<u32>()) {
            let raw = Wei::new(U256::from(bid));
            let result = actual_bid(raw, u64::from(ts), Wei::from(rate));
            prop_assert!(result <= raw);
        }

        #[test]
        fn exact_when_no_saturation(bid in any::<u128>(), rate in any::<u64>(), ts in any::<u32>()) {
            let raw = Wei::new(U256::from(bid));
            let decay = decay_amount(u64::from(ts), Wei::from(rate));
            let result = actual_bid(raw, u64::from(ts), Wei::from(rate));

            if decay.as_u256() <= raw.as_u256() {
                prop_assert_eq!(result.as_u256() + decay.as_u256(), raw.as_u256());
            } else {
                prop_assert_eq!(result, Wei::ZERO);
            }
        }

        #[test]
        fn zero_timestamp_means_no_decay(bid in any::<u128>(), rate in any::<u64>()) {
            let raw = Wei::new(U256::from(bid));
            prop_assert_eq!(actual_bid(raw, 0, Wei::from(rate)), raw);
        }
    }
}
