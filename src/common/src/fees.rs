//! Steam Community Market fee schedule.
//!
//! Steam charges a combined platform + game fee that steps up through an
//! interval ladder rather than a flat percentage. The ladder below must stay
//! bit-compatible with existing persisted data, so the interval and fee
//! extension rules are reproduced exactly, including their parity quirks.

/// Seller-received net price for a gross sale price, both in USD.
pub fn net_price(gross: f64) -> f64 {
    if gross <= 0.0 {
        return 0.0;
    }

    let mut intervals: Vec<f64> = vec![0.02, 0.21, 0.32, 0.43];
    let mut fees: Vec<f64> = vec![0.02, 0.03, 0.04, 0.05, 0.07, 0.09];

    // Grow the interval ladder until it covers the price. The step
    // alternates 0.12/0.11 on the parity of the current length.
    while gross > intervals[intervals.len() - 1] {
        let last = intervals[intervals.len() - 1];
        let step = if intervals.len() % 2 == 0 { 0.12 } else { 0.11 };
        intervals.push(round2(last + step));
    }

    // Fees extend in lockstep, alternating 0.01/0.02.
    while fees.len() < intervals.len() {
        let last = fees[fees.len() - 1];
        let step = if fees.len() % 2 == 0 { 0.01 } else { 0.02 };
        fees.push(round2(last + step));
    }

    let index = intervals
        .iter()
        .position(|&bound| gross <= bound)
        .unwrap_or(intervals.len() - 1);

    (round2(gross - fees[index])).max(0.0)
}

/// Absolute profit and fractional margin for reselling on Steam.
pub fn profit_margin(gross: f64, buy_price: f64) -> (f64, f64) {
    let net = net_price(gross);
    let absolute = net - buy_price;
    let percentage = if buy_price > 0.0 {
        absolute / buy_price
    } else {
        0.0
    };
    (absolute, percentage)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_reference_values() {
        assert_eq!(net_price(1.00), 0.87);
        assert_eq!(net_price(2.00), 1.73);
        assert_eq!(net_price(10.00), 8.68);
        assert_eq!(net_price(45.50), 39.56);
        assert!((net_price(100.00) - 86.96).abs() <= 0.01);
    }

    #[test]
    fn zero_and_negative_gross_net_to_zero() {
        assert_eq!(net_price(0.0), 0.0);
        assert_eq!(net_price(-5.0), 0.0);
        // At the bottom of the ladder the fee swallows the whole price.
        assert_eq!(net_price(0.01), 0.0);
        assert_eq!(net_price(0.03), 0.0);
    }

    #[test]
    fn net_is_bounded_and_monotonic_within_one_fee_step() {
        // The ladder dips by at most one cent just past every second
        // interval boundary (the fee steps by 0.02 while the interval steps
        // by 0.11/0.12), so monotonicity holds to within a single step.
        let mut previous = 0.0;
        let mut cents = 1;
        while cents <= 50_000 {
            let gross = cents as f64 / 100.0;
            let net = net_price(gross);
            assert!(net >= 0.0, "net negative at {gross}");
            assert!(net <= gross, "net above gross at {gross}");
            assert!(
                net + 0.01 + 1e-9 >= previous,
                "dip larger than a fee step at {gross}: {net} < {previous}"
            );
            previous = net;
            cents += 1;
        }
    }

    #[test]
    fn profit_margin_matches_net() {
        let (absolute, percentage) = profit_margin(45.50, 37.83);
        assert!((absolute - (net_price(45.50) - 37.83)).abs() < 1e-9);
        assert!((percentage - absolute / 37.83).abs() < 1e-9);

        let (_, pct_free) = profit_margin(10.0, 0.0);
        assert_eq!(pct_free, 0.0);
    }
}
