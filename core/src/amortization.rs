//! Installment amounts for amortizing loans.

use crate::types::{PaymentFrequency, CHARGE_SCALE};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Per-period rate for a nominal annual percentage.
///
/// The annual rate is split into months first, then divided by the
/// approximate number of periods per month.
pub fn period_rate(annual_rate_percent: Decimal, frequency: PaymentFrequency) -> Decimal {
    let monthly_rate = annual_rate_percent / dec!(100) / dec!(12);
    monthly_rate / frequency.periods_per_month()
}

/// Level installment that repays `principal` over `installment_count`
/// periods at `annual_rate_percent`, kept to `CHARGE_SCALE` places.
///
/// Used both at origination and when an advance re-amortizes the remaining
/// balance over the remaining periods. A count of zero yields zero.
/// `None` when the growth factor leaves the `Decimal` range.
pub fn compute_installment_amount(
    principal: Decimal,
    annual_rate_percent: Decimal,
    frequency: PaymentFrequency,
    installment_count: u32,
) -> Option<Decimal> {
    if installment_count == 0 {
        return Some(Decimal::ZERO);
    }
    let n = Decimal::from(installment_count);
    let rate = period_rate(annual_rate_percent, frequency);

    let growth = checked_pow(Decimal::ONE + rate, installment_count)?;
    let denominator = growth - Decimal::ONE;
    // A rate too small to move the growth factor amortizes like zero interest.
    let amount = if rate.is_zero() || denominator.is_zero() {
        principal.checked_div(n)?
    } else {
        principal
            .checked_mul(rate.checked_mul(growth)?)?
            .checked_div(denominator)?
    };
    Some(amount.round_dp(CHARGE_SCALE))
}

/// Square-and-multiply integer power, `None` on overflow.
fn checked_pow(base: Decimal, exp: u32) -> Option<Decimal> {
    let mut result = Decimal::ONE;
    let mut b = base;
    let mut exp = exp;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.checked_mul(b)?;
        }
        exp >>= 1;
        if exp > 0 {
            b = b.checked_mul(b)?;
        }
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Decimal, b: Decimal) -> bool {
        (a - b).abs() < dec!(0.000001)
    }

    #[test]
    fn zero_rate_splits_evenly() {
        let amount = compute_installment_amount(dec!(1000), Decimal::ZERO, PaymentFrequency::Weekly, 4);
        assert_eq!(amount, Some(dec!(250)));
        let amount = compute_installment_amount(dec!(100), Decimal::ZERO, PaymentFrequency::Daily, 3);
        assert_eq!(amount, Some(dec!(33.3333333333)));
    }

    #[test]
    fn monthly_annuity_matches_textbook_value() {
        // 12% nominal, 12 monthly payments on 1000: 88.85 per month.
        let amount =
            compute_installment_amount(dec!(1000), dec!(12), PaymentFrequency::Monthly, 12).unwrap();
        assert!(close(amount, dec!(88.8487886)), "got {amount}");
        assert!(amount.scale() <= CHARGE_SCALE);
    }

    #[test]
    fn period_rate_divides_by_periods_per_month() {
        assert_eq!(period_rate(dec!(24), PaymentFrequency::Monthly), dec!(0.02));
        assert_eq!(period_rate(dec!(24), PaymentFrequency::Biweekly), dec!(0.01));
        assert_eq!(period_rate(dec!(24), PaymentFrequency::Weekly), dec!(0.005));
        assert!(close(period_rate(dec!(24), PaymentFrequency::Daily), dec!(0.02) / dec!(30)));
    }

    #[test]
    fn installments_repay_principal_with_interest() {
        let principal = dec!(5000);
        let amount =
            compute_installment_amount(principal, dec!(36), PaymentFrequency::Weekly, 20).unwrap();
        let rate = period_rate(dec!(36), PaymentFrequency::Weekly);

        let mut balance = principal;
        for _ in 0..20 {
            balance = balance * (Decimal::ONE + rate) - amount;
        }
        assert!(balance.abs() < dec!(0.000001), "balance left after schedule: {balance}");
    }

    #[test]
    fn zero_count_yields_zero() {
        assert_eq!(
            compute_installment_amount(dec!(900), dec!(10), PaymentFrequency::Monthly, 0),
            Some(Decimal::ZERO)
        );
    }

    #[test]
    fn growth_beyond_decimal_range_is_none() {
        assert_eq!(
            compute_installment_amount(dec!(1000), dec!(18), PaymentFrequency::Monthly, 10_000_000),
            None
        );
    }

    #[test]
    fn integer_power_matches_repeated_multiplication() {
        assert_eq!(checked_pow(dec!(1.01), 0), Some(Decimal::ONE));
        assert_eq!(checked_pow(dec!(1.5), 3), Some(dec!(3.375)));
        assert_eq!(checked_pow(dec!(10), 29), None);
    }
}
