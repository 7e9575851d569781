use crate::domain::{Decimal, FeeBreakdown, MONEY_DP};

/// Process-wide fee rates.
///
/// All rates except `tax_on_brokerage_pct` are basis points of gross value.
/// `tax_on_brokerage_pct` is a percentage of the (rounded) brokerage amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSchedule {
    pub brokerage_bp: Decimal,
    pub transaction_tax_bp: Decimal,
    pub exchange_fee_bp: Decimal,
    pub regulatory_fee_bp: Decimal,
    pub tax_on_brokerage_pct: Decimal,
}

impl FeeSchedule {
    pub fn zero() -> Self {
        Self {
            brokerage_bp: Decimal::zero(),
            transaction_tax_bp: Decimal::zero(),
            exchange_fee_bp: Decimal::zero(),
            regulatory_fee_bp: Decimal::zero(),
            tax_on_brokerage_pct: Decimal::zero(),
        }
    }
}

impl Default for FeeSchedule {
    /// 5bp brokerage, 25bp transaction tax, 3bp exchange, 1bp regulatory, 18% tax on brokerage.
    fn default() -> Self {
        Self {
            brokerage_bp: Decimal::from(5),
            transaction_tax_bp: Decimal::from(25),
            exchange_fee_bp: Decimal::from(3),
            regulatory_fee_bp: Decimal::from(1),
            tax_on_brokerage_pct: Decimal::from(18),
        }
    }
}

fn bp_of(gross_value: Decimal, rate_bp: Decimal) -> Option<Decimal> {
    gross_value
        .checked_mul(rate_bp)?
        .checked_div(Decimal::ten_thousand())
        .map(|fee| fee.round_half_up(MONEY_DP))
}

/// Compute the fee breakdown for a trade notional. Pure and deterministic.
///
/// Each component is rounded half away from zero to 4 fractional digits
/// before being summed, so `total` always equals the sum of the parts.
/// Returns `None` if any component overflows the decimal range.
pub fn compute_fees(gross_value: Decimal, schedule: &FeeSchedule) -> Option<FeeBreakdown> {
    let brokerage = bp_of(gross_value, schedule.brokerage_bp)?;
    let transaction_tax = bp_of(gross_value, schedule.transaction_tax_bp)?;
    let exchange_fee = bp_of(gross_value, schedule.exchange_fee_bp)?;
    let regulatory_fee = bp_of(gross_value, schedule.regulatory_fee_bp)?;
    let tax_on_brokerage = brokerage
        .checked_mul(schedule.tax_on_brokerage_pct)?
        .checked_div(Decimal::hundred())?
        .round_half_up(MONEY_DP);

    let total = [transaction_tax, tax_on_brokerage, exchange_fee, regulatory_fee]
        .into_iter()
        .try_fold(brokerage, |acc, part| acc.checked_add(part))?
        .round_half_up(MONEY_DP);

    Some(FeeBreakdown {
        brokerage,
        transaction_tax,
        tax_on_brokerage,
        exchange_fee,
        regulatory_fee,
        total,
    })
}
