use crate::domain::{Decimal, HoldingPosition, Symbol, QUANTITY_DP};
use serde::Serialize;

const DISPLAY_DP: u32 = 2;

/// Mark-to-market view of one holding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoldingValuation {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub current_price: Decimal,
    /// True when no price was available and average cost was used instead.
    pub price_is_fallback: bool,
    pub current_value: Decimal,
    pub cost_basis: Decimal,
    pub profit_loss: Decimal,
    pub profit_loss_pct: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortfolioSummary {
    pub total_value: Decimal,
    pub total_cost: Decimal,
    pub total_profit_loss: Decimal,
    pub holdings_count: usize,
}

/// Value a holding at `price`, or at its own average cost when `price` is None.
///
/// Money outputs have 2 fractional digits, quantity keeps 6.
pub fn value_holding(holding: &HoldingPosition, price: Option<Decimal>) -> HoldingValuation {
    let (current_price, price_is_fallback) = match price {
        Some(p) if p.is_positive() => (p, false),
        _ => (holding.average_cost, true),
    };

    let current_value = holding.total_quantity * current_price;
    let cost_basis = holding.cost_basis();
    let profit_loss = current_value - cost_basis;
    let profit_loss_pct = if cost_basis.is_positive() {
        profit_loss / cost_basis * Decimal::hundred()
    } else {
        Decimal::zero()
    };

    HoldingValuation {
        symbol: holding.symbol.clone(),
        quantity: holding.total_quantity.round_half_up(QUANTITY_DP),
        average_cost: holding.average_cost.round_half_up(DISPLAY_DP),
        current_price: current_price.round_half_up(DISPLAY_DP),
        price_is_fallback,
        current_value: current_value.round_half_up(DISPLAY_DP),
        cost_basis: cost_basis.round_half_up(DISPLAY_DP),
        profit_loss: profit_loss.round_half_up(DISPLAY_DP),
        profit_loss_pct: profit_loss_pct.round_half_up(DISPLAY_DP),
    }
}

pub fn summarize(valuations: &[HoldingValuation]) -> PortfolioSummary {
    let total_value: Decimal = valuations.iter().map(|v| v.current_value).sum();
    let total_cost: Decimal = valuations.iter().map(|v| v.cost_basis).sum();
    PortfolioSummary {
        total_value,
        total_cost,
        total_profit_loss: total_value - total_cost,
        holdings_count: valuations.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TimeMs, UserId};
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn holding(qty: &str, avg: &str) -> HoldingPosition {
        HoldingPosition {
            user: UserId::new("u1".to_string()),
            symbol: Symbol::new("INFY".to_string()),
            total_quantity: d(qty),
            average_cost: d(avg),
            last_updated: TimeMs::new(0),
            version: 1,
        }
    }

    #[test]
    fn test_value_with_market_price() {
        let v = value_holding(&holding("8", "1537.5"), Some(d("1600")));
        assert_eq!(v.current_value, d("12800"));
        assert_eq!(v.cost_basis, d("12300"));
        assert_eq!(v.profit_loss, d("500"));
        assert_eq!(v.profit_loss_pct, d("4.07"));
        assert!(!v.price_is_fallback);
    }

    #[test]
    fn test_value_falls_back_to_average_cost() {
        let v = value_holding(&holding("2", "100"), None);
        assert!(v.price_is_fallback);
        assert_eq!(v.current_price, d("100"));
        assert_eq!(v.profit_loss, Decimal::zero());
        assert_eq!(v.profit_loss_pct, Decimal::zero());
    }

    #[test]
    fn test_summarize_totals() {
        let vals = vec![
            value_holding(&holding("8", "1537.5"), Some(d("1600"))),
            value_holding(&holding("2", "100"), Some(d("90"))),
        ];
        let s = summarize(&vals);
        assert_eq!(s.total_value, d("12980"));
        assert_eq!(s.total_cost, d("12500"));
        assert_eq!(s.total_profit_loss, d("480"));
        assert_eq!(s.holdings_count, 2);
    }
}
