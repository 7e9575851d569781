use crate::domain::{Decimal, HoldingPosition, Symbol, TimeMs, UserId};
use thiserror::Error;

/// Fractional digits kept on the running average cost.
pub const AVERAGE_COST_DP: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("quantity delta must not be zero")]
    ZeroQuantity,
    #[error("position would go negative: held {held}, change {delta}")]
    WouldGoNegative { held: Decimal, delta: Decimal },
    #[error("position arithmetic overflowed: held {held}, change {delta} at {price}")]
    Overflow {
        held: Decimal,
        delta: Decimal,
        price: Decimal,
    },
}

/// Apply a signed quantity at `price` to the current position (if any).
///
/// Returns the next state of the position with `version` advanced by one;
/// a brand-new position starts at version 1. The caller persists it with a
/// compare-and-swap on the previous version.
///
/// An increase moves the average cost to the weighted average
/// `(old_qty * old_avg + qty * price) / (old_qty + qty)`. A reduction removes
/// units at the running average, so `price` is ignored and the average is
/// kept; a position that reaches zero resets its average to zero.
///
/// # Errors
/// `WouldGoNegative` if the result would hold fewer than zero units,
/// `Overflow` if the cost basis leaves the decimal range.
pub fn apply_to_position(
    existing: Option<&HoldingPosition>,
    user: &UserId,
    symbol: &Symbol,
    quantity: Decimal,
    price: Decimal,
    now: TimeMs,
) -> Result<HoldingPosition, PositionError> {
    if quantity.is_zero() {
        return Err(PositionError::ZeroQuantity);
    }

    let (old_qty, old_avg, old_version) = match existing {
        Some(p) => (p.total_quantity, p.average_cost, p.version),
        None => (Decimal::zero(), Decimal::zero(), 0),
    };

    let overflow = || PositionError::Overflow {
        held: old_qty,
        delta: quantity,
        price,
    };

    let new_qty = old_qty.checked_add(quantity).ok_or_else(overflow)?;
    if new_qty.is_negative() {
        return Err(PositionError::WouldGoNegative {
            held: old_qty,
            delta: quantity,
        });
    }

    let new_avg = if new_qty.is_zero() {
        Decimal::zero()
    } else if quantity.is_negative() {
        old_avg
    } else if old_qty.is_zero() {
        price
    } else {
        let old_cost = old_qty.checked_mul(old_avg).ok_or_else(overflow)?;
        let added_cost = quantity.checked_mul(price).ok_or_else(overflow)?;
        old_cost
            .checked_add(added_cost)
            .and_then(|total| total.checked_div(new_qty))
            .ok_or_else(overflow)?
            .round_half_up(AVERAGE_COST_DP)
    };

    Ok(HoldingPosition {
        user: user.clone(),
        symbol: symbol.clone(),
        total_quantity: new_qty,
        average_cost: new_avg,
        last_updated: now,
        version: old_version + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ids() -> (UserId, Symbol) {
        (UserId::new("u1".to_string()), Symbol::new("INFY".to_string()))
    }

    #[test]
    fn test_first_grant_opens_position_at_price() {
        let (user, symbol) = ids();
        let p = apply_to_position(None, &user, &symbol, d("5"), d("1500"), TimeMs::new(1)).unwrap();
        assert_eq!(p.total_quantity, d("5"));
        assert_eq!(p.average_cost, d("1500"));
        assert_eq!(p.version, 1);
    }

    #[test]
    fn test_weighted_average_update() {
        let (user, symbol) = ids();
        let p1 = apply_to_position(None, &user, &symbol, d("5"), d("1500"), TimeMs::new(1)).unwrap();
        let p2 =
            apply_to_position(Some(&p1), &user, &symbol, d("3"), d("1600"), TimeMs::new(2)).unwrap();
        assert_eq!(p2.total_quantity, d("8"));
        assert_eq!(p2.average_cost, d("1537.5"));
        assert_eq!(p2.version, 2);
        assert_eq!(p2.last_updated, TimeMs::new(2));
    }

    #[test]
    fn test_average_independent_of_order() {
        let (user, symbol) = ids();
        let grants = [("2", "100"), ("3", "200"), ("0.125", "333.3333")];

        let fold = |order: &[usize]| {
            let mut pos: Option<HoldingPosition> = None;
            for &i in order {
                let (q, px) = grants[i];
                pos = Some(
                    apply_to_position(pos.as_ref(), &user, &symbol, d(q), d(px), TimeMs::new(0))
                        .unwrap(),
                );
            }
            pos.unwrap()
        };

        let a = fold(&[0, 1, 2]);
        let b = fold(&[2, 1, 0]);
        assert_eq!(a.total_quantity, b.total_quantity);
        let diff = (a.average_cost - b.average_cost).abs();
        assert!(diff <= d("0.000001"), "avg drift {}", diff);

        let expected = (d("2") * d("100") + d("3") * d("200") + d("0.125") * d("333.3333"))
            / d("5.125");
        assert!((a.average_cost - expected).abs() <= d("0.000001"));
    }

    #[test]
    fn test_reversal_at_average_keeps_average() {
        let (user, symbol) = ids();
        let p1 = apply_to_position(None, &user, &symbol, d("8"), d("1537.5"), TimeMs::new(1)).unwrap();
        let p2 = apply_to_position(Some(&p1), &user, &symbol, d("-3"), d("1537.5"), TimeMs::new(2))
            .unwrap();
        assert_eq!(p2.total_quantity, d("5"));
        assert_eq!(p2.average_cost, d("1537.5"));
    }

    #[test]
    fn test_reduction_ignores_price() {
        let (user, symbol) = ids();
        let p1 = apply_to_position(None, &user, &symbol, d("3"), d("123.45678912"), TimeMs::new(1))
            .unwrap();
        let p2 = apply_to_position(Some(&p1), &user, &symbol, d("-1"), d("123.4568"), TimeMs::new(2))
            .unwrap();
        assert_eq!(p2.average_cost, d("123.45678912"));
    }

    #[test]
    fn test_full_reversal_zeroes_average() {
        let (user, symbol) = ids();
        let p1 = apply_to_position(None, &user, &symbol, d("2"), d("10"), TimeMs::new(1)).unwrap();
        let p2 =
            apply_to_position(Some(&p1), &user, &symbol, d("-2"), d("10"), TimeMs::new(2)).unwrap();
        assert!(p2.is_empty());
        assert_eq!(p2.average_cost, Decimal::zero());
    }

    #[test]
    fn test_reversal_below_zero_rejected() {
        let (user, symbol) = ids();
        let p1 = apply_to_position(None, &user, &symbol, d("1"), d("10"), TimeMs::new(1)).unwrap();
        let err = apply_to_position(Some(&p1), &user, &symbol, d("-1.5"), d("10"), TimeMs::new(2))
            .unwrap_err();
        assert_eq!(
            err,
            PositionError::WouldGoNegative {
                held: d("1"),
                delta: d("-1.5")
            }
        );

        let err = apply_to_position(None, &user, &symbol, d("-1"), d("10"), TimeMs::new(2))
            .unwrap_err();
        assert!(matches!(err, PositionError::WouldGoNegative { .. }));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let (user, symbol) = ids();
        assert_eq!(
            apply_to_position(None, &user, &symbol, Decimal::zero(), d("1"), TimeMs::new(0)),
            Err(PositionError::ZeroQuantity)
        );
    }

    #[test]
    fn test_cost_basis_overflow_is_an_error() {
        let (user, symbol) = ids();
        let huge = Decimal::new(rust_decimal::Decimal::MAX);
        let p1 = apply_to_position(None, &user, &symbol, d("1000"), huge, TimeMs::new(1)).unwrap();
        let err = apply_to_position(Some(&p1), &user, &symbol, d("1"), d("1"), TimeMs::new(2))
            .unwrap_err();
        assert!(matches!(err, PositionError::Overflow { .. }));
    }
}
