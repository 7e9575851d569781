use crate::domain::{AccountType, Decimal, LedgerPosting, RewardKind, RewardRecord, TimeMs};

fn leg(
    record: &RewardRecord,
    index: i32,
    account_type: AccountType,
    debit: Decimal,
    credit: Decimal,
    description: String,
    now: TimeMs,
) -> LedgerPosting {
    let symbol = match account_type {
        AccountType::InstrumentInventory => Some(record.symbol.clone()),
        _ => None,
    };
    LedgerPosting {
        posting_group_id: record.posting_group_id.clone(),
        leg: index,
        reward_id: record.reward_id,
        account_type,
        symbol,
        debit_amount: debit,
        credit_amount: credit,
        description,
        created_at: now,
    }
}

/// Build the balanced double-entry postings for one record.
///
/// Grant: debit inventory / credit cash for the gross value, then debit fees
/// expense / credit cash for the total fees. Reversal: debit cash / credit
/// inventory for the absolute gross value. The fee pair is omitted when no
/// fees were charged so that every leg has exactly one positive side.
pub fn build_postings(record: &RewardRecord, now: TimeMs) -> Vec<LedgerPosting> {
    let zero = Decimal::zero();
    let gross = record.gross_value.abs();
    let mut postings = Vec::with_capacity(4);

    match record.kind {
        RewardKind::Grant => {
            postings.push(leg(
                record,
                0,
                AccountType::InstrumentInventory,
                gross,
                zero,
                format!(
                    "Reward grant: {} x {} units to user {}",
                    record.symbol, record.quantity, record.user
                ),
                now,
            ));
            postings.push(leg(
                record,
                1,
                AccountType::CashOutflow,
                zero,
                gross,
                "Cash paid for instrument purchase".to_string(),
                now,
            ));
        }
        RewardKind::Reversal => {
            postings.push(leg(
                record,
                0,
                AccountType::CashOutflow,
                gross,
                zero,
                "Cash recovered from reversed reward".to_string(),
                now,
            ));
            postings.push(leg(
                record,
                1,
                AccountType::InstrumentInventory,
                zero,
                gross,
                format!(
                    "Reward reversal: {} x {} units from user {}",
                    record.symbol,
                    record.quantity.abs(),
                    record.user
                ),
                now,
            ));
        }
    }

    let fees = record.fees.total.abs();
    if fees.is_positive() {
        let f = &record.fees;
        postings.push(leg(
            record,
            2,
            AccountType::FeesExpense,
            fees,
            zero,
            format!(
                "Fees: brokerage={}, transaction_tax={}, tax_on_brokerage={}, exchange={}, regulatory={}",
                f.brokerage, f.transaction_tax, f.tax_on_brokerage, f.exchange_fee, f.regulatory_fee
            ),
            now,
        ));
        postings.push(leg(
            record,
            3,
            AccountType::CashOutflow,
            zero,
            fees,
            "Cash paid for transaction fees".to_string(),
            now,
        ));
    }

    postings
}
