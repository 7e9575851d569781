//! Double-entry ledger postings.

use crate::domain::{Decimal, Symbol, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Account touched by a posting leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    InstrumentInventory,
    CashOutflow,
    FeesExpense,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::InstrumentInventory => "instrument_inventory",
            AccountType::CashOutflow => "cash_outflow",
            AccountType::FeesExpense => "fees_expense",
        }
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instrument_inventory" => Ok(AccountType::InstrumentInventory),
            "cash_outflow" => Ok(AccountType::CashOutflow),
            "fees_expense" => Ok(AccountType::FeesExpense),
            other => Err(format!("unknown account type: {}", other)),
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One debit or credit leg. Exactly one of the two amounts is positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPosting {
    pub posting_group_id: String,
    /// Position of the leg within its group, starting at 0.
    pub leg: i32,
    pub reward_id: Uuid,
    pub account_type: AccountType,
    /// Present only for inventory legs.
    pub symbol: Option<Symbol>,
    pub debit_amount: Decimal,
    pub credit_amount: Decimal,
    pub description: String,
    pub created_at: TimeMs,
}

impl LedgerPosting {
    pub fn is_debit(&self) -> bool {
        self.debit_amount.is_positive()
    }
}

/// True when debits and credits of `postings` sum to the same amount.
pub fn is_balanced(postings: &[LedgerPosting]) -> bool {
    let debits: Decimal = postings.iter().map(|p| p.debit_amount).sum();
    let credits: Decimal = postings.iter().map(|p| p.credit_amount).sum();
    debits == credits
}
