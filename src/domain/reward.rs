//! Reward grant requests and the immutable records they produce.

use crate::domain::{Decimal, Symbol, TimeMs, UserId, QUANTITY_DP};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Whether a record adds units to a holding or takes them back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
    #[default]
    Grant,
    Reversal,
}

impl RewardKind {
    /// Sign applied to the requested magnitude when recording.
    pub fn sign(&self) -> Decimal {
        match self {
            RewardKind::Grant => Decimal::one(),
            RewardKind::Reversal => -Decimal::one(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RewardKind::Grant => "grant",
            RewardKind::Reversal => "reversal",
        }
    }
}

impl FromStr for RewardKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grant" => Ok(RewardKind::Grant),
            "reversal" => Ok(RewardKind::Reversal),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for RewardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named fee components charged on a grant. Every component has 4 fractional digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub brokerage: Decimal,
    pub transaction_tax: Decimal,
    pub tax_on_brokerage: Decimal,
    pub exchange_fee: Decimal,
    pub regulatory_fee: Decimal,
    pub total: Decimal,
}

impl FeeBreakdown {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Largest quantity a single request may grant or reverse.
pub const MAX_QUANTITY: u32 = 1_000_000_000;

/// Rejections raised before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("idempotency key must not be empty")]
    EmptyIdempotencyKey,
    #[error("user id must not be empty")]
    EmptyUser,
    #[error("invalid instrument symbol: {0}")]
    InvalidSymbol(String),
    #[error("quantity must be greater than zero, got {0}")]
    NonPositiveQuantity(Decimal),
    #[error("quantity {0} has more than 6 fractional digits")]
    QuantityTooPrecise(Decimal),
    #[error("quantity {0} exceeds the maximum of 1000000000 units")]
    QuantityTooLarge(Decimal),
    #[error("value of {quantity} units at {price} is outside the supported range")]
    ValueOverflow { quantity: Decimal, price: Decimal },
    #[error("value of {quantity} units at {price} rounds to zero")]
    ZeroValue { quantity: Decimal, price: Decimal },
    #[error("price must be greater than zero, got {0}")]
    NonPositivePrice(Decimal),
    #[error("unknown reward kind: {0}")]
    UnknownKind(String),
}

/// Inbound grant request as supplied by a caller.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantRequest {
    pub idempotency_key: String,
    pub user: String,
    pub symbol: String,
    /// Requested magnitude; always positive, the sign comes from `kind`.
    pub quantity: Decimal,
    pub kind: RewardKind,
    pub reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub granted_at: Option<TimeMs>,
}

impl GrantRequest {
    /// Convenience constructor for a plain grant with no optional fields.
    pub fn grant(idempotency_key: &str, user: &str, symbol: &str, quantity: Decimal) -> Self {
        Self {
            idempotency_key: idempotency_key.to_string(),
            user: user.to_string(),
            symbol: symbol.to_string(),
            quantity,
            kind: RewardKind::Grant,
            reason: None,
            metadata: None,
            granted_at: None,
        }
    }

    /// Same as [`GrantRequest::grant`] but taking units back.
    pub fn reversal(idempotency_key: &str, user: &str, symbol: &str, quantity: Decimal) -> Self {
        Self {
            kind: RewardKind::Reversal,
            ..Self::grant(idempotency_key, user, symbol, quantity)
        }
    }

    /// Check every caller-controlled precondition.
    ///
    /// # Errors
    /// Returns the first violated precondition.
    pub fn validate(&self) -> Result<ValidGrant, ValidationError> {
        let idempotency_key = self.idempotency_key.trim();
        if idempotency_key.is_empty() {
            return Err(ValidationError::EmptyIdempotencyKey);
        }
        let user = UserId::from_str(&self.user).map_err(|_| ValidationError::EmptyUser)?;
        let symbol = Symbol::from_str(&self.symbol)
            .map_err(|e| ValidationError::InvalidSymbol(e.to_string()))?;

        if !self.quantity.is_positive() {
            return Err(ValidationError::NonPositiveQuantity(self.quantity));
        }
        if self.quantity.fractional_digits() > QUANTITY_DP {
            return Err(ValidationError::QuantityTooPrecise(self.quantity));
        }
        if self.quantity > Decimal::from(MAX_QUANTITY) {
            return Err(ValidationError::QuantityTooLarge(self.quantity));
        }

        let fingerprint =
            compute_request_fingerprint(&user, &symbol, self.kind, &self.quantity);

        Ok(ValidGrant {
            idempotency_key: idempotency_key.to_string(),
            user,
            symbol,
            kind: self.kind,
            quantity: self.quantity.round_half_up(QUANTITY_DP),
            reason: self.reason.clone().unwrap_or_default(),
            metadata: self.metadata.clone(),
            granted_at: self.granted_at,
            fingerprint,
        })
    }
}

/// A request whose identifiers and quantity passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidGrant {
    pub idempotency_key: String,
    pub user: UserId,
    pub symbol: Symbol,
    pub kind: RewardKind,
    /// Positive magnitude.
    pub quantity: Decimal,
    pub reason: String,
    pub metadata: Option<serde_json::Value>,
    pub granted_at: Option<TimeMs>,
    pub fingerprint: String,
}

impl ValidGrant {
    /// Quantity with the kind's sign applied.
    pub fn signed_quantity(&self) -> Decimal {
        self.quantity * self.kind.sign()
    }
}

/// Immutable, append-only record of one grant or reversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub reward_id: Uuid,
    pub idempotency_key: String,
    pub user: UserId,
    pub symbol: Symbol,
    pub kind: RewardKind,
    /// Signed: negative for reversals.
    pub quantity: Decimal,
    pub price_per_unit: Decimal,
    /// quantity x price_per_unit at 4 fractional digits (signed).
    pub gross_value: Decimal,
    pub fees: FeeBreakdown,
    /// gross_value + fees.total
    pub total_cost: Decimal,
    pub reason: String,
    pub metadata: Option<serde_json::Value>,
    pub granted_at: TimeMs,
    pub recorded_at: TimeMs,
    pub posting_group_id: String,
    pub request_fingerprint: String,
}

impl RewardRecord {
    /// Posting group shared by every ledger leg of the record with this id.
    pub fn posting_group_for(reward_id: &Uuid) -> String {
        format!("reward:{}", reward_id)
    }
}

/// Stable digest of the economically relevant request fields.
///
/// Truncated SHA-256 (128 bits, hex). Only used to flag idempotency keys
/// reused with a different payload.
pub fn compute_request_fingerprint(
    user: &UserId,
    symbol: &Symbol,
    kind: RewardKind,
    quantity: &Decimal,
) -> String {
    use sha2::{Digest, Sha256};

    fn hash_var(hasher: &mut Sha256, data: &str) {
        hasher.update((data.len() as u32).to_le_bytes());
        hasher.update(data.as_bytes());
    }

    let mut hasher = Sha256::new();
    hash_var(&mut hasher, user.as_str());
    hash_var(&mut hasher, symbol.as_str());
    hash_var(&mut hasher, kind.as_str());
    hash_var(&mut hasher, &quantity.to_canonical_string());

    let hash = hasher.finalize();
    hex::encode(&hash[..16])
}
