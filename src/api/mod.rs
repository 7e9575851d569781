pub mod health;
pub mod ledger;
pub mod portfolio;
pub mod rewards;
pub mod stats;

use crate::config::Config;
use crate::db::Repository;
use crate::domain::{Decimal, RewardRecord, UserId, MONEY_DP};
use crate::error::AppError;
use crate::orchestration::RewardEngine;
use crate::pricing::PriceOracle;
use axum::{
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub engine: Arc<RewardEngine>,
    pub oracle: Arc<dyn PriceOracle>,
    pub config: Config,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, oracle: Arc<dyn PriceOracle>, config: Config) -> Self {
        let engine = Arc::new(RewardEngine::new(
            repo.clone(),
            oracle.clone(),
            config.fee_schedule(),
        ));
        Self {
            repo,
            engine,
            oracle,
            config,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/rewards", post(rewards::create_reward))
        .route("/v1/rewards/today", get(rewards::get_today_rewards))
        .route("/v1/rewards/historical", get(rewards::get_historical_value))
        .route("/v1/stats", get(stats::get_stats))
        .route("/v1/portfolio", get(portfolio::get_portfolio))
        .route("/v1/ledger", get(ledger::get_ledger))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// `?user=` query shared by the per-user read endpoints.
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user: String,
}

pub(crate) fn parse_user(raw: &str) -> Result<UserId, AppError> {
    UserId::from_str(raw).map_err(|e| AppError::BadRequest(format!("invalid user: {}", e)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeesDto {
    pub brokerage: String,
    pub transaction_tax: String,
    pub tax_on_brokerage: String,
    pub exchange_fee: String,
    pub regulatory_fee: String,
    pub total_fees: String,
}

/// Wire form of a reward record. Money has 4 fractional digits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardDto {
    pub reward_id: String,
    pub idempotency_key: String,
    pub user_id: String,
    pub symbol: String,
    pub kind: String,
    pub quantity: String,
    pub price_per_unit: String,
    pub gross_value: String,
    pub fees: FeesDto,
    pub total_cost: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub granted_at_ms: i64,
    pub recorded_at_ms: i64,
    pub posting_group_id: String,
}

fn money(value: Decimal) -> String {
    value.to_fixed_string(MONEY_DP)
}

impl From<&RewardRecord> for RewardDto {
    fn from(r: &RewardRecord) -> Self {
        Self {
            reward_id: r.reward_id.to_string(),
            idempotency_key: r.idempotency_key.clone(),
            user_id: r.user.to_string(),
            symbol: r.symbol.to_string(),
            kind: r.kind.to_string(),
            quantity: r.quantity.to_canonical_string(),
            price_per_unit: money(r.price_per_unit),
            gross_value: money(r.gross_value),
            fees: FeesDto {
                brokerage: money(r.fees.brokerage),
                transaction_tax: money(r.fees.transaction_tax),
                tax_on_brokerage: money(r.fees.tax_on_brokerage),
                exchange_fee: money(r.fees.exchange_fee),
                regulatory_fee: money(r.fees.regulatory_fee),
                total_fees: money(r.fees.total),
            },
            total_cost: money(r.total_cost),
            reason: r.reason.clone(),
            metadata: r.metadata.clone(),
            granted_at_ms: r.granted_at.as_ms(),
            recorded_at_ms: r.recorded_at.as_ms(),
            posting_group_id: r.posting_group_id.clone(),
        }
    }
}
