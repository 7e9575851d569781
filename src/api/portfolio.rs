use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;

use super::{parse_user, AppState, UserQuery};
use crate::domain::UserId;
use crate::engine::{summarize, value_holding, HoldingValuation, PortfolioSummary};
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingDto {
    pub symbol: String,
    pub quantity: String,
    pub average_cost: String,
    pub current_price: String,
    pub price_is_fallback: bool,
    pub current_value: String,
    pub cost_basis: String,
    pub profit_loss: String,
    pub profit_loss_pct: String,
}

impl From<&HoldingValuation> for HoldingDto {
    fn from(v: &HoldingValuation) -> Self {
        Self {
            symbol: v.symbol.to_string(),
            quantity: v.quantity.to_canonical_string(),
            average_cost: v.average_cost.to_fixed_string(2),
            current_price: v.current_price.to_fixed_string(2),
            price_is_fallback: v.price_is_fallback,
            current_value: v.current_value.to_fixed_string(2),
            cost_basis: v.cost_basis.to_fixed_string(2),
            profit_loss: v.profit_loss.to_fixed_string(2),
            profit_loss_pct: v.profit_loss_pct.to_fixed_string(2),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDto {
    pub total_value: String,
    pub total_cost: String,
    pub total_profit_loss: String,
    pub holdings_count: usize,
}

impl From<&PortfolioSummary> for SummaryDto {
    fn from(s: &PortfolioSummary) -> Self {
        Self {
            total_value: s.total_value.to_fixed_string(2),
            total_cost: s.total_cost.to_fixed_string(2),
            total_profit_loss: s.total_profit_loss.to_fixed_string(2),
            holdings_count: s.holdings_count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioResponse {
    pub user_id: String,
    pub holdings: Vec<HoldingDto>,
    pub summary: SummaryDto,
}

/// Value every non-empty holding of `user` at the latest known price.
///
/// Holdings with no price are valued at their own average cost.
pub(crate) async fn value_portfolio(
    state: &AppState,
    user: &UserId,
) -> Result<(Vec<HoldingValuation>, PortfolioSummary), AppError> {
    let holdings = state.repo.query_holdings(user).await?;
    let prices = state.oracle.all_current_prices().await?;

    let valuations: Vec<HoldingValuation> = holdings
        .iter()
        .map(|h| value_holding(h, prices.get(&h.symbol).copied()))
        .collect();
    let summary = summarize(&valuations);
    Ok((valuations, summary))
}

pub async fn get_portfolio(
    Query(params): Query<UserQuery>,
    State(state): State<AppState>,
) -> Result<Json<PortfolioResponse>, AppError> {
    let user = parse_user(&params.user)?;
    let (valuations, summary) = value_portfolio(&state, &user).await?;

    Ok(Json(PortfolioResponse {
        user_id: user.to_string(),
        holdings: valuations.iter().map(HoldingDto::from).collect(),
        summary: SummaryDto::from(&summary),
    }))
}
