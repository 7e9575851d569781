use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;

use super::portfolio::value_portfolio;
use super::{parse_user, AppState, UserQuery};
use crate::domain::{Decimal, Symbol, TimeMs};
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolTodayDto {
    pub symbol: String,
    pub total_quantity: String,
    pub reward_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub user_id: String,
    pub today_by_symbol: Vec<SymbolTodayDto>,
    pub total_quantity_today: String,
    pub portfolio_value: String,
}

pub async fn get_stats(
    Query(params): Query<UserQuery>,
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, AppError> {
    let user = parse_user(&params.user)?;
    let start = TimeMs::now().start_of_utc_day();
    let end = TimeMs::new(start.as_ms() + 86_400_000);

    let records = state.repo.query_rewards(&user, start, end).await?;
    let mut by_symbol: BTreeMap<Symbol, (Decimal, usize)> = BTreeMap::new();
    for record in &records {
        let entry = by_symbol.entry(record.symbol.clone()).or_default();
        entry.0 = entry.0 + record.quantity;
        entry.1 += 1;
    }
    let total_quantity_today: Decimal = by_symbol.values().map(|(q, _)| *q).sum();

    let (_, summary) = value_portfolio(&state, &user).await?;

    Ok(Json(StatsResponse {
        user_id: user.to_string(),
        today_by_symbol: by_symbol
            .into_iter()
            .map(|(symbol, (quantity, count))| SymbolTodayDto {
                symbol: symbol.to_string(),
                total_quantity: quantity.to_canonical_string(),
                reward_count: count,
            })
            .collect(),
        total_quantity_today: total_quantity_today.to_canonical_string(),
        portfolio_value: summary.total_value.to_fixed_string(2),
    }))
}
