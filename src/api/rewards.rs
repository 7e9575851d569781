use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::{parse_user, AppState, RewardDto, UserQuery};
use crate::domain::{Decimal, GrantRequest, RewardKind, TimeMs};
use crate::error::AppError;

const DISPLAY_DP: u32 = 2;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRewardBody {
    pub idempotency_key: String,
    pub user_id: String,
    pub symbol: String,
    /// Positive magnitude, as a JSON number or a decimal string.
    pub quantity: serde_json::Value,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub granted_at_ms: Option<i64>,
}

impl CreateRewardBody {
    fn into_request(self) -> Result<GrantRequest, AppError> {
        let quantity = match &self.quantity {
            serde_json::Value::String(s) => Decimal::from_str_canonical(s).ok(),
            serde_json::Value::Number(n) => Decimal::from_str_canonical(&n.to_string()).ok(),
            _ => None,
        }
        .ok_or_else(|| AppError::BadRequest(format!("invalid quantity: {}", self.quantity)))?;

        let kind = match self.kind.as_deref() {
            None => RewardKind::Grant,
            Some(k) => RewardKind::from_str(k).map_err(|e| AppError::BadRequest(e.to_string()))?,
        };

        Ok(GrantRequest {
            idempotency_key: self.idempotency_key,
            user: self.user_id,
            symbol: self.symbol,
            quantity,
            kind,
            reason: self.reason,
            metadata: self.metadata,
            granted_at: self.granted_at_ms.map(TimeMs::new),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRewardResponse {
    pub reward: RewardDto,
    pub replayed: bool,
    pub warnings: Vec<String>,
}

/// 201 on first processing, 200 when the key was already processed.
pub async fn create_reward(
    State(state): State<AppState>,
    payload: Result<Json<CreateRewardBody>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateRewardResponse>), AppError> {
    let Json(body) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let request = body.into_request()?;

    let outcome = state.engine.grant_reward(&request).await?;
    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(CreateRewardResponse {
            reward: RewardDto::from(&outcome.record),
            replayed: outcome.replayed,
            warnings: outcome.warnings,
        }),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayRewardsResponse {
    pub user_id: String,
    pub date: NaiveDate,
    pub count: usize,
    pub rewards: Vec<RewardDto>,
}

/// Rewards granted during the current UTC day, newest first.
pub async fn get_today_rewards(
    Query(params): Query<UserQuery>,
    State(state): State<AppState>,
) -> Result<Json<TodayRewardsResponse>, AppError> {
    let user = parse_user(&params.user)?;
    let now = TimeMs::now();
    let start = now.start_of_utc_day();
    let end = TimeMs::new(start.as_ms() + 86_400_000);

    let records = state.repo.query_rewards(&user, start, end).await?;
    let rewards: Vec<RewardDto> = records.iter().map(RewardDto::from).collect();

    Ok(Json(TodayRewardsResponse {
        user_id: user.to_string(),
        date: now.utc_date(),
        count: rewards.len(),
        rewards,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyValueDto {
    pub date: NaiveDate,
    pub total_value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalValueResponse {
    pub user_id: String,
    pub days: Vec<DailyValueDto>,
    pub total_value: String,
}

/// Sum of gross value per UTC day for every day before today.
pub async fn get_historical_value(
    Query(params): Query<UserQuery>,
    State(state): State<AppState>,
) -> Result<Json<HistoricalValueResponse>, AppError> {
    let user = parse_user(&params.user)?;
    let today_start = TimeMs::now().start_of_utc_day();

    let records = state
        .repo
        .query_rewards(&user, TimeMs::new(i64::MIN), today_start)
        .await?;

    let mut per_day: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for record in &records {
        let day = per_day.entry(record.granted_at.utc_date()).or_default();
        *day = *day + record.gross_value;
    }

    let total: Decimal = per_day.values().copied().sum();
    let days = per_day
        .into_iter()
        .map(|(date, value)| DailyValueDto {
            date,
            total_value: value.to_fixed_string(DISPLAY_DP),
        })
        .collect();

    Ok(Json(HistoricalValueResponse {
        user_id: user.to_string(),
        days,
        total_value: total.to_fixed_string(DISPLAY_DP),
    }))
}
