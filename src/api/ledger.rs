use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::domain::{is_balanced, Decimal, LedgerPosting, MONEY_DP};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerQuery {
    pub posting_group_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingDto {
    pub leg: i32,
    pub account_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub debit_amount: String,
    pub credit_amount: String,
    pub description: String,
    pub created_at_ms: i64,
}

impl From<&LedgerPosting> for PostingDto {
    fn from(p: &LedgerPosting) -> Self {
        Self {
            leg: p.leg,
            account_type: p.account_type.to_string(),
            symbol: p.symbol.as_ref().map(|s| s.to_string()),
            debit_amount: p.debit_amount.to_fixed_string(MONEY_DP),
            credit_amount: p.credit_amount.to_fixed_string(MONEY_DP),
            description: p.description.clone(),
            created_at_ms: p.created_at.as_ms(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerResponse {
    pub posting_group_id: String,
    pub reward_id: String,
    pub postings: Vec<PostingDto>,
    pub total_debit: String,
    pub total_credit: String,
    pub balanced: bool,
}

pub async fn get_ledger(
    Query(params): Query<LedgerQuery>,
    State(state): State<AppState>,
) -> Result<Json<LedgerResponse>, AppError> {
    let group = params.posting_group_id.trim();
    if group.is_empty() {
        return Err(AppError::BadRequest(
            "postingGroupId must not be empty".to_string(),
        ));
    }

    let postings = state.repo.query_postings(group).await?;
    let Some(first) = postings.first() else {
        return Err(AppError::NotFound(format!("posting group {}", group)));
    };

    let total_debit: Decimal = postings.iter().map(|p| p.debit_amount).sum();
    let total_credit: Decimal = postings.iter().map(|p| p.credit_amount).sum();

    Ok(Json(LedgerResponse {
        posting_group_id: group.to_string(),
        reward_id: first.reward_id.to_string(),
        postings: postings.iter().map(PostingDto::from).collect(),
        total_debit: total_debit.to_fixed_string(MONEY_DP),
        total_credit: total_credit.to_fixed_string(MONEY_DP),
        balanced: is_balanced(&postings),
    }))
}
