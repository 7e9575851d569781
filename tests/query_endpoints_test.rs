use axum::http::StatusCode;
use sharegrant::api;
use sharegrant::config::Config;
use sharegrant::db::init_db;
use sharegrant::{
    Decimal, GrantRequest, PriceOracle, Repository, RewardEngine, StaticPriceOracle, TimeMs,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

const DAY_MS: i64 = 86_400_000;
// 2024-03-15T13:45:00Z
const MAR_15: i64 = 1_710_510_300_000;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

struct TestEnv {
    repo: Arc<Repository>,
    config: Config,
    _temp: TempDir,
}

async fn setup_env() -> TestEnv {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let config = Config::from_env_map(HashMap::from([(
        "DATABASE_PATH".to_string(),
        db_path,
    )]))
    .unwrap();
    TestEnv {
        repo: Arc::new(Repository::new(pool)),
        config,
        _temp: temp_dir,
    }
}

fn grant_prices() -> StaticPriceOracle {
    StaticPriceOracle::new()
        .with_price("TCS", d("3500"))
        .with_price("INFY", d("1500"))
}

impl TestEnv {
    fn app(&self, oracle: StaticPriceOracle) -> axum::Router {
        let oracle: Arc<dyn PriceOracle> = Arc::new(oracle);
        api::create_router(api::AppState::new(
            self.repo.clone(),
            oracle,
            self.config.clone(),
        ))
    }

    async fn grant(&self, key: &str, user: &str, symbol: &str, qty: &str, at: Option<i64>) {
        let engine = RewardEngine::new(
            self.repo.clone(),
            Arc::new(grant_prices()),
            self.config.fee_schedule(),
        );
        let mut request = GrantRequest::grant(key, user, symbol, d(qty));
        request.granted_at = at.map(TimeMs::new);
        let outcome = engine.grant_reward(&request).await.unwrap();
        assert!(outcome.warnings.is_empty());
    }
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_today_rewards_newest_first_and_scoped_to_user() {
    let env = setup_env().await;
    let now = TimeMs::now().as_ms();
    let today_start = TimeMs::now().start_of_utc_day().as_ms();

    env.grant("old", "user-1", "TCS", "1", Some(MAR_15)).await;
    env.grant("t1", "user-1", "TCS", "1", Some(today_start)).await;
    env.grant("t2", "user-1", "INFY", "2", Some(now)).await;
    env.grant("other", "user-2", "TCS", "5", None).await;

    let (status, json) = get(env.app(grant_prices()), "/v1/rewards/today?user=user-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    let rewards = json["rewards"].as_array().unwrap();
    assert_eq!(rewards[0]["idempotencyKey"], "t2");
    assert_eq!(rewards[1]["idempotencyKey"], "t1");
    assert_eq!(
        json["date"],
        TimeMs::now().utc_date().format("%Y-%m-%d").to_string()
    );
}

#[tokio::test]
async fn test_historical_value_groups_by_utc_day_before_today() {
    let env = setup_env().await;

    env.grant("a", "user-1", "TCS", "1", Some(MAR_15)).await;
    env.grant("b", "user-1", "INFY", "0.5", Some(MAR_15 + 3_600_000)).await;
    env.grant("c", "user-1", "INFY", "1", Some(MAR_15 + DAY_MS)).await;
    env.grant("today", "user-1", "TCS", "1", None).await;

    let (status, json) = get(env.app(grant_prices()), "/v1/rewards/historical?user=user-1").await;
    assert_eq!(status, StatusCode::OK);

    let days = json["days"].as_array().unwrap();
    assert_eq!(days.len(), 2);
    assert_eq!(days[0]["date"], "2024-03-15");
    assert_eq!(days[0]["totalValue"], "4250.00");
    assert_eq!(days[1]["date"], "2024-03-16");
    assert_eq!(days[1]["totalValue"], "1500.00");
    assert_eq!(json["totalValue"], "5750.00");
}

#[tokio::test]
async fn test_stats_groups_today_by_symbol() {
    let env = setup_env().await;
    env.grant("s1", "user-1", "TCS", "2", None).await;
    env.grant("s2", "user-1", "TCS", "0.5", None).await;
    env.grant("s3", "user-1", "INFY", "1", None).await;
    env.grant("s4", "user-1", "INFY", "4", Some(MAR_15)).await;

    let (status, json) = get(env.app(grant_prices()), "/v1/stats?user=user-1").await;
    assert_eq!(status, StatusCode::OK);

    let by_symbol = json["todayBySymbol"].as_array().unwrap();
    assert_eq!(by_symbol.len(), 2);
    assert_eq!(by_symbol[0]["symbol"], "INFY");
    assert_eq!(by_symbol[0]["totalQuantity"], "1");
    assert_eq!(by_symbol[0]["rewardCount"], 1);
    assert_eq!(by_symbol[1]["symbol"], "TCS");
    assert_eq!(by_symbol[1]["totalQuantity"], "2.5");
    assert_eq!(by_symbol[1]["rewardCount"], 2);
    assert_eq!(json["totalQuantityToday"], "3.5");
    // 2.5 TCS @ 3500 + 5 INFY @ 1500
    assert_eq!(json["portfolioValue"], "16250.00");
}

#[tokio::test]
async fn test_portfolio_values_at_latest_price_with_fallback() {
    let env = setup_env().await;
    env.grant("p1", "user-1", "TCS", "2", None).await;
    env.grant("p2", "user-1", "INFY", "1", None).await;

    // TCS moved up; INFY has no price and falls back to its average cost.
    let app = env.app(StaticPriceOracle::new().with_price("TCS", d("3600")));
    let (status, json) = get(app, "/v1/portfolio?user=user-1").await;
    assert_eq!(status, StatusCode::OK);

    let holdings = json["holdings"].as_array().unwrap();
    assert_eq!(holdings.len(), 2);

    let infy = &holdings[0];
    assert_eq!(infy["symbol"], "INFY");
    assert_eq!(infy["priceIsFallback"], true);
    assert_eq!(infy["currentValue"], "1500.00");
    assert_eq!(infy["profitLoss"], "0.00");

    let tcs = &holdings[1];
    assert_eq!(tcs["symbol"], "TCS");
    assert_eq!(tcs["quantity"], "2");
    assert_eq!(tcs["currentPrice"], "3600.00");
    assert_eq!(tcs["currentValue"], "7200.00");
    assert_eq!(tcs["costBasis"], "7000.00");
    assert_eq!(tcs["profitLoss"], "200.00");
    assert_eq!(tcs["profitLossPct"], "2.86");

    let summary = &json["summary"];
    assert_eq!(summary["totalValue"], "8700.00");
    assert_eq!(summary["totalCost"], "8500.00");
    assert_eq!(summary["totalProfitLoss"], "200.00");
    assert_eq!(summary["holdingsCount"], 2);
}

#[tokio::test]
async fn test_empty_user_is_bad_request_and_unknown_user_is_empty() {
    let env = setup_env().await;

    let (status, json) = get(env.app(grant_prices()), "/v1/portfolio?user=%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "invalid_input");

    let (status, json) = get(env.app(grant_prices()), "/v1/portfolio?user=nobody").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["holdings"].as_array().unwrap().len(), 0);
    assert_eq!(json["summary"]["totalValue"], "0.00");
}
