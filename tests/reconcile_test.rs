use sharegrant::db::init_db;
use sharegrant::engine::FeeSchedule;
use sharegrant::orchestration::ReconcileReport;
use sharegrant::{
    Decimal, GrantRequest, Reconciler, Repository, RewardEngine, StaticPriceOracle, Symbol, UserId,
};
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

async fn setup_repo() -> (Arc<Repository>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    (Arc::new(Repository::new(pool)), temp_dir)
}

#[tokio::test]
async fn test_reconcile_repairs_stale_holding_and_missing_postings() {
    let (repo, _temp) = setup_repo().await;
    let engine = RewardEngine::new(
        repo.clone(),
        Arc::new(
            StaticPriceOracle::new()
                .with_price("INFY", d("1500"))
                .with_price("TCS", d("3500")),
        ),
        FeeSchedule::default(),
    );

    engine
        .grant_reward(&GrantRequest::grant("a", "user-1", "INFY", d("5")))
        .await
        .unwrap();
    let lost = engine
        .grant_reward(&GrantRequest::grant("b", "user-1", "INFY", d("3")))
        .await
        .unwrap();
    engine
        .grant_reward(&GrantRequest::reversal("c", "user-1", "INFY", d("4")))
        .await
        .unwrap();
    engine
        .grant_reward(&GrantRequest::grant("d", "user-2", "TCS", d("1")))
        .await
        .unwrap();

    // Simulate a post-persistence failure: the aggregate drifted and one
    // group never reached the ledger.
    sqlx::query("UPDATE holdings SET total_quantity = '1', average_cost = '1' WHERE user_id = 'user-1'")
        .execute(repo.pool())
        .await
        .unwrap();
    sqlx::query("DELETE FROM ledger_postings WHERE posting_group_id = ?")
        .bind(&lost.record.posting_group_id)
        .execute(repo.pool())
        .await
        .unwrap();

    let report = Reconciler::new(repo.clone()).run().await.unwrap();
    assert_eq!(
        report,
        ReconcileReport {
            pairs_rebuilt: 2,
            reversals_skipped: 0,
            groups_posted: 1,
        }
    );

    let holding = repo
        .get_holding(
            &UserId::new("user-1".to_string()),
            &Symbol::new("INFY".to_string()),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(holding.total_quantity, d("4"));
    assert_eq!(holding.average_cost, d("1500"));

    let postings = repo
        .query_postings(&lost.record.posting_group_id)
        .await
        .unwrap();
    assert_eq!(postings.len(), 4);

    // Grants after reconciliation continue from the rebuilt state.
    engine
        .grant_reward(&GrantRequest::grant("e", "user-1", "INFY", d("1")))
        .await
        .unwrap();
    let holding = repo
        .get_holding(
            &UserId::new("user-1".to_string()),
            &Symbol::new("INFY".to_string()),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(holding.total_quantity, d("5"));
}
