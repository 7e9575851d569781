use anyhow::Context;
use sharegrant::config::PriceFallback;
use sharegrant::orchestration::PriceRefresher;
use sharegrant::pricing::{FallbackPriceOracle, SnapshotPriceOracle, SyntheticPriceFeed};
use sharegrant::{api, config::Config, db::init_db, PriceOracle, Reconciler, Repository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("opening database {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    if config.reconcile_on_startup {
        let report = Reconciler::new(repo.clone())
            .run()
            .await
            .context("startup reconciliation")?;
        tracing::info!(?report, "Startup reconciliation complete");
    }

    let refresher = PriceRefresher::new(
        repo.clone(),
        SyntheticPriceFeed::new(),
        config.price_update_interval,
    )
    .spawn();

    let fallback: Option<Arc<dyn PriceOracle>> = match config.price_fallback {
        PriceFallback::None => None,
        PriceFallback::Synthetic => Some(Arc::new(SyntheticPriceFeed::base_only())),
    };
    let oracle: Arc<dyn PriceOracle> = Arc::new(FallbackPriceOracle::new(
        Arc::new(SnapshotPriceOracle::new(repo.clone())),
        fallback,
    ));

    let app = api::create_router(api::AppState::new(repo, oracle, config));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    let served = axum::serve(listener, app).await;
    refresher.abort();
    served.context("server error")
}
