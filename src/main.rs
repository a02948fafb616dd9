use gateway_checkout::config::AppConfig;
use gateway_checkout::gateways::client::GatewayClient;
use gateway_checkout::http::routes::router;
use gateway_checkout::repo::pg_store::PgOrderStore;
use gateway_checkout::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let gateway = Arc::new(GatewayClient::from_settings(&cfg.gateway));
    let store = Arc::new(PgOrderStore { pool });
    tracing::info!(
        gateway = cfg.gateway.profile.name,
        base_url = %cfg.gateway.base_url,
        "gateway configured"
    );

    let state = AppState::new(gateway, store, cfg.gateway.clone());
    let app = router(state, cfg.internal_api_key.clone());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
