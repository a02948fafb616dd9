use anyhow::Result;
use gateway_checkout::config::AppConfig;
use gateway_checkout::gateways::client::GatewayClient;
use gateway_checkout::repo::pg_store::PgOrderStore;
use gateway_checkout::service::charge_operations::ChargeOperationsService;
use gateway_checkout::service::sweep::{run_refund_sweep, JobStatus, SweepParams};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cfg.database_url)
        .await?;

    let ops = ChargeOperationsService {
        gateway: Arc::new(GatewayClient::from_settings(&cfg.gateway)),
        store: Arc::new(PgOrderStore { pool }),
        settings: Arc::new(cfg.gateway.clone()),
    };
    let params = SweepParams::from_env("RefundLimit", "FailedRefundLimit");

    let report = run_refund_sweep(&ops, params, chrono::Utc::now()).await?;
    if report.status == JobStatus::Error {
        anyhow::bail!("refund sweep stopped after {} failures", report.failed);
    }
    Ok(())
}
