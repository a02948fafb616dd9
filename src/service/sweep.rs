use crate::domain::payment::Order;
use crate::error::GatewayError;
use crate::repo::order_store::SweepCriteria;
use crate::service::charge_operations::ChargeOperationsService;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

const DEFAULT_DAYS: i64 = 1;
const MAX_DAYS: i64 = 365;
const DEFAULT_SUCCESS_LIMIT: u32 = 1000;
const DEFAULT_FAILED_LIMIT: u32 = 5;

/// Job parameters after normalization. Out-of-range or unparseable values fall back to defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepParams {
    pub days_past_track: i64,
    pub success_limit: u32,
    pub failed_limit: u32,
}

impl Default for SweepParams {
    fn default() -> Self {
        Self {
            days_past_track: DEFAULT_DAYS,
            success_limit: DEFAULT_SUCCESS_LIMIT,
            failed_limit: DEFAULT_FAILED_LIMIT,
        }
    }
}

impl SweepParams {
    pub fn normalized(days: Option<&str>, success_limit: Option<&str>, failed_limit: Option<&str>) -> Self {
        let parse = |raw: Option<&str>| raw.and_then(|s| s.trim().parse::<i64>().ok());
        let days_past_track = parse(days)
            .filter(|d| (1..=MAX_DAYS).contains(d))
            .unwrap_or(DEFAULT_DAYS);
        let positive = |raw: Option<&str>, default: u32| {
            parse(raw)
                .filter(|n| *n > 0)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(default)
        };
        Self {
            days_past_track,
            success_limit: positive(success_limit, DEFAULT_SUCCESS_LIMIT),
            failed_limit: positive(failed_limit, DEFAULT_FAILED_LIMIT),
        }
    }

    /// Reads `DaysPastTrack`, `{limit_var}` and `{failed_var}` from the environment.
    pub fn from_env(limit_var: &str, failed_var: &str) -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self::normalized(
            var("DaysPastTrack").as_deref(),
            var(limit_var).as_deref(),
            var(failed_var).as_deref(),
        )
    }

    pub fn created_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.days_past_track)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub processed: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepKind {
    Capture,
    Refund,
}

impl SweepKind {
    fn name(&self) -> &'static str {
        match self {
            SweepKind::Capture => "capture",
            SweepKind::Refund => "refund",
        }
    }

    fn criteria(&self, created_since: DateTime<Utc>) -> SweepCriteria {
        match self {
            SweepKind::Capture => SweepCriteria::Capture { created_since },
            SweepKind::Refund => SweepCriteria::Refund { created_since },
        }
    }
}

pub async fn run_capture_sweep(
    ops: &ChargeOperationsService,
    params: SweepParams,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    run_sweep(ops, SweepKind::Capture, params, now).await
}

pub async fn run_refund_sweep(
    ops: &ChargeOperationsService,
    params: SweepParams,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    run_sweep(ops, SweepKind::Refund, params, now).await
}

async fn apply(ops: &ChargeOperationsService, kind: SweepKind, order: &mut Order) -> Result<u32, GatewayError> {
    match kind {
        SweepKind::Capture => ops.capture_order_charges(order).await,
        SweepKind::Refund => ops.refund_order_charges(order, None).await,
    }
}

async fn run_sweep(
    ops: &ChargeOperationsService,
    kind: SweepKind,
    params: SweepParams,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    let criteria = kind.criteria(params.created_since(now));
    let candidates = ops.store.sweep_candidates(&criteria).await?;

    let mut report = SweepReport {
        processed: 0,
        succeeded: 0,
        failed: 0,
        status: JobStatus::Ok,
    };

    for order_no in candidates {
        let Some(mut order) = ops.store.load_order(&order_no).await? else {
            continue;
        };
        report.processed += 1;

        let outcome = apply(ops, kind, &mut order).await;
        ops.store.save_order(&order).await?;
        match outcome {
            Ok(count) => report.succeeded += count,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(order_no = %order_no, sweep = kind.name(), error = %e, "order sweep failed");
            }
        }

        if report.failed >= params.failed_limit {
            report.status = JobStatus::Error;
            tracing::error!(
                sweep = kind.name(),
                failed = report.failed,
                limit = params.failed_limit,
                "failure limit reached, stopping sweep"
            );
            break;
        }
        if report.succeeded >= params.success_limit {
            tracing::warn!(
                sweep = kind.name(),
                succeeded = report.succeeded,
                limit = params.success_limit,
                "success limit reached, stopping sweep"
            );
            break;
        }
    }

    tracing::info!(
        sweep = kind.name(),
        processed = report.processed,
        succeeded = report.succeeded,
        failed = report.failed,
        "sweep finished"
    );
    Ok(report)
}
