use crate::authz::pipeline::RecompileReport;
use crate::authz::DbGrantPipeline;
use crate::entities;
use crate::errors::HubError;
use crate::settings::Jobs as JobsCfg;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, NotSet,
    QueryFilter, Set,
};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

pub const REFRESH_EXPIRED_EXPRESSIONS: &str = "refresh_expired_expressions";

pub async fn init_scheduler(
    pipeline: Arc<DbGrantPipeline>,
    cfg: &JobsCfg,
) -> Result<JobScheduler, HubError> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| HubError::Other(format!("Failed to create job scheduler: {}", e)))?;

    let batch_size = cfg.refresh_batch_size;
    let refresh_job = Job::new_async(cfg.expression_refresh_cron.as_str(), move |_uuid, _l| {
        let pipeline = pipeline.clone();
        Box::pin(async move {
            if let Err(e) = run_refresh_expired(&pipeline, batch_size).await {
                error!("Failed to refresh expired expressions: {}", e);
            }
        })
    })
    .map_err(|e| HubError::Other(format!("Failed to create refresh job: {}", e)))?;

    sched
        .add(refresh_job)
        .await
        .map_err(|e| HubError::Other(format!("Failed to add refresh job: {}", e)))?;

    sched
        .start()
        .await
        .map_err(|e| HubError::Other(format!("Failed to start job scheduler: {}", e)))?;

    info!(cron = %cfg.expression_refresh_cron, "Job scheduler started");

    Ok(sched)
}

/// One run of the refresh job, recorded in `job_executions`.
pub async fn run_refresh_expired(
    pipeline: &DbGrantPipeline,
    batch_size: u64,
) -> Result<RecompileReport, HubError> {
    info!("Running {} job", REFRESH_EXPIRED_EXPRESSIONS);
    let db = pipeline.db();
    let execution_id = start_job_execution(db, REFRESH_EXPIRED_EXPRESSIONS)
        .await
        .ok();

    let now = Utc::now().timestamp();
    match pipeline.refresh_expired(now, batch_size).await {
        Ok(report) => {
            info!(
                succeeded = report.succeeded,
                no_grants = report.no_grants,
                failed = report.failed.len(),
                "Refreshed expired expressions"
            );
            if let Some(id) = execution_id {
                let failures = (!report.failed.is_empty())
                    .then(|| format!("{} pairs failed to compile", report.failed.len()));
                let _ = complete_job_execution(
                    db,
                    id,
                    report.failed.is_empty(),
                    failures,
                    Some(report.processed() as i64),
                )
                .await;
            }
            Ok(report)
        }
        Err(e) => {
            if let Some(id) = execution_id {
                let _ = complete_job_execution(db, id, false, Some(e.to_string()), None).await;
            }
            Err(e)
        }
    }
}

pub async fn start_job_execution(
    db: &DatabaseConnection,
    job_name: &str,
) -> Result<i64, HubError> {
    use entities::job_execution;

    let now = Utc::now().timestamp();

    let execution = job_execution::ActiveModel {
        id: NotSet,
        job_name: Set(job_name.to_string()),
        started_at: Set(now),
        completed_at: Set(None),
        success: Set(None),
        error_message: Set(None),
        records_processed: Set(None),
    };

    let result = execution.insert(db).await?;
    Ok(result.id)
}

pub async fn complete_job_execution(
    db: &DatabaseConnection,
    execution_id: i64,
    success: bool,
    error_message: Option<String>,
    records_processed: Option<i64>,
) -> Result<(), HubError> {
    use entities::job_execution::{Column, Entity};

    let now = Utc::now().timestamp();

    if let Some(execution) = Entity::find()
        .filter(Column::Id.eq(execution_id))
        .one(db)
        .await?
    {
        let mut active: entities::job_execution::ActiveModel = execution.into_active_model();
        active.completed_at = Set(Some(now));
        active.success = Set(Some(if success { 1 } else { 0 }));
        active.error_message = Set(error_message);
        active.records_processed = Set(records_processed);
        active.update(db).await?;
    }

    Ok(())
}
