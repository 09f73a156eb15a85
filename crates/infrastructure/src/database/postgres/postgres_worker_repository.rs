use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{debug, instrument};

use aijob_domain::entities::{WorkerInfo, WorkerStatus};
use aijob_domain::repositories::WorkerRepository;
use aijob_errors::{SchedulerError, SchedulerResult};

pub struct PostgresWorkerRepository {
    pool: PgPool,
}

const WORKER_COLUMNS: &str = "id, name, status, capabilities, current_task_id, last_heartbeat, registered_at, available_cpu, available_memory, available_gpu, total_tasks_handled";

impl PostgresWorkerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_worker(row: &PgRow) -> SchedulerResult<WorkerInfo> {
        let status_str: String = row.try_get("status")?;
        let capabilities_json: String = row.try_get("capabilities")?;
        let capabilities: Vec<String> = serde_json::from_str(&capabilities_json)?;

        Ok(WorkerInfo {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            status: WorkerStatus::from_str(&status_str)
                .map_err(|e| SchedulerError::database_error(e.to_string()))?,
            capabilities,
            current_task_id: row.try_get::<Option<String>, _>("current_task_id")?,
            last_heartbeat: row.try_get::<DateTime<Utc>, _>("last_heartbeat")?,
            registered_at: row.try_get::<DateTime<Utc>, _>("registered_at")?,
            available_cpu: row.try_get("available_cpu")?,
            available_memory: row.try_get("available_memory")?,
            available_gpu: row.try_get("available_gpu")?,
            total_tasks_handled: row.try_get("total_tasks_handled")?,
        })
    }
}

#[async_trait]
impl WorkerRepository for PostgresWorkerRepository {
    #[instrument(skip(self, worker), fields(worker_id = %worker.id, worker_name = %worker.name))]
    async fn register(&self, worker: &WorkerInfo) -> SchedulerResult<()> {
        let capabilities_json = serde_json::to_string(&worker.capabilities)?;

        let result = sqlx::query(
            r#"
            INSERT INTO workers (id, name, status, capabilities, current_task_id, last_heartbeat,
                                 registered_at, available_cpu, available_memory, available_gpu,
                                 total_tasks_handled)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&worker.id)
        .bind(&worker.name)
        .bind(worker.status.as_str())
        .bind(capabilities_json)
        .bind(&worker.current_task_id)
        .bind(worker.last_heartbeat)
        .bind(worker.registered_at)
        .bind(worker.available_cpu)
        .bind(worker.available_memory)
        .bind(worker.available_gpu)
        .bind(worker.total_tasks_handled)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("注册Worker成功: {}", worker.entity_description());
                Ok(())
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(SchedulerError::WorkerAlreadyExists {
                    id: worker.id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(worker_id = %id))]
    async fn get_by_id(&self, id: &str) -> SchedulerResult<Option<WorkerInfo>> {
        let row = sqlx::query(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_worker).transpose()
    }

    #[instrument(skip(self, worker), fields(worker_id = %worker.id, worker_status = %worker.status))]
    async fn update(&self, worker: &WorkerInfo) -> SchedulerResult<()> {
        let capabilities_json = serde_json::to_string(&worker.capabilities)?;

        let result = sqlx::query(
            r#"
            UPDATE workers
            SET name = $2, status = $3, capabilities = $4, current_task_id = $5,
                last_heartbeat = $6, available_cpu = $7, available_memory = $8,
                available_gpu = $9, total_tasks_handled = $10
            WHERE id = $1
            "#,
        )
        .bind(&worker.id)
        .bind(&worker.name)
        .bind(worker.status.as_str())
        .bind(capabilities_json)
        .bind(&worker.current_task_id)
        .bind(worker.last_heartbeat)
        .bind(worker.available_cpu)
        .bind(worker.available_memory)
        .bind(worker.available_gpu)
        .bind(worker.total_tasks_handled)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::worker_not_found(&worker.id));
        }

        debug!("更新Worker成功: {} -> {}", worker.id, worker.status);
        Ok(())
    }

    #[instrument(skip(self), fields(worker_id = %id))]
    async fn update_heartbeat(&self, id: &str) -> SchedulerResult<()> {
        let result = sqlx::query("UPDATE workers SET last_heartbeat = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::worker_not_found(id));
        }
        Ok(())
    }

    async fn list(&self) -> SchedulerResult<Vec<WorkerInfo>> {
        let rows = sqlx::query(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers ORDER BY registered_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_worker).collect()
    }

    #[instrument(skip(self))]
    async fn list_available(&self, freshness: Duration) -> SchedulerResult<Vec<WorkerInfo>> {
        // 偏向资源富余的节点，便于装入后续的小任务
        let threshold = Utc::now() - freshness;
        let rows = sqlx::query(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers
             WHERE status = 'available' AND current_task_id IS NULL AND last_heartbeat > $1
             ORDER BY available_gpu DESC, available_memory DESC"
        ))
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_worker).collect()
    }
}
