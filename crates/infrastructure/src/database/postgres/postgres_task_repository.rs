use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{debug, instrument};

use aijob_domain::entities::{Task, TaskPriority, TaskStatus};
use aijob_domain::repositories::{TaskFilter, TaskRepository};
use aijob_errors::{SchedulerError, SchedulerResult};

pub struct PostgresTaskRepository {
    pool: PgPool,
}

const TASK_COLUMNS: &str = "id, name, description, model_name, status, priority, input, output, error, created_at, updated_at, started_at, completed_at, worker_id, user_id, timeout_seconds, retry_count, max_retries";

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &PgRow) -> SchedulerResult<Task> {
        let status_str: String = row.try_get("status")?;
        let priority_value: i32 = row.try_get("priority")?;
        let priority = TaskPriority::from_i32(priority_value).ok_or_else(|| {
            SchedulerError::database_error(format!("非法的优先级数值: {priority_value}"))
        })?;

        Ok(Task {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            model_name: row.try_get("model_name")?,
            status: TaskStatus::from_str(&status_str)
                .map_err(|e| SchedulerError::database_error(e.to_string()))?,
            priority,
            input: row.try_get("input")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            started_at: row.try_get::<Option<DateTime<Utc>>, _>("started_at")?,
            completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
            worker_id: row.try_get::<Option<String>, _>("worker_id")?,
            user_id: row.try_get("user_id")?,
            timeout_seconds: row.try_get("timeout_seconds")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
        })
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    #[instrument(skip(self, task), fields(task_id = %task.id, task_name = %task.name))]
    async fn create(&self, task: &Task) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (id, name, description, model_name, status, priority, input, output, error,
                               created_at, updated_at, started_at, completed_at, worker_id, user_id,
                               timeout_seconds, retry_count, max_retries)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(&task.id)
        .bind(&task.name)
        .bind(&task.description)
        .bind(&task.model_name)
        .bind(task.status.as_str())
        .bind(task.priority.as_i32())
        .bind(&task.input)
        .bind(&task.output)
        .bind(&task.error)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(&task.worker_id)
        .bind(&task.user_id)
        .bind(task.timeout_seconds)
        .bind(task.retry_count)
        .bind(task.max_retries)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("创建任务成功: {}", task.entity_description());
                Ok(())
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(SchedulerError::TaskAlreadyExists {
                    id: task.id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn get_by_id(&self, id: &str) -> SchedulerResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    #[instrument(skip(self, task), fields(task_id = %task.id, task_status = %task.status))]
    async fn update(&self, task: &Task) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET name = $2, description = $3, model_name = $4, status = $5, priority = $6,
                input = $7, output = $8, error = $9, updated_at = NOW(),
                started_at = $10, completed_at = $11, worker_id = $12, user_id = $13,
                timeout_seconds = $14, retry_count = $15, max_retries = $16
            WHERE id = $1
            "#,
        )
        .bind(&task.id)
        .bind(&task.name)
        .bind(&task.description)
        .bind(&task.model_name)
        .bind(task.status.as_str())
        .bind(task.priority.as_i32())
        .bind(&task.input)
        .bind(&task.output)
        .bind(&task.error)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(&task.worker_id)
        .bind(&task.user_id)
        .bind(task.timeout_seconds)
        .bind(task.retry_count)
        .bind(task.max_retries)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::task_not_found(&task.id));
        }

        debug!("更新任务成功: {} -> {}", task.id, task.status);
        Ok(())
    }

    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        let mut query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1=1");
        let mut bind_count = 0;

        if filter.status.is_some() {
            bind_count += 1;
            query.push_str(&format!(" AND status = ${bind_count}"));
        }
        if filter.user_id.is_some() {
            bind_count += 1;
            query.push_str(&format!(" AND user_id = ${bind_count}"));
        }

        query.push_str(" ORDER BY priority DESC, created_at ASC, id ASC");

        if filter.limit.is_some() {
            bind_count += 1;
            query.push_str(&format!(" LIMIT ${bind_count}"));
        }
        if filter.offset.is_some() {
            bind_count += 1;
            query.push_str(&format!(" OFFSET ${bind_count}"));
        }

        let mut sqlx_query = sqlx::query(&query);
        if let Some(status) = filter.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(user_id) = &filter.user_id {
            sqlx_query = sqlx_query.bind(user_id);
        }
        if let Some(limit) = filter.limit {
            sqlx_query = sqlx_query.bind(limit);
        }
        if let Some(offset) = filter.offset {
            sqlx_query = sqlx_query.bind(offset);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let tasks: SchedulerResult<Vec<Task>> = rows.iter().map(Self::row_to_task).collect();
        let result = tasks?;
        debug!("查询任务列表成功，返回 {} 个任务", result.len());
        Ok(result)
    }

    #[instrument(skip(self))]
    async fn list_pending(&self, limit: i64) -> SchedulerResult<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = 'pending'
             ORDER BY priority DESC, created_at ASC, id ASC
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self))]
    async fn list_running(&self, limit: i64, offset: i64) -> SchedulerResult<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = 'running'
             ORDER BY started_at ASC, id ASC
             LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    async fn count_by_status(&self, status: TaskStatus) -> SchedulerResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM tasks WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }
}
