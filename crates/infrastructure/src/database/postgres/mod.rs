mod postgres_task_repository;
mod postgres_worker_repository;

pub use postgres_task_repository::PostgresTaskRepository;
pub use postgres_worker_repository::PostgresWorkerRepository;

use aijob_errors::SchedulerResult;
use sqlx::PgPool;
use tracing::debug;

/// 建表与索引，幂等执行
pub async fn run_migrations(pool: &PgPool) -> SchedulerResult<()> {
    debug!("执行数据库schema初始化");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            model_name TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending',
            priority INTEGER NOT NULL DEFAULT 2,
            input BYTEA NOT NULL DEFAULT ''::bytea,
            output BYTEA NOT NULL DEFAULT ''::bytea,
            error TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            worker_id TEXT,
            user_id TEXT NOT NULL DEFAULT '',
            timeout_seconds BIGINT NOT NULL DEFAULT 1800,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'available',
            capabilities TEXT NOT NULL DEFAULT '[]',
            current_task_id TEXT,
            last_heartbeat TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            registered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            available_cpu DOUBLE PRECISION NOT NULL DEFAULT 0,
            available_memory BIGINT NOT NULL DEFAULT 0,
            available_gpu DOUBLE PRECISION NOT NULL DEFAULT 0,
            total_tasks_handled BIGINT NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_tasks_status_priority ON tasks(status, priority DESC, created_at ASC)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_worker_id ON tasks(worker_id)",
        "CREATE INDEX IF NOT EXISTS idx_workers_status ON workers(status)",
        "CREATE INDEX IF NOT EXISTS idx_workers_last_heartbeat ON workers(last_heartbeat)",
    ];
    for index_sql in indexes {
        sqlx::query(index_sql).execute(pool).await?;
    }

    debug!("数据库schema初始化完成");
    Ok(())
}
