use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::validation::ConfigValidator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
    pub mcp: McpConfig,
    pub worker: WorkerAgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

/// 调度核心的三个循环周期与批量参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 分配循环周期，同时决定超时清扫周期（×10）
    pub poll_interval_seconds: u64,
    /// 心跳间隔，失联阈值为该值的两倍
    pub heartbeat_interval_seconds: u64,
    /// 调度器侧任务超时上限，实际超时取任务自带值与该值的较小者
    pub task_timeout_seconds: i64,
    /// 单次分配批量；0 表示按可用Worker数的两倍推导
    pub max_tasks: i64,
    /// list_available 的心跳新鲜度窗口
    pub heartbeat_freshness_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    pub enabled: bool,
    pub server_url: String,
    pub timeout_seconds: u64,
}

/// Worker代理配置（worker运行模式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerAgentConfig {
    pub enabled: bool,
    pub name: String,
    pub api_url: String,
    pub capabilities: Vec<String>,
    pub available_cpu: f64,
    pub available_memory: i64,
    pub available_gpu: f64,
    pub poll_interval_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    /// 模型推理服务地址，未配置时Worker只能执行空模型任务
    pub model_endpoint: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/aijob".to_string(),
                max_connections: 10,
                min_connections: 1,
                connection_timeout_seconds: 30,
                idle_timeout_seconds: 600,
            },
            scheduler: SchedulerConfig {
                enabled: true,
                poll_interval_seconds: 1,
                heartbeat_interval_seconds: 30,
                task_timeout_seconds: 1800,
                max_tasks: 0,
                heartbeat_freshness_seconds: 60,
            },
            api: ApiConfig {
                enabled: true,
                bind_address: "0.0.0.0:8080".to_string(),
                cors_enabled: true,
                cors_origins: vec!["*".to_string()],
                request_timeout_seconds: 30,
            },
            observability: ObservabilityConfig {
                metrics_enabled: true,
                metrics_bind_address: "0.0.0.0:9090".to_string(),
                log_level: "info".to_string(),
            },
            mcp: McpConfig {
                enabled: false,
                server_url: String::new(),
                timeout_seconds: 60,
            },
            worker: WorkerAgentConfig {
                enabled: false,
                name: "worker-001".to_string(),
                api_url: "http://127.0.0.1:8080".to_string(),
                capabilities: vec![],
                available_cpu: 2.0,
                available_memory: 4 * 1024 * 1024 * 1024,
                available_gpu: 1.0,
                poll_interval_seconds: 1,
                heartbeat_interval_seconds: 30,
                model_endpoint: None,
            },
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        }

        // 叠加顺序：默认值 < 配置文件 < AIJOB__ 环境变量
        let defaults = toml::to_string(&AppConfig::default()).context("序列化默认配置失败")?;
        let mut builder = ConfigBuilder::builder()
            .add_source(File::from_str(&defaults, FileFormat::Toml));

        let file = config_path.map(str::to_string).or_else(|| {
            ["config/aijob.toml", "aijob.toml", "/etc/aijob/config.toml"]
                .into_iter()
                .find(|p| Path::new(p).exists())
                .map(str::to_string)
        });
        if let Some(path) = file {
            builder = builder.add_source(File::new(&path, FileFormat::Toml));
        }

        let builder = builder.add_source(
            Environment::with_prefix("AIJOB")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate().context("配置验证失败")?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate().context("配置验证失败")?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.scheduler.poll_interval_seconds, 1);
        assert_eq!(config.scheduler.heartbeat_interval_seconds, 30);
        assert_eq!(config.scheduler.task_timeout_seconds, 1800);
        assert_eq!(config.scheduler.max_tasks, 0);
        assert_eq!(config.api.bind_address, "0.0.0.0:8080");
        assert!(!config.mcp.enabled);
    }

    #[test]
    fn test_app_config_default_validates() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_app_config_from_toml() {
        let toml_str = r#"
[database]
url = "postgresql://localhost/aijob_test"
max_connections = 20
min_connections = 2
connection_timeout_seconds = 10
idle_timeout_seconds = 300

[scheduler]
enabled = true
poll_interval_seconds = 2
heartbeat_interval_seconds = 15
task_timeout_seconds = 600
max_tasks = 50
heartbeat_freshness_seconds = 30

[api]
enabled = true
bind_address = "127.0.0.1:9000"
cors_enabled = false
cors_origins = []
request_timeout_seconds = 15

[observability]
metrics_enabled = false
metrics_bind_address = "127.0.0.1:9091"
log_level = "debug"

[mcp]
enabled = true
server_url = "http://localhost:5000"
timeout_seconds = 30

[worker]
enabled = false
name = "w1"
api_url = "http://127.0.0.1:9000"
capabilities = ["llama-7b"]
available_cpu = 4.0
available_memory = 8589934592
available_gpu = 1.0
poll_interval_seconds = 1
heartbeat_interval_seconds = 10
"#;

        let config = AppConfig::from_toml(toml_str).expect("解析TOML失败");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.scheduler.poll_interval_seconds, 2);
        assert_eq!(config.scheduler.max_tasks, 50);
        assert_eq!(config.api.bind_address, "127.0.0.1:9000");
        assert!(config.mcp.enabled);
        assert_eq!(config.worker.capabilities, vec!["llama-7b".to_string()]);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(
            parsed.scheduler.poll_interval_seconds,
            config.scheduler.poll_interval_seconds
        );
        assert_eq!(parsed.database.url, config.database.url);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let mut config = AppConfig::default();
        config.scheduler.poll_interval_seconds = 0;
        let toml_str = config.to_toml().unwrap();
        assert!(AppConfig::from_toml(&toml_str).is_err());
    }
}
