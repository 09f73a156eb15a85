use anyhow::{bail, Result};

use crate::models::{
    ApiConfig, AppConfig, DatabaseConfig, McpConfig, ObservabilityConfig, SchedulerConfig,
    WorkerAgentConfig,
};

/// 配置项自校验，加载后立即执行；失败即视为致命初始化错误
pub trait ConfigValidator {
    fn validate(&self) -> Result<()>;
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            bail!("数据库URL不能为空");
        }
        if self.max_connections == 0 {
            bail!("数据库最大连接数必须大于0");
        }
        if self.min_connections > self.max_connections {
            bail!("数据库最小连接数不能大于最大连接数");
        }
        Ok(())
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> Result<()> {
        if self.poll_interval_seconds == 0 {
            bail!("分配循环周期必须大于0");
        }
        if self.heartbeat_interval_seconds == 0 {
            bail!("心跳间隔必须大于0");
        }
        if self.task_timeout_seconds <= 0 {
            bail!("任务超时上限必须大于0");
        }
        if self.max_tasks < 0 {
            bail!("分配批量不能为负数");
        }
        if self.heartbeat_freshness_seconds <= 0 {
            bail!("心跳新鲜度窗口必须大于0");
        }
        Ok(())
    }
}

impl ConfigValidator for ApiConfig {
    fn validate(&self) -> Result<()> {
        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            bail!("API监听地址无效: {}", self.bind_address);
        }
        if self.request_timeout_seconds == 0 {
            bail!("请求超时必须大于0");
        }
        Ok(())
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> Result<()> {
        if self.metrics_enabled
            && self
                .metrics_bind_address
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            bail!("指标监听地址无效: {}", self.metrics_bind_address);
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            bail!("日志级别无效: {}", self.log_level);
        }
        Ok(())
    }
}

impl ConfigValidator for McpConfig {
    fn validate(&self) -> Result<()> {
        if self.enabled {
            if self.server_url.trim().is_empty() {
                bail!("启用MCP时必须配置server_url");
            }
            if self.timeout_seconds == 0 {
                bail!("MCP请求超时必须大于0");
            }
        }
        Ok(())
    }
}

impl ConfigValidator for WorkerAgentConfig {
    fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.name.trim().is_empty() {
            bail!("Worker名称不能为空");
        }
        if self.api_url.trim().is_empty() {
            bail!("Worker的API地址不能为空");
        }
        if self.available_cpu < 0.0 {
            bail!("Worker的CPU容量不能为负数");
        }
        if self.available_memory < 0 {
            bail!("Worker的内存容量不能为负数");
        }
        if !(0.0..=8.0).contains(&self.available_gpu) {
            bail!("Worker的GPU容量超出合理范围: {}", self.available_gpu);
        }
        if self.poll_interval_seconds == 0 || self.heartbeat_interval_seconds == 0 {
            bail!("Worker轮询与心跳间隔必须大于0");
        }
        Ok(())
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> Result<()> {
        self.database.validate()?;
        self.scheduler.validate()?;
        self.api.validate()?;
        self.observability.validate()?;
        self.mcp.validate()?;
        self.worker.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_rejects_zero_poll() {
        let mut config = AppConfig::default();
        config.scheduler.poll_interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_config_rejects_bad_address() {
        let mut config = AppConfig::default();
        config.api.bind_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mcp_requires_url_when_enabled() {
        let mut config = AppConfig::default();
        config.mcp.enabled = true;
        config.mcp.server_url = String::new();
        assert!(config.validate().is_err());

        config.mcp.server_url = "http://localhost:5000".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_disabled_worker_skips_validation() {
        let mut config = AppConfig::default();
        config.worker.enabled = false;
        config.worker.name = String::new();
        assert!(config.validate().is_ok());

        config.worker.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validated() {
        let mut config = AppConfig::default();
        config.observability.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }
}
