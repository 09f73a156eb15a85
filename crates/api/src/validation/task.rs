use validator::ValidationError;

/// 验证任务名称
pub fn validate_task_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("任务名称不能为空"));
    }

    if name.len() > 255 {
        return Err(ValidationError::new("任务名称长度不能超过255个字符"));
    }

    if name.starts_with(' ') || name.ends_with(' ') {
        return Err(ValidationError::new("任务名称不能以空格开头或结尾"));
    }

    Ok(())
}

/// 验证模型标签：空标签合法（任意Worker可执行）
pub fn validate_model_name(model_name: &str) -> Result<(), ValidationError> {
    if model_name.len() > 100 {
        return Err(ValidationError::new("模型标签长度不能超过100个字符"));
    }

    if !model_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '-' || c == ':')
    {
        return Err(ValidationError::new(
            "模型标签只能包含字母、数字、下划线、点、冒号和连字符",
        ));
    }

    Ok(())
}

/// 验证超时与重试参数
pub fn validate_task_limits(
    timeout_seconds: Option<i64>,
    max_retries: Option<i32>,
) -> Result<(), ValidationError> {
    if let Some(timeout) = timeout_seconds {
        if timeout <= 0 {
            return Err(ValidationError::new("任务超时必须大于0"));
        }
        if timeout > 24 * 3600 {
            return Err(ValidationError::new("任务超时不能超过24小时"));
        }
    }

    if let Some(retries) = max_retries {
        if retries < 0 {
            return Err(ValidationError::new("最大重试次数不能为负数"));
        }
        if retries > 10 {
            return Err(ValidationError::new("最大重试次数不能超过10"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_name_rules() {
        assert!(validate_task_name("推理任务-1").is_ok());
        assert!(validate_task_name("").is_err());
        assert!(validate_task_name("   ").is_err());
        assert!(validate_task_name(" leading").is_err());
        assert!(validate_task_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_model_name_rules() {
        assert!(validate_model_name("").is_ok());
        assert!(validate_model_name("llama-7b").is_ok());
        assert!(validate_model_name("org:qwen_14b.q4").is_ok());
        assert!(validate_model_name("bad model").is_err());
        assert!(validate_model_name(&"m".repeat(101)).is_err());
    }

    #[test]
    fn test_task_limits() {
        assert!(validate_task_limits(None, None).is_ok());
        assert!(validate_task_limits(Some(60), Some(3)).is_ok());
        assert!(validate_task_limits(Some(0), None).is_err());
        assert!(validate_task_limits(Some(25 * 3600), None).is_err());
        assert!(validate_task_limits(None, Some(-1)).is_err());
        assert!(validate_task_limits(None, Some(11)).is_err());
    }
}
