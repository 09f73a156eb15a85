use validator::ValidationError;

/// 验证Worker注册请求
pub fn validate_worker_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("Worker名称不能为空"));
    }
    if name.len() > 255 {
        return Err(ValidationError::new("Worker名称长度不能超过255个字符"));
    }
    Ok(())
}

/// 验证声明的资源容量，内存单位是字节
pub fn validate_worker_resources(
    cpu: f64,
    memory_bytes: i64,
    gpu: f64,
) -> Result<(), ValidationError> {
    if !cpu.is_finite() || cpu < 0.0 {
        return Err(ValidationError::new("CPU容量必须是非负数"));
    }
    if memory_bytes < 0 {
        return Err(ValidationError::new("内存容量不能为负数"));
    }
    if !gpu.is_finite() || !(0.0..=8.0).contains(&gpu) {
        return Err(ValidationError::new("GPU容量必须在0到8之间"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_name() {
        assert!(validate_worker_name("gpu-node-1").is_ok());
        assert!(validate_worker_name("").is_err());
        assert!(validate_worker_name(&"w".repeat(256)).is_err());
    }

    #[test]
    fn test_worker_resources() {
        assert!(validate_worker_resources(2.0, 4 * 1024 * 1024 * 1024, 1.0).is_ok());
        assert!(validate_worker_resources(0.0, 0, 0.0).is_ok());
        assert!(validate_worker_resources(-1.0, 0, 0.0).is_err());
        assert!(validate_worker_resources(1.0, -1, 0.0).is_err());
        assert!(validate_worker_resources(1.0, 0, 9.0).is_err());
        assert!(validate_worker_resources(f64::NAN, 0, 0.0).is_err());
    }
}
