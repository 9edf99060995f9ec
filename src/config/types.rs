//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// 主配置结构，包含全局配置和服务列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 服务配置列表
    pub services: Vec<ServiceConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// TCP连接与TLS握手超时时间（秒）
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_seconds: u64,
    /// 请求超时时间（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// 证书过期告警提前天数
    #[serde(default = "default_expiry_warning_days")]
    pub certificate_expiry_warning_days: u64,
    /// 结果通道容量
    #[serde(default = "default_result_buffer")]
    pub result_buffer: usize,
    /// 是否信任系统根证书
    #[serde(default = "default_true")]
    pub use_system_roots: bool,
    /// 额外信任的根证书（PEM文件）
    #[serde(default)]
    pub extra_root_certificates: Vec<PathBuf>,
    /// 自定义 User-Agent
    pub user_agent: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dial_timeout_seconds: default_dial_timeout(),
            request_timeout_seconds: default_request_timeout(),
            certificate_expiry_warning_days: default_expiry_warning_days(),
            result_buffer: default_result_buffer(),
            use_system_roots: true,
            extra_root_certificates: Vec::new(),
            user_agent: None,
        }
    }
}

/// 服务配置结构
///
/// 端点在加载时不做校验，无效端点会在探测时以 `endpointInvalid` 报告。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// 服务标识
    pub id: String,
    /// 服务端点URL
    pub endpoint: String,
    /// 探测间隔，可以是小数秒
    #[serde(rename = "interval_seconds", with = "duration_secs", default = "default_interval")]
    pub interval: Duration,
    /// 是否启用
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 服务描述
    pub description: Option<String>,
    /// 会话调用列表
    #[serde(default)]
    pub session: Vec<SessionCall>,
}

impl ServiceConfig {
    /// 创建新的服务配置，使用默认探测间隔
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            interval: default_interval(),
            enabled: true,
            description: None,
            session: Vec::new(),
        }
    }

    /// 设置探测间隔
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// 设置会话调用
    pub fn with_session(mut self, session: Vec<SessionCall>) -> Self {
        self.session = session;
        self
    }

    /// 探测间隔
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// 会话中的一次调用，具体含义由会话执行器解释
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionCall {
    /// 请求URI
    pub uri: String,
    /// HTTP方法
    #[serde(default = "default_method")]
    pub method: String,
    /// 请求数据
    pub data: Option<String>,
    /// 对响应的检查
    #[serde(default)]
    pub check: Vec<serde_json::Value>,
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}
fn default_dial_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    30
}
fn default_expiry_warning_days() -> u64 {
    7
}
fn default_result_buffer() -> usize {
    16
}
fn default_interval() -> Duration {
    Duration::from_secs(60)
}
fn default_method() -> String {
    "GET".to_string()
}
fn default_true() -> bool {
    true
}

/// 以秒（允许小数）序列化 Duration
mod duration_secs {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_f64(duration.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("无效的时间间隔 {secs}: {e}")))
    }
}

/// 证书过期告警窗口上限（天）
pub const MAX_EXPIRY_WARNING_DAYS: u64 = 3650;

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证全局配置
    if config.global.dial_timeout_seconds == 0 {
        return Err("连接超时时间不能为0".to_string());
    }

    if config.global.request_timeout_seconds == 0 {
        return Err("请求超时时间不能为0".to_string());
    }

    if config.global.certificate_expiry_warning_days > MAX_EXPIRY_WARNING_DAYS {
        return Err(format!(
            "证书过期告警天数不能超过{}天: {}",
            MAX_EXPIRY_WARNING_DAYS, config.global.certificate_expiry_warning_days
        ));
    }

    if config.global.result_buffer == 0 {
        return Err("结果通道容量不能为0".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    // 验证服务配置
    if config.services.is_empty() {
        return Err("至少需要配置一个服务".to_string());
    }

    let mut ids = HashSet::new();
    for service in &config.services {
        if service.id.trim().is_empty() {
            return Err("服务标识不能为空".to_string());
        }

        if !ids.insert(service.id.as_str()) {
            return Err(format!("服务标识重复: {}", service.id));
        }

        if service.interval.is_zero() {
            return Err(format!("服务 {} 的探测间隔不能为0", service.id));
        }
    }

    Ok(())
}
