//! 错误处理模块
//!
//! 定义配置、命令行等外围功能的统一错误类型。
//! 单次探测中的故障不会以错误形式抛出，而是记录在探测结果中。

use thiserror::Error;

/// Vitals Watch 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum VitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// TLS配置错误
    #[error("TLS配置错误: {0}")]
    Tls(#[from] rustls::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },

    /// 证书文件无法加载
    #[error("证书文件加载失败: {path}: {reason}")]
    CertificateError { path: String, reason: String },
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, VitalsError>;
