//! Vitals Watch - 逐服务的 HTTP(S) 探测引擎
//!
//! 为每个配置的服务周期性地发起一次 HTTP(S) 请求，并把每次探测归纳为
//! 一个结构化结果：
//! - DNS、TLS、连接层故障分类
//! - 证书即将过期告警
//! - 可插拔的会话检查
//! - 每个服务独立的监视循环与结果收集
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod probe;
pub mod watch;

// 重新导出主要类型
pub use config::{Config, GlobalConfig, ServiceConfig};
pub use error::{Result, VitalsError};
pub use probe::{ErrorType, ProbeError, ProbeExecutor, ProbeResult, ProbeSettings};
pub use watch::{Collector, Watcher, WatcherState};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
