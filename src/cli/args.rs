//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Vitals Watch - 逐服务的 HTTP(S) 探测工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "vitals-watch",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "VITALS_WATCH_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，不指定时使用配置文件中的级别
    #[arg(
        short,
        long,
        value_enum,
        help = "日志级别",
        env = "VITALS_WATCH_LOG_LEVEL",
        global = true
    )]
    pub log_level: Option<LogLevel>,

    /// 以JSON格式输出日志
    #[arg(long, help = "以JSON格式输出日志", global = true)]
    pub json_logs: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    /// 跟踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(level)
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 持续监视所有启用的服务，Ctrl+C 停止
    Run {
        /// 每个结果以一行JSON输出到标准输出
        #[arg(long, help = "每个结果以一行JSON输出到标准输出")]
        json: bool,
    },

    /// 对每个服务执行一次探测
    Check {
        /// 服务标识（可选，不指定则探测所有服务）
        #[arg(value_name = "ID", help = "服务标识")]
        id: Option<String>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 验证配置文件
    Validate {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径")]
        config_path: Option<PathBuf>,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }
}
