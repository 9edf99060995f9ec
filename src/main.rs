//! Vitals Watch 主程序入口
//!
//! 逐服务的 HTTP(S) 探测工具

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use tracing::{debug, error};
use vitals_watch::cli::args::{Args, Commands};
use vitals_watch::cli::commands::{
    CheckCommand, Command, RunCommand, ValidateCommand, VersionCommand,
};
use vitals_watch::config::{ConfigLoader, TomlConfigLoader};
use vitals_watch::logging::{LogConfig, LoggingSystem};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统，命令行级别优先于配置文件
    let level = match args.log_level {
        Some(level) => level.into(),
        None => configured_level(&args).await,
    };
    let log_config = LogConfig {
        level,
        console: true,
        json_format: args.json_logs,
        ..Default::default()
    };

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    debug!("Vitals Watch v{} 启动", vitals_watch::VERSION);

    // 执行命令
    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 读取配置文件中的日志级别，配置不可用时使用 info
async fn configured_level(args: &Args) -> LevelFilter {
    if matches!(args.command, Commands::Version { .. }) {
        return LevelFilter::Info;
    }

    match TomlConfigLoader::new(true)
        .load_from_file(&args.get_config_path())
        .await
    {
        Ok(config) => LogConfig::from_level_str(&config.global.log_level).level,
        Err(_) => LevelFilter::Info,
    }
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Run { .. } => Box::new(RunCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    };

    command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
}
