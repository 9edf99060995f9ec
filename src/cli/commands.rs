//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, ConfigLoader, ServiceConfig, TomlConfigLoader};
use crate::error::{ConfigError, Result};
use crate::logging::LogConfig;
use crate::probe::{ProbeExecutor, ProbeResult, ProbeSettings};
use crate::watch::{Collector, Watcher};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载并验证配置文件
async fn load_config(path: &Path) -> Result<Config> {
    TomlConfigLoader::new(true).load_from_file(path).await
}

/// 根据全局配置创建共享的探测执行器
fn build_executor(config: &Config) -> Result<Arc<ProbeExecutor>> {
    let settings = ProbeSettings::from_global(&config.global)?;
    Ok(Arc::new(ProbeExecutor::new(settings)?))
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { config_path } = &args.command {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());
            self.validate_config_file(&config_file).await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件，同时检查额外根证书能否加载
    async fn validate_config_file(&self, config_path: &Path) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let config = load_config(config_path).await?;
        ProbeSettings::from_global(&config.global)?;

        let enabled = config.services.iter().filter(|s| s.enabled).count();
        println!("✓ 配置文件验证通过");
        println!(
            "✓ 找到 {} 个服务配置（{} 个已启用）",
            config.services.len(),
            enabled
        );
        for service in &config.services {
            println!("  - {}", describe_service(service));
        }

        Ok(())
    }
}

/// 服务配置的单行摘要
fn describe_service(service: &ServiceConfig) -> String {
    let mut line = format!(
        "{} {} 每 {:?}",
        service.id,
        service.endpoint,
        service.interval()
    );
    if let Some(description) = &service.description {
        line.push_str(&format!(" - {description}"));
    }
    if !service.enabled {
        line.push_str("（未启用）");
    }
    line
}

/// 单次探测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { id, format } = &args.command {
            self.perform_check(args, id.as_deref(), *format).await
        } else {
            Ok(())
        }
    }
}

impl CheckCommand {
    /// 对选中的服务并发执行一次探测
    async fn perform_check(
        &self,
        args: &Args,
        service_id: Option<&str>,
        format: OutputFormat,
    ) -> Result<()> {
        let config = load_config(&args.get_config_path()).await?;
        let executor = build_executor(&config)?;

        let services = select_services(config.services, service_id);
        if services.is_empty() {
            if let Some(id) = service_id {
                return Err(ConfigError::ValidationError(format!("未找到服务: {id}")).into());
            }
            eprintln!("未找到任何启用的服务");
            return Ok(());
        }

        let probes = services.iter().map(|service| executor.probe(service));
        let results = futures::future::join_all(probes).await;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
            OutputFormat::Text => print_text_results(&results),
        }

        Ok(())
    }
}

/// 按标识选择服务；不指定标识时选择所有启用的服务
fn select_services(services: Vec<ServiceConfig>, service_id: Option<&str>) -> Vec<ServiceConfig> {
    services
        .into_iter()
        .filter(|service| match service_id {
            Some(id) => service.id == id,
            None => service.enabled,
        })
        .collect()
}

/// 打印文本格式结果
fn print_text_results(results: &[ProbeResult]) {
    for result in results {
        let status_icon = if result.is_success() { "✓" } else { "✗" };
        println!(
            "{} {} - {}ms{}",
            status_icon,
            result.id(),
            result.runtime_ms(),
            if result.timeout() { " (超时)" } else { "" }
        );

        for error in result.errors() {
            match &error.comment {
                Some(comment) => println!("  [{}] {} ({})", error.error_type, error.error, comment),
                None => println!("  [{}] {}", error.error_type, error.error),
            }
        }
    }
}

/// 持续监视命令
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Run { json } = &args.command {
            self.run_watchers(args, *json).await
        } else {
            Ok(())
        }
    }
}

impl RunCommand {
    /// 为每个启用的服务启动监视器，Ctrl+C 后全部停止并等待退出
    async fn run_watchers(&self, args: &Args, json_output: bool) -> Result<()> {
        let config = load_config(&args.get_config_path()).await?;
        let executor = build_executor(&config)?;

        let services = select_services(config.services, None);
        if services.is_empty() {
            eprintln!("未找到任何启用的服务");
            return Ok(());
        }

        let log_config = crate::logging::LoggingSystem::current_config()
            .unwrap_or_else(|| LogConfig::from_level_str(&config.global.log_level));
        let mut collector = Collector::new().with_logging(log_config)?;
        if json_output {
            collector = collector.with_callback(Arc::new(|result: &ProbeResult| {
                match serde_json::to_string(result) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!("结果序列化失败 {}: {}", result.id(), e),
                }
            }));
        }

        let (sink, receiver) = mpsc::channel(config.global.result_buffer);
        let collector = Arc::new(collector);
        let collector_task = Arc::clone(&collector).spawn(receiver);

        let watchers: Vec<Watcher> = services
            .into_iter()
            .map(|service| Watcher::start_with(service, Arc::clone(&executor), sink.clone()))
            .collect();
        drop(sink);

        info!("已启动 {} 个服务监视器，按 Ctrl+C 停止", watchers.len());
        tokio::signal::ctrl_c().await?;
        info!("收到停止信号，正在停止所有监视器");

        for watcher in &watchers {
            watcher.stop();
        }
        futures::future::join_all(watchers.into_iter().map(Watcher::join)).await;

        if let Err(e) = collector_task.await {
            warn!("结果收集任务异常结束: {}", e);
        }

        let failing = collector.failing().await;
        if failing.is_empty() {
            info!("所有服务最近一次探测均正常");
        } else {
            let ids: Vec<&str> = failing.iter().map(|r| r.id()).collect();
            warn!("最近一次探测失败的服务: {}", ids.join(", "));
        }

        Ok(())
    }
}
