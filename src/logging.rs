//! 日志系统模块
//!
//! 提供结构化日志配置和管理功能

use crate::probe::ProbeResult;
use log::LevelFilter;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter, Layer};

/// 全局日志初始化状态
#[derive(Debug, Default)]
struct GlobalLoggingState {
    /// 是否已初始化
    initialized: bool,
    /// 初始化失败原因
    init_error: Option<String>,
    /// 当前配置
    current_config: Option<LogConfig>,
}

/// 全局日志状态管理器
static GLOBAL_LOGGING_STATE: OnceLock<Mutex<GlobalLoggingState>> = OnceLock::new();

fn global_state() -> MutexGuard<'static, GlobalLoggingState> {
    GLOBAL_LOGGING_STATE
        .get_or_init(|| Mutex::new(GlobalLoggingState::default()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 日志配置结构
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 日志文件路径（可选）
    pub file_path: Option<PathBuf>,
    /// 是否输出到控制台
    pub console: bool,
    /// 是否使用JSON格式
    pub json_format: bool,
    /// 模块级别日志控制
    pub module_levels: HashMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        let mut module_levels = HashMap::new();
        // 依赖库的连接细节默认不输出
        module_levels.insert("hyper".to_string(), LevelFilter::Warn);
        module_levels.insert("hickory_proto".to_string(), LevelFilter::Warn);
        module_levels.insert("rustls".to_string(), LevelFilter::Warn);

        Self {
            level: LevelFilter::Info,
            file_path: None,
            console: true,
            json_format: false,
            module_levels,
        }
    }
}

impl LogConfig {
    /// 根据级别字符串创建配置，无法识别时使用 info
    pub fn from_level_str(level: &str) -> Self {
        Self {
            level: level.parse().unwrap_or(LevelFilter::Info),
            ..Self::default()
        }
    }

    /// 设置JSON格式
    pub fn with_json_format(mut self, json_format: bool) -> Self {
        self.json_format = json_format;
        self
    }
}

/// 日志系统管理器
pub struct LoggingSystem {
    /// 配置
    config: LogConfig,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 进程内只会真正初始化一次，之后的调用直接返回新的实例。
    ///
    /// # 参数
    /// * `config` - 日志配置
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<Self> {
        Self::setup_logging_with_options(config, false)
    }

    /// 初始化日志系统（带选项）
    ///
    /// # 参数
    /// * `config` - 日志配置
    /// * `force_reinit` - 是否强制重新初始化（主要用于测试）
    pub fn setup_logging_with_options(
        config: LogConfig,
        force_reinit: bool,
    ) -> anyhow::Result<Self> {
        {
            let state = global_state();
            if state.initialized && !force_reinit {
                if let Some(e) = &state.init_error {
                    return Err(anyhow::anyhow!("日志系统之前初始化失败: {}", e));
                }
                return Ok(Self { config });
            }
        }

        let init_result = Self::perform_initialization(&config);

        {
            let mut state = global_state();
            state.initialized = true;
            state.current_config = Some(config.clone());
            state.init_error = init_result.as_ref().err().map(|e| e.to_string());
        }

        init_result?;
        Ok(Self { config })
    }

    /// 执行实际的日志系统初始化
    fn perform_initialization(config: &LogConfig) -> anyhow::Result<()> {
        // log crate 到 tracing 的桥接，配置加载器使用 log 宏
        Self::init_log_tracer()?;
        Self::init_tracing_subscriber(config)
    }

    /// 初始化 LogTracer
    fn init_log_tracer() -> anyhow::Result<()> {
        use tracing_log::LogTracer;

        static LOG_TRACER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

        LOG_TRACER_INIT
            .get_or_init(|| LogTracer::init().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| anyhow::anyhow!("LogTracer初始化失败: {}", e))?;
        Ok(())
    }

    /// 初始化 tracing subscriber
    fn init_tracing_subscriber(config: &LogConfig) -> anyhow::Result<()> {
        let mut env_filter =
            EnvFilter::from_default_env().add_directive(Self::level_directive(config.level));

        for (module, level) in &config.module_levels {
            match format!("{}={}", module, level.as_str().to_lowercase()).parse::<Directive>() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(e) => eprintln!("忽略无效的模块日志级别 {module}: {e}"),
            }
        }

        let fmt_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_target(true)
                .boxed()
        };

        let result = match (&config.file_path, config.console) {
            (Some(file_path), false) => {
                let file = std::fs::File::create(file_path)
                    .map_err(|e| anyhow::anyhow!("创建日志文件失败: {}", e))?;
                let file_layer = fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_timer(fmt::time::ChronoUtc::rfc_3339());
                registry().with(env_filter).with(file_layer).try_init()
            }
            _ => registry().with(env_filter).with(fmt_layer).try_init(),
        };

        match result {
            Ok(()) => {
                tracing::debug!("日志系统初始化完成: {:?}", config);
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                // 测试中全局订阅器可能已被设置
                if error_msg.contains("already been set")
                    || error_msg.contains("already initialized")
                {
                    tracing::debug!("日志系统已经初始化过了");
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("tracing subscriber初始化失败: {}", error_msg))
                }
            }
        }
    }

    fn level_directive(level: LevelFilter) -> Directive {
        match level.to_level() {
            Some(log::Level::Error) => Directive::from(tracing::Level::ERROR),
            Some(log::Level::Warn) => Directive::from(tracing::Level::WARN),
            Some(log::Level::Info) => Directive::from(tracing::Level::INFO),
            Some(log::Level::Debug) => Directive::from(tracing::Level::DEBUG),
            Some(log::Level::Trace) => Directive::from(tracing::Level::TRACE),
            None => Directive::from(tracing_subscriber::filter::LevelFilter::OFF),
        }
    }

    /// 检查日志系统是否已初始化
    pub fn is_initialized() -> bool {
        GLOBAL_LOGGING_STATE
            .get()
            .map(|_| global_state().initialized)
            .unwrap_or(false)
    }

    /// 获取当前日志配置（如果已初始化）
    pub fn current_config() -> Option<LogConfig> {
        GLOBAL_LOGGING_STATE.get()?;
        global_state().current_config.clone()
    }

    /// 重置日志系统状态（主要用于测试）
    #[cfg(test)]
    pub fn reset_for_testing() {
        if GLOBAL_LOGGING_STATE.get().is_some() {
            *global_state() = GlobalLoggingState::default();
        }
    }

    /// 当前实例使用的配置
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// 为一个探测结果输出一条日志
    pub fn probe_log(&self, result: &ProbeResult) {
        let tags: Vec<&str> = result
            .errors()
            .iter()
            .map(|e| e.error_type.as_str())
            .collect();

        if self.config.json_format {
            let entry = json!({
                "type": "probe",
                "service": result.id(),
                "success": result.is_success(),
                "timeout": result.timeout(),
                "runtime_ms": result.runtime_ms(),
                "errors": tags,
            });
            if result.is_success() {
                tracing::info!("{entry}");
            } else {
                tracing::warn!("{entry}");
            }
        } else if result.is_success() {
            tracing::info!("PROBE: {} - OK ({}ms)", result.id(), result.runtime_ms());
        } else {
            tracing::warn!(
                "PROBE: {} - FAILED ({}ms) [{}]{}",
                result.id(),
                result.runtime_ms(),
                tags.join(", "),
                if result.timeout() { " timeout" } else { "" }
            );
        }
    }
}
