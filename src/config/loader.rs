//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和错误处理功能

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::{Captures, Regex};
use std::path::Path;

/// 配置加载器trait，定义配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 从字符串加载配置
    ///
    /// # 参数
    /// * `content` - 配置文件内容
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_string(&self, content: &str) -> Result<Config>;

    /// 验证配置
    ///
    /// # 参数
    /// * `config` - 要验证的配置
    ///
    /// # 返回
    /// * `Result<()>` - 验证结果
    fn validate(&self, config: &Config) -> Result<()>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用环境变量替换
    ///
    /// # 返回
    /// * `Self` - 配置加载器实例
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中的 `${VAR}` 环境变量
    ///
    /// 任意一个变量未设置都会导致整体失败，错误中给出第一个缺失的变量名。
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {}", e)))?;

        let mut missing: Option<String> = None;
        let substituted = env_var_regex.replace_all(content, |captures: &Captures| {
            std::env::var(&captures[1]).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| captures[1].to_string());
                String::new()
            })
        });

        match missing {
            Some(var) => Err(ConfigError::EnvVarError { var }.into()),
            None => Ok(substituted.into_owned()),
        }
    }

    /// 解析TOML内容
    ///
    /// # 参数
    /// * `content` - TOML内容
    ///
    /// # 返回
    /// * `Result<Config>` - 解析的配置或错误
    fn parse_toml(&self, content: &str) -> Result<Config> {
        // 替换环境变量
        let processed_content = self.substitute_env_vars(content)?;

        // 解析TOML
        let config: Config = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {}", e)))?;

        Ok(config)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();

        // 检查文件是否存在
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        // 读取文件内容
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {}", e)))?;

        // 解析配置
        let config = self.parse_toml(&content)?;

        // 验证配置
        self.validate(&config)?;

        log::info!(
            "成功加载配置文件: {} ({} 个服务)",
            path.display(),
            config.services.len()
        );
        log::debug!("配置内容: {:?}", config);

        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        // 解析配置
        let config = self.parse_toml(content)?;

        // 验证配置
        self.validate(&config)?;

        log::debug!("成功解析配置字符串");

        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 获取默认配置文件路径
///
/// 优先使用当前目录下的 config.toml，否则使用用户配置目录下的 vitals-watch/config.toml。
pub fn get_default_config_path() -> std::path::PathBuf {
    if std::path::Path::new("config.toml").exists() {
        return std::path::PathBuf::from("config.toml");
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join(crate::APP_NAME).join("config.toml"))
        .unwrap_or_else(|| std::path::PathBuf::from("config.toml"))
}
