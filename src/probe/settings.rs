//! 探测参数

use crate::config::GlobalConfig;
use crate::error::{ConfigError, Result};
use crate::probe::tls::load_pem_certificates;
use rustls::pki_types::CertificateDer;
use std::time::Duration;

const SECONDS_PER_DAY: u64 = 24 * 3600;

/// 单次探测使用的参数
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// TCP连接与TLS握手各自的超时时间
    pub dial_timeout: Duration,
    /// HTTP请求超时时间
    pub request_timeout: Duration,
    /// 证书过期告警窗口
    pub expiry_warning: Duration,
    /// 是否信任系统根证书
    pub system_roots: bool,
    /// 额外信任的根证书
    pub extra_roots: Vec<CertificateDer<'static>>,
    /// User-Agent
    pub user_agent: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            expiry_warning: Duration::from_secs(7 * SECONDS_PER_DAY),
            system_roots: true,
            extra_roots: Vec::new(),
            user_agent: format!("{}/{}", crate::APP_NAME, crate::VERSION),
        }
    }
}

impl ProbeSettings {
    /// 根据全局配置创建探测参数，并加载额外根证书
    pub fn from_global(global: &GlobalConfig) -> Result<Self> {
        let mut extra_roots = Vec::new();
        for path in &global.extra_root_certificates {
            extra_roots.extend(load_pem_certificates(path)?);
        }

        let expiry_warning_secs = global
            .certificate_expiry_warning_days
            .checked_mul(SECONDS_PER_DAY)
            .ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "证书过期告警天数过大: {}",
                    global.certificate_expiry_warning_days
                ))
            })?;

        Ok(Self {
            dial_timeout: Duration::from_secs(global.dial_timeout_seconds),
            request_timeout: Duration::from_secs(global.request_timeout_seconds),
            expiry_warning: Duration::from_secs(expiry_warning_secs),
            system_roots: global.use_system_roots,
            extra_roots,
            user_agent: global
                .user_agent
                .clone()
                .unwrap_or_else(|| Self::default().user_agent),
        })
    }

    /// 设置超时时间
    pub fn with_timeouts(mut self, dial_timeout: Duration, request_timeout: Duration) -> Self {
        self.dial_timeout = dial_timeout;
        self.request_timeout = request_timeout;
        self
    }

    /// 设置证书过期告警窗口
    pub fn with_expiry_warning(mut self, window: Duration) -> Self {
        self.expiry_warning = window;
        self
    }

    /// 是否加载系统根证书
    pub fn with_system_roots(mut self, enabled: bool) -> Self {
        self.system_roots = enabled;
        self
    }

    /// 追加一个信任的根证书
    pub fn with_root_certificate(mut self, cert: CertificateDer<'static>) -> Self {
        self.extra_roots.push(cert);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;

    #[test]
    fn test_default_settings() {
        let settings = ProbeSettings::default();
        assert_eq!(settings.dial_timeout, Duration::from_secs(10));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.expiry_warning, Duration::from_secs(604_800));
        assert!(settings.system_roots);
        assert!(settings.user_agent.starts_with("vitals-watch/"));
    }

    #[test]
    fn test_from_global_config() {
        let global = GlobalConfig {
            dial_timeout_seconds: 3,
            request_timeout_seconds: 5,
            certificate_expiry_warning_days: 14,
            use_system_roots: false,
            user_agent: Some("probe-bot/1.0".to_string()),
            ..Default::default()
        };

        let settings = ProbeSettings::from_global(&global).unwrap();
        assert_eq!(settings.dial_timeout, Duration::from_secs(3));
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
        assert_eq!(settings.expiry_warning, Duration::from_secs(14 * 86_400));
        assert!(!settings.system_roots);
        assert_eq!(settings.user_agent, "probe-bot/1.0");
        assert!(settings.extra_roots.is_empty());
    }

    #[test]
    fn test_oversized_expiry_warning_is_rejected() {
        let global = GlobalConfig {
            certificate_expiry_warning_days: u64::MAX / 1000,
            ..Default::default()
        };

        let err = ProbeSettings::from_global(&global).unwrap_err();
        assert!(matches!(
            err,
            crate::error::VitalsError::Config(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_root_certificate_file() {
        let global = GlobalConfig {
            extra_root_certificates: vec!["/nonexistent/ca.pem".into()],
            ..Default::default()
        };
        assert!(ProbeSettings::from_global(&global).is_err());
    }
}
