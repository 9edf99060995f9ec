//! TLS 信任配置与证书检查
//!
//! 负责构建拨号使用的 rustls 客户端配置、把握手失败分类为具体的证书故障，
//! 以及在握手成功后找出即将过期的对端证书。

use crate::error::{ConfigError, Result};
use crate::probe::fault::DialFault;
use crate::probe::result::{ErrorType, ProbeError};
use chrono::{DateTime, Utc};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use rustls::{CertificateError, ClientConfig, RootCertStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use x509_parser::prelude::{FromDer, X509Certificate};

/// 构建好的信任库
#[derive(Debug)]
pub struct TrustStore {
    /// 根证书
    pub roots: RootCertStore,
    /// 系统根证书加载失败的原因
    pub load_error: Option<String>,
}

/// 加载信任库
///
/// # 参数
/// * `system_roots` - 是否加载系统根证书
/// * `extra_roots` - 额外信任的根证书
pub fn load_trust_store(system_roots: bool, extra_roots: &[CertificateDer<'static>]) -> TrustStore {
    let mut roots = RootCertStore::empty();
    let mut load_error = None;

    if system_roots {
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            warn!("加载系统根证书时出错: {}", error);
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        debug!("系统根证书已加载: {} 个，忽略 {} 个", added, ignored);

        if added == 0 {
            let reason = native
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            load_error = Some(if reason.is_empty() {
                "no system root certificates found".to_string()
            } else {
                reason
            });
        }
    }

    let (added, ignored) = roots.add_parsable_certificates(extra_roots.iter().cloned());
    if ignored > 0 {
        warn!("忽略了 {} 个无法解析的额外根证书", ignored);
    }
    if added > 0 {
        debug!("额外根证书已加载: {} 个", added);
    }

    TrustStore { roots, load_error }
}

/// 从PEM文件读取证书
pub fn load_pem_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certificate_error = |reason: String| ConfigError::CertificateError {
        path: path.display().to_string(),
        reason,
    };

    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|e| certificate_error(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| certificate_error(e.to_string()))?;

    if certs.is_empty() {
        return Err(certificate_error("no certificates found".to_string()).into());
    }
    Ok(certs)
}

/// 构建客户端TLS配置
pub fn client_config(roots: RootCertStore) -> std::result::Result<Arc<ClientConfig>, rustls::Error> {
    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(Arc::new(config))
}

/// 把握手失败分类为拨号故障
///
/// # 参数
/// * `host` - 请求的主机名
/// * `error` - rustls 报告的错误
/// * `roots_error` - 信任库加载失败的原因（如果有）
pub fn classify_tls_error(host: &str, error: &rustls::Error, roots_error: Option<&str>) -> DialFault {
    match error {
        rustls::Error::InvalidCertificate(cert_error) => match cert_error {
            CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. } => {
                DialFault::TlsHostname {
                    host: host.to_string(),
                    message: error.to_string(),
                }
            }
            CertificateError::UnknownIssuer => match roots_error {
                // 信任库本身加载失败时，未知签发者只是表象
                Some(reason) => DialFault::TlsRoots {
                    message: reason.to_string(),
                },
                None => DialFault::TlsAuthority {
                    message: error.to_string(),
                },
            },
            _ => DialFault::TlsCertificate {
                message: error.to_string(),
            },
        },
        other => DialFault::Generic {
            message: format!("tls handshake with {host}: {other}"),
            timeout: false,
        },
    }
}

/// 即将过期的证书
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiringCertificate {
    /// 证书主题CN
    pub common_name: String,
    /// 过期时间
    pub not_after: DateTime<Utc>,
    /// 剩余有效时间
    pub remaining: chrono::Duration,
}

impl ExpiringCertificate {
    /// 转换为告警记录
    pub fn to_probe_error(&self) -> ProbeError {
        ProbeError::new(
            ErrorType::CertificateIsExpiring,
            format!(
                "cert CN=\"{}\" is expiring soon: {}, left: {}h",
                self.common_name,
                self.not_after.to_rfc3339(),
                self.remaining.num_hours()
            ),
        )
    }
}

/// 找出剩余有效期短于告警窗口的证书
///
/// 无法解析的证书会被跳过。
pub fn expiring_certificates(
    chain: &[CertificateDer<'_>],
    window: Duration,
    now: DateTime<Utc>,
) -> Vec<ExpiringCertificate> {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);

    chain
        .iter()
        .filter_map(|der| match X509Certificate::from_der(der.as_ref()) {
            Ok((_, cert)) => Some(cert),
            Err(e) => {
                debug!("无法解析对端证书: {}", e);
                None
            }
        })
        .filter_map(|cert| {
            let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)?;
            let remaining = not_after - now;
            if remaining >= window {
                return None;
            }
            let common_name = cert
                .subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .unwrap_or_default()
                .to_string();
            Some(ExpiringCertificate {
                common_name,
                not_after,
                remaining,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};
    use std::io::Write;

    fn cert_expiring_in(days: i64, cn: &str) -> CertificateDer<'static> {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, cn);
        params.not_before = time::OffsetDateTime::now_utc() - time::Duration::days(30);
        params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(days);
        params.self_signed(&key).unwrap().der().clone()
    }

    const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

    #[test]
    fn test_expiring_certificate_detected() {
        let chain = vec![cert_expiring_in(3, "shop.example"), cert_expiring_in(400, "ca")];
        let expiring = expiring_certificates(&chain, WEEK, Utc::now());

        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].common_name, "shop.example");
        assert!(expiring[0].remaining.num_hours() <= 72);

        let error = expiring[0].to_probe_error();
        assert_eq!(error.error_type, ErrorType::CertificateIsExpiring);
        assert!(error.error.contains("shop.example"));
    }

    #[test]
    fn test_healthy_chain_has_no_warnings() {
        let chain = vec![cert_expiring_in(90, "shop.example")];
        assert!(expiring_certificates(&chain, WEEK, Utc::now()).is_empty());
    }

    #[test]
    fn test_unparseable_certificate_is_skipped() {
        let chain = vec![CertificateDer::from(vec![0x30, 0x03, 0x01, 0x01, 0x00])];
        assert!(expiring_certificates(&chain, WEEK, Utc::now()).is_empty());
    }

    #[test]
    fn test_classify_hostname_error() {
        let error = rustls::Error::InvalidCertificate(CertificateError::NotValidForName);
        let fault = classify_tls_error("shop.example", &error, None);
        assert_eq!(fault.error_type(), ErrorType::TlsHostNameError);
    }

    #[test]
    fn test_classify_unknown_issuer() {
        let error = rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer);
        assert_eq!(
            classify_tls_error("shop.example", &error, None).error_type(),
            ErrorType::TlsUnknownAuthority
        );
        assert_eq!(
            classify_tls_error("shop.example", &error, Some("no roots")).error_type(),
            ErrorType::TlsSystemRootsError
        );
    }

    #[test]
    fn test_classify_expired_certificate() {
        let error = rustls::Error::InvalidCertificate(CertificateError::Expired);
        assert_eq!(
            classify_tls_error("shop.example", &error, None).error_type(),
            ErrorType::TlsCertificateInvalid
        );
    }

    #[test]
    fn test_classify_protocol_error_is_generic() {
        let error = rustls::Error::General("handshake alert".to_string());
        assert_eq!(
            classify_tls_error("shop.example", &error, None).error_type(),
            ErrorType::UnknownError
        );
    }

    #[test]
    fn test_trust_store_without_system_roots() {
        let store = load_trust_store(false, &[cert_expiring_in(90, "ca")]);
        assert!(store.load_error.is_none());
        assert_eq!(store.roots.len(), 1);
        assert!(client_config(store.roots).is_ok());
    }

    #[test]
    fn test_load_pem_certificates() {
        let key = KeyPair::generate().unwrap();
        let params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let pem = params.self_signed(&key).unwrap().pem();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(pem.as_bytes()).unwrap();

        let certs = load_pem_certificates(file.path()).unwrap();
        assert_eq!(certs.len(), 1);
    }

    #[test]
    fn test_load_pem_without_certificates_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a pem file").unwrap();

        let result = load_pem_certificates(file.path());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("证书文件加载失败"));
    }
}
