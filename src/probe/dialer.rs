//! 连接建立
//!
//! 自行完成域名解析、TCP连接和TLS握手。每一步的失败都直接以 [`DialFault`]
//! 返回，不经过任何回调或共享状态。

use crate::probe::fault::DialFault;
use crate::probe::settings::ProbeSettings;
use crate::probe::tls::{
    classify_tls_error, client_config, expiring_certificates, load_trust_store, ExpiringCertificate,
};
use chrono::Utc;
use hickory_resolver::TokioResolver;
use reqwest::Url;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::ClientConfig;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

/// 可读写的字节流
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// 协议
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// 请求目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// 协议
    pub scheme: Scheme,
    /// 主机名（IPv6地址不带方括号）
    pub host: String,
    /// 端口
    pub port: u16,
    /// Host 请求头
    pub authority: String,
    /// 路径和查询串
    pub path: String,
    ip: Option<IpAddr>,
}

impl Target {
    /// 解析端点URL
    ///
    /// # 返回
    /// * `Err(String)` - 无法解析、协议不是 http(s) 或缺少主机
    pub fn parse(endpoint: &str) -> Result<Self, String> {
        let url = Url::parse(endpoint).map_err(|e| format!("parse \"{endpoint}\": {e}"))?;
        Self::from_url(&url)
    }

    /// 从已解析的URL创建
    pub fn from_url(url: &Url) -> Result<Self, String> {
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(format!("unsupported protocol scheme \"{other}\"")),
        };

        let host_str = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(format!("no host in endpoint \"{url}\"")),
        };
        let host = host_str.trim_start_matches('[').trim_end_matches(']').to_string();
        let ip = host.parse::<IpAddr>().ok();

        let authority = match url.port() {
            Some(port) => format!("{host_str}:{port}"),
            None => host_str.to_string(),
        };

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            scheme,
            port: url.port().unwrap_or_else(|| scheme.default_port()),
            host,
            authority,
            path,
            ip,
        })
    }

    /// 主机是否为域名（需要解析）
    pub fn needs_lookup(&self) -> bool {
        self.ip.is_none()
    }

    /// IP字面量主机
    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }
}

/// 建立好的连接
pub struct Connection {
    stream: Box<dyn Io>,
    /// 对端地址
    pub peer: SocketAddr,
    /// 对端证书链（明文连接为空）
    pub peer_certificates: Vec<CertificateDer<'static>>,
    /// 告警窗口内即将过期的证书
    pub expiring: Vec<ExpiringCertificate>,
}

impl Connection {
    /// 取出底层字节流
    pub fn into_stream(self) -> Box<dyn Io> {
        self.stream
    }

    /// 是否为TLS连接
    pub fn is_tls(&self) -> bool {
        !self.peer_certificates.is_empty()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("peer_certificates", &self.peer_certificates.len())
            .field("expiring", &self.expiring)
            .finish()
    }
}

/// 拨号器
///
/// 只持有不可变的解析器和TLS配置，可以在多个监视器之间共享。
pub struct Dialer {
    resolver: Result<TokioResolver, String>,
    tls: Arc<ClientConfig>,
    roots_error: Option<String>,
    dial_timeout: Duration,
    expiry_warning: Duration,
}

impl Dialer {
    /// 根据探测参数创建拨号器
    pub fn new(settings: &ProbeSettings) -> Result<Self, rustls::Error> {
        let resolver = TokioResolver::builder_tokio()
            .map(|builder| builder.build())
            .map_err(|e| {
                warn!("无法加载DNS解析器配置: {}", e);
                e.to_string()
            });

        let store = load_trust_store(settings.system_roots, &settings.extra_roots);
        let tls = client_config(store.roots)?;

        Ok(Self {
            resolver,
            tls,
            roots_error: store.load_error,
            dial_timeout: settings.dial_timeout,
            expiry_warning: settings.expiry_warning,
        })
    }

    /// 拨号使用的TLS配置
    pub fn tls_config(&self) -> &Arc<ClientConfig> {
        &self.tls
    }

    /// 解析域名
    pub async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, DialFault> {
        let resolver = self
            .resolver
            .as_ref()
            .map_err(|message| DialFault::DnsConfig {
                message: message.clone(),
            })?;

        let lookup = match timeout(self.dial_timeout, resolver.lookup_ip(host)).await {
            Ok(Ok(lookup)) => lookup,
            Ok(Err(e)) => {
                return Err(DialFault::Dns {
                    host: host.to_string(),
                    message: e.to_string(),
                    timeout: false,
                })
            }
            Err(_) => {
                return Err(DialFault::Dns {
                    host: host.to_string(),
                    message: "i/o timeout".to_string(),
                    timeout: true,
                })
            }
        };

        let addrs: Vec<IpAddr> = lookup.iter().collect();
        if addrs.is_empty() {
            return Err(DialFault::Dns {
                host: host.to_string(),
                message: "no such host".to_string(),
                timeout: false,
            });
        }
        debug!("解析 {} -> {:?}", host, addrs);
        Ok(addrs)
    }

    /// 解析并连接目标
    pub async fn dial(&self, target: &Target) -> Result<Connection, DialFault> {
        let addrs = match target.ip() {
            Some(ip) => vec![ip],
            None => self.resolve(&target.host).await?,
        };
        self.connect(target, &addrs).await
    }

    /// 连接到已解析的地址
    pub async fn connect(&self, target: &Target, addrs: &[IpAddr]) -> Result<Connection, DialFault> {
        let tcp = self.connect_tcp(&target.host, addrs, target.port).await?;
        let peer = tcp.peer_addr().map_err(|e| DialFault::from_io(&e))?;

        match target.scheme {
            Scheme::Http => Ok(Connection {
                stream: Box::new(tcp),
                peer,
                peer_certificates: Vec::new(),
                expiring: Vec::new(),
            }),
            Scheme::Https => self.handshake(&target.host, tcp, peer).await,
        }
    }

    /// 依次尝试每个地址，返回第一个成功的连接
    async fn connect_tcp(
        &self,
        host: &str,
        addrs: &[IpAddr],
        port: u16,
    ) -> Result<TcpStream, DialFault> {
        let mut last_fault = None;

        for ip in addrs {
            let address = SocketAddr::new(*ip, port);
            match timeout(self.dial_timeout, TcpStream::connect(address)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => {
                    debug!("连接 {} 失败: {}", address, e);
                    last_fault = Some(DialFault::Connect {
                        address: address.to_string(),
                        message: e.to_string(),
                        timeout: e.kind() == std::io::ErrorKind::TimedOut,
                    });
                }
                Err(_) => {
                    debug!("连接 {} 超时", address);
                    last_fault = Some(DialFault::Connect {
                        address: address.to_string(),
                        message: "i/o timeout".to_string(),
                        timeout: true,
                    });
                }
            }
        }

        Err(last_fault.unwrap_or_else(|| DialFault::Dns {
            host: host.to_string(),
            message: "no such host".to_string(),
            timeout: false,
        }))
    }

    /// TLS握手并检查对端证书有效期
    async fn handshake(
        &self,
        host: &str,
        tcp: TcpStream,
        peer: SocketAddr,
    ) -> Result<Connection, DialFault> {
        let server_name =
            ServerName::try_from(host.to_string()).map_err(|e| DialFault::Generic {
                message: format!("invalid server name \"{host}\": {e}"),
                timeout: false,
            })?;

        let connector = TlsConnector::from(self.tls.clone());
        let stream = match timeout(self.dial_timeout, connector.connect(server_name, tcp)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(self.classify_handshake_error(host, &e)),
            Err(_) => {
                return Err(DialFault::Generic {
                    message: "tls handshake timeout".to_string(),
                    timeout: true,
                })
            }
        };

        let peer_certificates: Vec<CertificateDer<'static>> = stream
            .get_ref()
            .1
            .peer_certificates()
            .map(|chain| chain.iter().map(|cert| cert.clone().into_owned()).collect())
            .unwrap_or_default();

        let expiring = expiring_certificates(&peer_certificates, self.expiry_warning, Utc::now());
        for cert in &expiring {
            warn!(
                "证书即将过期: CN={} 过期时间={}",
                cert.common_name,
                cert.not_after.to_rfc3339()
            );
        }

        Ok(Connection {
            stream: Box::new(stream),
            peer,
            peer_certificates,
            expiring,
        })
    }

    fn classify_handshake_error(&self, host: &str, error: &std::io::Error) -> DialFault {
        match error
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        {
            Some(tls_error) => classify_tls_error(host, tls_error, self.roots_error.as_deref()),
            None => DialFault::from_io(error),
        }
    }
}
