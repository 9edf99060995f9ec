//! 连接故障分类
//!
//! 拨号过程（解析、TCP连接、TLS握手）直接返回带分类的 [`DialFault`]，
//! 由每次探测独立创建的 [`FaultRecorder`] 收集，并按固定优先级翻译为错误记录。

use crate::probe::result::{ErrorType, ProbeError};
use std::collections::BTreeMap;
use thiserror::Error;

/// 故障槽位
///
/// 声明顺序即翻译时的优先级，越靠前越优先。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FaultKind {
    TlsHostname,
    TlsRoots,
    TlsAuthority,
    TlsCertificate,
    Connect,
    DnsConfig,
    Dns,
    Generic,
}

/// 拨号阶段的分类故障
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialFault {
    /// 域名解析失败
    #[error("lookup {host}: {message}")]
    Dns {
        host: String,
        message: String,
        timeout: bool,
    },

    /// 解析器配置无法加载
    #[error("dns config: {message}")]
    DnsConfig { message: String },

    /// 证书与主机名不匹配
    #[error("x509: certificate is not valid for {host}: {message}")]
    TlsHostname { host: String, message: String },

    /// 证书由未知机构签发
    #[error("x509: certificate signed by unknown authority: {message}")]
    TlsAuthority { message: String },

    /// 证书本身无效
    #[error("x509: certificate is invalid: {message}")]
    TlsCertificate { message: String },

    /// 本地信任库无法加载
    #[error("x509: failed to load system roots: {message}")]
    TlsRoots { message: String },

    /// TCP连接失败（拒绝、重置、不可达等）
    #[error("dial tcp {address}: {message}")]
    Connect {
        address: String,
        message: String,
        timeout: bool,
    },

    /// 其他网络层错误
    #[error("{message}")]
    Generic { message: String, timeout: bool },
}

impl DialFault {
    /// 故障所属槽位
    pub fn kind(&self) -> FaultKind {
        match self {
            DialFault::Dns { .. } => FaultKind::Dns,
            DialFault::DnsConfig { .. } => FaultKind::DnsConfig,
            DialFault::TlsHostname { .. } => FaultKind::TlsHostname,
            DialFault::TlsAuthority { .. } => FaultKind::TlsAuthority,
            DialFault::TlsCertificate { .. } => FaultKind::TlsCertificate,
            DialFault::TlsRoots { .. } => FaultKind::TlsRoots,
            DialFault::Connect { .. } => FaultKind::Connect,
            DialFault::Generic { .. } => FaultKind::Generic,
        }
    }

    /// 对应的错误分类标签
    pub fn error_type(&self) -> ErrorType {
        match self {
            DialFault::Dns { .. } => ErrorType::Dns,
            DialFault::DnsConfig { .. } => ErrorType::DnsConfig,
            DialFault::TlsHostname { .. } => ErrorType::TlsHostNameError,
            DialFault::TlsAuthority { .. } => ErrorType::TlsUnknownAuthority,
            DialFault::TlsCertificate { .. } => ErrorType::TlsCertificateInvalid,
            DialFault::TlsRoots { .. } => ErrorType::TlsSystemRootsError,
            DialFault::Connect { .. } | DialFault::Generic { .. } => ErrorType::UnknownError,
        }
    }

    /// 网络层故障是否自报为超时；TLS校验类故障恒为 false
    pub fn is_timeout(&self) -> bool {
        match self {
            DialFault::Dns { timeout, .. }
            | DialFault::Connect { timeout, .. }
            | DialFault::Generic { timeout, .. } => *timeout,
            _ => false,
        }
    }

    /// 转换为错误记录
    pub fn to_probe_error(&self) -> ProbeError {
        ProbeError::new(self.error_type(), self.to_string())
    }

    /// 由IO错误构造通用故障
    pub fn from_io(error: &std::io::Error) -> Self {
        DialFault::Generic {
            message: error.to_string(),
            timeout: error.kind() == std::io::ErrorKind::TimedOut,
        }
    }
}

/// 单次探测的故障记录器
///
/// 每个槽位最多保存一个故障，同类故障后写覆盖先写。
#[derive(Debug, Default)]
pub struct FaultRecorder {
    slots: BTreeMap<FaultKind, DialFault>,
}

impl FaultRecorder {
    /// 创建空记录器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录故障
    pub fn record(&mut self, fault: DialFault) {
        self.slots.insert(fault.kind(), fault);
    }

    /// 是否没有任何故障
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 读取指定槽位
    pub fn get(&self, kind: FaultKind) -> Option<&DialFault> {
        self.slots.get(&kind)
    }

    /// 按优先级取出决定性故障
    pub fn terminal(&self) -> Option<&DialFault> {
        self.slots.values().next()
    }

    /// 翻译为错误记录：至多一条，外加超时标志
    pub fn translate(&self) -> (Option<ProbeError>, bool) {
        match self.terminal() {
            Some(fault) => (Some(fault.to_probe_error()), fault.is_timeout()),
            None => (None, false),
        }
    }
}
