//! 探测结果数据结构
//!
//! 定义单次探测的结果、错误记录以及错误分类标签。
//! 结果一经构建便不可修改，按值在执行器、监视器和消费者之间传递。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// 错误分类标签
///
/// 序列化后的字符串与既有仪表盘使用的标签保持一致（包括 `tlsUnknownAutority` 的拼写）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    /// 端点无法解析为请求目标
    #[serde(rename = "endpointInvalid")]
    EndpointInvalid,
    /// 响应过慢
    #[serde(rename = "serverTooSlow")]
    ServerTooSlow,
    /// 未实现
    #[serde(rename = "notImplemented")]
    NotImplemented,
    /// 无法识别的网络错误
    #[serde(rename = "unknownError")]
    UnknownError,
    /// HTTP客户端层面的错误
    #[serde(rename = "clientError")]
    ClientError,
    /// 域名解析失败
    #[serde(rename = "dns")]
    Dns,
    /// 解析器配置错误
    #[serde(rename = "dnsConfig")]
    DnsConfig,
    /// 证书校验失败（过期、尚未生效、用途不符等）
    #[serde(rename = "tlsCertificateInvalid")]
    TlsCertificateInvalid,
    /// 证书与主机名不匹配
    #[serde(rename = "tlsHostNameError")]
    TlsHostNameError,
    /// 系统根证书无法加载
    #[serde(rename = "tlsSystemRootsError")]
    TlsSystemRootsError,
    /// 证书链不是由受信任的根签发
    #[serde(rename = "tlsUnknownAutority")]
    TlsUnknownAuthority,
    /// 状态码不是200
    #[serde(rename = "wrongHTTPStatus")]
    WrongHttpStatus,
    /// 证书即将过期
    #[serde(rename = "certificateIsExpiring")]
    CertificateIsExpiring,
    /// 响应内容类型不符
    #[serde(rename = "unexpectedContentType")]
    UnexpectedContentType,
    /// 会话执行失败
    #[serde(rename = "sessionFail")]
    SessionFail,
    /// DOM查询结果不符
    #[serde(rename = "goqueryMismatch")]
    GoQueryMismatch,
    /// DOM查询执行错误
    #[serde(rename = "goQueryGeneralError")]
    GoQuery,
    /// 数据不符
    #[serde(rename = "dataMismatch")]
    DataMismatch,
    /// JSON路径错误
    #[serde(rename = "jsonPathError")]
    JsonPath,
    /// 正则表达式错误
    #[serde(rename = "regexError")]
    Regex,
    /// 响应体错误
    #[serde(rename = "badResponseBody")]
    BadResponseBody,
}

impl ErrorType {
    /// 全部标签
    pub const ALL: [ErrorType; 21] = [
        ErrorType::EndpointInvalid,
        ErrorType::ServerTooSlow,
        ErrorType::NotImplemented,
        ErrorType::UnknownError,
        ErrorType::ClientError,
        ErrorType::Dns,
        ErrorType::DnsConfig,
        ErrorType::TlsCertificateInvalid,
        ErrorType::TlsHostNameError,
        ErrorType::TlsSystemRootsError,
        ErrorType::TlsUnknownAuthority,
        ErrorType::WrongHttpStatus,
        ErrorType::CertificateIsExpiring,
        ErrorType::UnexpectedContentType,
        ErrorType::SessionFail,
        ErrorType::GoQueryMismatch,
        ErrorType::GoQuery,
        ErrorType::DataMismatch,
        ErrorType::JsonPath,
        ErrorType::Regex,
        ErrorType::BadResponseBody,
    ];

    /// 获取标签的线上字符串形式
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::EndpointInvalid => "endpointInvalid",
            ErrorType::ServerTooSlow => "serverTooSlow",
            ErrorType::NotImplemented => "notImplemented",
            ErrorType::UnknownError => "unknownError",
            ErrorType::ClientError => "clientError",
            ErrorType::Dns => "dns",
            ErrorType::DnsConfig => "dnsConfig",
            ErrorType::TlsCertificateInvalid => "tlsCertificateInvalid",
            ErrorType::TlsHostNameError => "tlsHostNameError",
            ErrorType::TlsSystemRootsError => "tlsSystemRootsError",
            ErrorType::TlsUnknownAuthority => "tlsUnknownAutority",
            ErrorType::WrongHttpStatus => "wrongHTTPStatus",
            ErrorType::CertificateIsExpiring => "certificateIsExpiring",
            ErrorType::UnexpectedContentType => "unexpectedContentType",
            ErrorType::SessionFail => "sessionFail",
            ErrorType::GoQueryMismatch => "goqueryMismatch",
            ErrorType::GoQuery => "goQueryGeneralError",
            ErrorType::DataMismatch => "dataMismatch",
            ErrorType::JsonPath => "jsonPathError",
            ErrorType::Regex => "regexError",
            ErrorType::BadResponseBody => "badResponseBody",
        }
    }

    /// 是否只是告警（不代表探测失败的原因）
    pub fn is_warning(&self) -> bool {
        matches!(self, ErrorType::CertificateIsExpiring)
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条错误记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeError {
    /// 可读的错误信息
    pub error: String,
    /// 分类标签
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    /// 附加说明
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ProbeError {
    /// 创建新的错误记录
    pub fn new(error_type: ErrorType, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_type,
            comment: None,
        }
    }

    /// 设置附加说明
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        self.comment = if comment.is_empty() {
            None
        } else {
            Some(comment)
        };
        self
    }
}

/// 单次探测的结果
///
/// 字段只读；错误列表为空表示探测成功。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    id: String,
    errors: Vec<ProbeError>,
    timeout: bool,
    timestamp: DateTime<Utc>,
    #[serde(with = "duration_nanos")]
    runtime: Duration,
}

impl ProbeResult {
    /// 为指定服务创建结果构建器，时间戳取当前时刻
    pub fn builder(id: impl Into<String>) -> ProbeResultBuilder {
        ProbeResultBuilder::new(id)
    }

    /// 服务标识
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 按发生顺序排列的错误记录
    pub fn errors(&self) -> &[ProbeError] {
        &self.errors
    }

    /// 是否发生超时
    pub fn timeout(&self) -> bool {
        self.timeout
    }

    /// 创建时间
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// 运行耗时
    pub fn runtime(&self) -> Duration {
        self.runtime
    }

    /// 运行耗时（毫秒）
    pub fn runtime_ms(&self) -> u64 {
        self.runtime.as_millis() as u64
    }

    /// 探测是否完全成功
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// 是否包含指定类型的错误
    pub fn has_error(&self, error_type: ErrorType) -> bool {
        self.errors.iter().any(|e| e.error_type == error_type)
    }

    /// 所有错误的分类标签
    pub fn error_types(&self) -> Vec<ErrorType> {
        self.errors.iter().map(|e| e.error_type).collect()
    }

    /// 转换为JSON字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 从JSON字符串创建
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// 探测结果构建器，只在执行器内部的单次探测中存活
#[derive(Debug)]
pub struct ProbeResultBuilder {
    id: String,
    errors: Vec<ProbeError>,
    timeout: bool,
    timestamp: DateTime<Utc>,
    started: Instant,
}

impl ProbeResultBuilder {
    /// 创建构建器并开始计时
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            errors: Vec::new(),
            timeout: false,
            timestamp: Utc::now(),
            started: Instant::now(),
        }
    }

    /// 追加一条错误
    pub fn push(&mut self, error: ProbeError) {
        self.errors.push(error);
    }

    /// 追加多条错误
    pub fn extend(&mut self, errors: impl IntoIterator<Item = ProbeError>) {
        self.errors.extend(errors);
    }

    /// 设置超时标志
    pub fn set_timeout(&mut self, timeout: bool) {
        self.timeout = timeout;
    }

    /// 当前已收集的错误数量
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// 生成当前进度的只读快照，供会话执行器参考
    pub fn snapshot(&self) -> ProbeResult {
        ProbeResult {
            id: self.id.clone(),
            errors: self.errors.clone(),
            timeout: self.timeout,
            timestamp: self.timestamp,
            runtime: self.started.elapsed(),
        }
    }

    /// 结束计时并生成最终结果
    pub fn finish(self) -> ProbeResult {
        ProbeResult {
            runtime: self.started.elapsed(),
            id: self.id,
            errors: self.errors,
            timeout: self.timeout,
            timestamp: self.timestamp,
        }
    }
}

/// Duration 以纳秒整数序列化
mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_nanos() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}
