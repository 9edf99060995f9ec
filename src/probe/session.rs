//! 会话执行接口
//!
//! 多步骤交互（登录、内容断言等）由外部实现的 [`SessionRunner`] 完成，
//! 探测执行器只关心它返回的成功或失败。

use crate::config::SessionCall;
use crate::probe::result::{ErrorType, ProbeResult};
use async_trait::async_trait;
use thiserror::Error;

/// 会话执行失败的原因
#[derive(Debug, Error)]
pub enum SessionError {
    /// 无法获取登录凭据
    #[error("credentials: {0}")]
    Credentials(String),

    /// 正则表达式不匹配或无法编译
    #[error("regex: {0}")]
    Regex(String),

    /// JSON路径查询失败
    #[error("json path: {0}")]
    JsonPath(String),

    /// DOM查询执行错误
    #[error("dom query: {0}")]
    DomQuery(String),

    /// DOM查询结果不符
    #[error("dom query mismatch: {0}")]
    DomQueryMismatch(String),

    /// 数据不符
    #[error("data mismatch: {0}")]
    DataMismatch(String),

    /// 响应内容类型不符
    #[error("unexpected content type: {0}")]
    UnexpectedContentType(String),

    /// 响应体无法读取或解析
    #[error("bad response body: {0}")]
    BadResponseBody(String),

    /// 请求失败
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl SessionError {
    /// 对应的错误分类标签；凭据和请求失败没有专门的标签
    pub fn error_type(&self) -> Option<ErrorType> {
        match self {
            SessionError::Regex(_) => Some(ErrorType::Regex),
            SessionError::JsonPath(_) => Some(ErrorType::JsonPath),
            SessionError::DomQuery(_) => Some(ErrorType::GoQuery),
            SessionError::DomQueryMismatch(_) => Some(ErrorType::GoQueryMismatch),
            SessionError::DataMismatch(_) => Some(ErrorType::DataMismatch),
            SessionError::UnexpectedContentType(_) => Some(ErrorType::UnexpectedContentType),
            SessionError::BadResponseBody(_) => Some(ErrorType::BadResponseBody),
            SessionError::Credentials(_) | SessionError::Request(_) => None,
        }
    }

    /// 写入 sessionFail 错误记录的附加说明
    pub fn comment(&self) -> &'static str {
        match self {
            SessionError::Credentials(_) => "credentials",
            SessionError::Request(_) => "request",
            other => other
                .error_type()
                .map(|error_type| error_type.as_str())
                .unwrap_or_default(),
        }
    }
}

/// 会话执行器trait
#[async_trait]
pub trait SessionRunner: Send + Sync {
    /// 执行会话
    ///
    /// # 参数
    /// * `session` - 会话调用列表
    /// * `client` - 带 cookie 的HTTP客户端，不跟随重定向
    /// * `result` - 到目前为止的探测结果（只读）
    async fn run(
        &self,
        session: &[SessionCall],
        client: &reqwest::Client,
        result: &ProbeResult,
    ) -> Result<(), SessionError>;
}

/// 不执行任何操作的会话执行器
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSessionRunner;

#[async_trait]
impl SessionRunner for NoopSessionRunner {
    async fn run(
        &self,
        _session: &[SessionCall],
        _client: &reqwest::Client,
        _result: &ProbeResult,
    ) -> Result<(), SessionError> {
        Ok(())
    }
}
