//! 探测执行器
//!
//! 对一个服务端点执行一次完整的探测，始终返回一个结果，从不返回错误。

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::probe::dialer::{Connection, Dialer, Target};
use crate::probe::fault::{DialFault, FaultRecorder};
use crate::probe::result::{ErrorType, ProbeError, ProbeResult, ProbeResultBuilder};
use crate::probe::session::{NoopSessionRunner, SessionError, SessionRunner};
use crate::probe::settings::ProbeSettings;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::header::{HOST, USER_AGENT};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// 探测执行器
///
/// 只持有不可变的参数、解析器和TLS配置，可以通过 `Arc` 在多个监视器之间共享。
pub struct ProbeExecutor {
    settings: ProbeSettings,
    dialer: Dialer,
    session_runner: Arc<dyn SessionRunner>,
}

impl ProbeExecutor {
    /// 创建新的探测执行器
    ///
    /// # 参数
    /// * `settings` - 探测参数
    ///
    /// # 返回
    /// * `Result<Self>` - TLS配置无法构建时返回错误
    pub fn new(settings: ProbeSettings) -> Result<Self> {
        let dialer = Dialer::new(&settings)?;
        Ok(Self {
            settings,
            dialer,
            session_runner: Arc::new(NoopSessionRunner),
        })
    }

    /// 设置会话执行器
    pub fn with_session_runner(mut self, runner: Arc<dyn SessionRunner>) -> Self {
        self.session_runner = runner;
        self
    }

    /// 探测参数
    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// 执行一次探测
    ///
    /// # 参数
    /// * `service` - 服务配置
    ///
    /// # 返回
    /// * `ProbeResult` - 探测结果，错误列表为空表示健康
    pub async fn probe(&self, service: &ServiceConfig) -> ProbeResult {
        let mut builder = ProbeResult::builder(&service.id);
        self.run(service, &mut builder).await;
        Self::finish(builder)
    }

    async fn run(&self, service: &ServiceConfig, result: &mut ProbeResultBuilder) {
        let target = match Target::parse(&service.endpoint) {
            Ok(target) => target,
            Err(message) => {
                result.push(ProbeError::new(ErrorType::EndpointInvalid, message));
                return;
            }
        };

        let request = match self.build_request(&target) {
            Ok(request) => request,
            Err(message) => {
                result.push(ProbeError::new(ErrorType::EndpointInvalid, message));
                return;
            }
        };

        // 先单独解析域名，解析失败时不再发起请求
        let addrs = match target.ip() {
            Some(ip) => vec![ip],
            None => match self.dialer.resolve(&target.host).await {
                Ok(addrs) => addrs,
                Err(fault) => {
                    result.push(fault.to_probe_error());
                    return;
                }
            },
        };

        let mut recorder = FaultRecorder::new();
        let status = match self.dialer.connect(&target, &addrs).await {
            Ok(connection) => {
                result.extend(connection.expiring.iter().map(|cert| cert.to_probe_error()));
                match self.round_trip(connection, request).await {
                    Ok(status) => Some(status),
                    Err(fault) => {
                        recorder.record(fault);
                        None
                    }
                }
            }
            Err(fault) => {
                recorder.record(fault);
                None
            }
        };

        let Some(status) = status else {
            let message = recorder
                .terminal()
                .map(ToString::to_string)
                .unwrap_or_default();
            result.push(ProbeError::new(
                ErrorType::ClientError,
                format!("Get \"{}\": {}", service.endpoint, message),
            ));

            let (error, timeout) = recorder.translate();
            if let Some(error) = error {
                result.push(error);
            }
            result.set_timeout(timeout);
            return;
        };

        if !service.session.is_empty() {
            if let Err(e) = self.run_session(service, result).await {
                warn!("服务 {} 会话执行失败: {}", service.id, e);
                result.push(
                    ProbeError::new(ErrorType::SessionFail, e.to_string()).with_comment(e.comment()),
                );
            }
        }

        if status != StatusCode::OK {
            result.push(ProbeError::new(
                ErrorType::WrongHttpStatus,
                format!("unexpected status code: {}", status.as_u16()),
            ));
        }
    }

    fn build_request(&self, target: &Target) -> std::result::Result<Request<Empty<Bytes>>, String> {
        Request::builder()
            .method(Method::GET)
            .uri(target.path.as_str())
            .header(HOST, target.authority.as_str())
            .header(USER_AGENT, self.settings.user_agent.as_str())
            .body(Empty::new())
            .map_err(|e| e.to_string())
    }

    /// 在已建立的连接上发送请求；不跟随重定向，响应体直接丢弃
    async fn round_trip(
        &self,
        connection: Connection,
        request: Request<Empty<Bytes>>,
    ) -> std::result::Result<StatusCode, DialFault> {
        let exchange = async move {
            let io = TokioIo::new(connection.into_stream());
            let (mut sender, driver) = hyper::client::conn::http1::handshake(io).await?;
            tokio::spawn(async move {
                if let Err(e) = driver.await {
                    debug!("连接关闭: {}", e);
                }
            });

            let response = sender.send_request(request).await?;
            Ok::<_, hyper::Error>(response.status())
        };

        match timeout(self.settings.request_timeout, exchange).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => Err(DialFault::Generic {
                message: e.to_string(),
                timeout: e.is_timeout(),
            }),
            Err(_) => Err(DialFault::Generic {
                message: "request timeout while awaiting headers".to_string(),
                timeout: true,
            }),
        }
    }

    /// 用全新的带 cookie 客户端执行会话
    async fn run_session(
        &self,
        service: &ServiceConfig,
        result: &ProbeResultBuilder,
    ) -> std::result::Result<(), SessionError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .cookie_provider(Arc::new(reqwest::cookie::Jar::default()))
            .use_preconfigured_tls(self.dialer.tls_config().as_ref().clone())
            .connect_timeout(self.settings.dial_timeout)
            .timeout(self.settings.request_timeout)
            .user_agent(self.settings.user_agent.as_str())
            .build()?;

        let snapshot = result.snapshot();
        self.session_runner
            .run(&service.session, &client, &snapshot)
            .await
    }

    fn finish(builder: ProbeResultBuilder) -> ProbeResult {
        let result = builder.finish();
        if result.is_success() {
            debug!(
                "服务 {} 探测成功，耗时 {}ms",
                result.id(),
                result.runtime_ms()
            );
        } else {
            warn!(
                "服务 {} 探测失败: {:?} (超时: {})",
                result.id(),
                result.error_types(),
                result.timeout()
            );
        }
        result
    }
}
