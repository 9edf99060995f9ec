//! 结果收集器
//!
//! 结果通道的唯一消费者：记录每个结果，并保存每个服务的最新结果。

use crate::logging::{LogConfig, LoggingSystem};
use crate::probe::ProbeResult;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

/// 探测结果回调函数类型
pub type ResultCallback = Arc<dyn Fn(&ProbeResult) + Send + Sync>;

/// 结果收集器
pub struct Collector {
    /// 每个服务的最新结果
    latest: RwLock<HashMap<String, ProbeResult>>,
    /// 结果回调
    callback: Option<ResultCallback>,
    /// 日志输出
    logging: Option<LoggingSystem>,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    /// 创建新的收集器
    pub fn new() -> Self {
        Self {
            latest: RwLock::new(HashMap::new()),
            callback: None,
            logging: None,
        }
    }

    /// 设置结果回调
    pub fn with_callback(mut self, callback: ResultCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// 为每个结果输出一条日志
    pub fn with_logging(mut self, config: LogConfig) -> anyhow::Result<Self> {
        self.logging = Some(LoggingSystem::setup_logging(config)?);
        Ok(self)
    }

    /// 持续读取结果，直到所有发送端关闭
    pub async fn run(&self, mut receiver: mpsc::Receiver<ProbeResult>) {
        let mut received = 0usize;
        while let Some(result) = receiver.recv().await {
            received += 1;
            self.record(result).await;
        }
        info!("结果通道已关闭，共收集 {} 个结果", received);
    }

    /// 在后台任务中运行
    pub fn spawn(self: Arc<Self>, receiver: mpsc::Receiver<ProbeResult>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(receiver).await })
    }

    /// 记录一个结果
    pub async fn record(&self, result: ProbeResult) {
        if let Some(logging) = &self.logging {
            logging.probe_log(&result);
        }
        if let Some(callback) = &self.callback {
            callback(&result);
        }

        let mut latest = self.latest.write().await;
        latest.insert(result.id().to_string(), result);
    }

    /// 指定服务的最新结果
    pub async fn latest(&self, id: &str) -> Option<ProbeResult> {
        self.latest.read().await.get(id).cloned()
    }

    /// 所有服务的最新结果，按服务标识排序
    pub async fn snapshot(&self) -> Vec<ProbeResult> {
        let mut results: Vec<ProbeResult> = self.latest.read().await.values().cloned().collect();
        results.sort_by(|a, b| a.id().cmp(b.id()));
        results
    }

    /// 最新结果不健康的服务
    pub async fn failing(&self) -> Vec<ProbeResult> {
        self.snapshot()
            .await
            .into_iter()
            .filter(|result| !result.is_success())
            .collect()
    }
}
