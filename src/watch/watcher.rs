//! 服务监视器
//!
//! 每个服务一个 tokio 任务，按固定间隔重复探测并把结果按顺序发送到结果通道。

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::probe::{ProbeExecutor, ProbeResult, ProbeSettings};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 两次探测之间的最短间隔
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// 监视器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatcherState {
    /// 运行中
    Running = 0,
    /// 已请求停止，等待循环退出
    Stopping = 1,
    /// 已停止
    Stopped = 2,
}

impl From<u8> for WatcherState {
    fn from(value: u8) -> Self {
        match value {
            0 => WatcherState::Running,
            1 => WatcherState::Stopping,
            _ => WatcherState::Stopped,
        }
    }
}

/// 服务监视器句柄
///
/// 句柄被丢弃时监视循环也会结束。
pub struct Watcher {
    service_id: String,
    state: Arc<AtomicU8>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Watcher {
    /// 使用默认探测参数启动监视
    ///
    /// # 参数
    /// * `service` - 服务配置
    /// * `sink` - 结果通道
    pub fn start(service: ServiceConfig, sink: mpsc::Sender<ProbeResult>) -> Result<Self> {
        let executor = Arc::new(ProbeExecutor::new(ProbeSettings::default())?);
        Ok(Self::start_with(service, executor, sink))
    }

    /// 使用共享的执行器启动监视，立即返回
    ///
    /// 服务的探测间隔应大于0；短于 [`MIN_INTERVAL`] 时按 [`MIN_INTERVAL`] 执行。
    pub fn start_with(
        service: ServiceConfig,
        executor: Arc<ProbeExecutor>,
        sink: mpsc::Sender<ProbeResult>,
    ) -> Self {
        let service_id = service.id.clone();
        let state = Arc::new(AtomicU8::new(WatcherState::Running as u8));
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(watch_loop(
            service,
            executor,
            sink,
            Arc::clone(&state),
            stop_rx,
        ));

        Self {
            service_id,
            state,
            stop_tx,
            task,
        }
    }

    /// 请求停止监视
    ///
    /// 异步且尽力而为：正在进行的探测会继续完成，但其结果会被丢弃，之后不再开始新的探测。
    pub fn stop(&self) {
        if self
            .state
            .compare_exchange(
                WatcherState::Running as u8,
                WatcherState::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            debug!("请求停止服务监视: {}", self.service_id);
        }
        self.stop_tx.send_replace(true);
    }

    /// 当前状态
    pub fn state(&self) -> WatcherState {
        WatcherState::from(self.state.load(Ordering::SeqCst))
    }

    /// 服务标识
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// 等待监视循环结束
    pub async fn join(self) {
        let Watcher {
            service_id,
            stop_tx,
            task,
            ..
        } = self;

        if let Err(e) = task.await {
            warn!("服务监视任务异常结束 {}: {}", service_id, e);
        }
        drop(stop_tx);
    }
}

fn stop_requested(state: &AtomicU8, stop_rx: &watch::Receiver<bool>) -> bool {
    state.load(Ordering::SeqCst) != WatcherState::Running as u8
        || *stop_rx.borrow()
        || stop_rx.has_changed().is_err()
}

async fn watch_loop(
    service: ServiceConfig,
    executor: Arc<ProbeExecutor>,
    sink: mpsc::Sender<ProbeResult>,
    state: Arc<AtomicU8>,
    mut stop_rx: watch::Receiver<bool>,
) {
    info!("启动服务监视: {} ({})", service.id, service.endpoint);
    let interval = if service.interval() < MIN_INTERVAL {
        warn!(
            "服务 {} 的探测间隔 {:?} 过短，改为 {:?}",
            service.id,
            service.interval(),
            MIN_INTERVAL
        );
        MIN_INTERVAL
    } else {
        service.interval()
    };

    loop {
        if stop_requested(&state, &stop_rx) {
            break;
        }

        let result = executor.probe(&service).await;

        if stop_requested(&state, &stop_rx) {
            debug!("服务 {} 已请求停止，丢弃本次结果", service.id);
            break;
        }

        // 消费端不读取时在此阻塞，间隔随之顺延
        tokio::select! {
            sent = sink.send(result) => {
                if sent.is_err() {
                    warn!("结果接收端已关闭，停止服务监视: {}", service.id);
                    break;
                }
            }
            _ = stop_rx.changed() => {
                debug!("服务 {} 在等待发送时被停止", service.id);
                break;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop_rx.changed() => {}
        }
    }

    state.store(WatcherState::Stopped as u8, Ordering::SeqCst);
    info!("服务监视已停止: {}", service.id);
}
