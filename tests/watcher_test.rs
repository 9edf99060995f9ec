//! 服务监视器集成测试
//!
//! 验证结果顺序、停止语义、背压以及接收端关闭后的退出。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use vitals_watch::config::ServiceConfig;
use vitals_watch::probe::{ErrorType, ProbeExecutor, ProbeSettings};
use vitals_watch::watch::{Collector, Watcher, WatcherState};

const WAIT: Duration = Duration::from_secs(5);

fn executor() -> Arc<ProbeExecutor> {
    Arc::new(
        ProbeExecutor::new(
            ProbeSettings::default()
                .with_system_roots(false)
                .with_timeouts(Duration::from_secs(2), Duration::from_secs(5)),
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn test_results_arrive_in_order() {
    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/").with_status(200).create_async().await;

    let (tx, mut rx) = mpsc::channel(8);
    let service = ServiceConfig::new("shop", server.url()).with_interval(Duration::from_millis(20));
    let watcher = Watcher::start_with(service, executor(), tx);

    let mut results = Vec::new();
    for _ in 0..3 {
        let result = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        results.push(result);
    }

    watcher.stop();
    timeout(WAIT, watcher.join()).await.unwrap();

    assert!(results.iter().all(|r| r.id() == "shop" && r.is_success()));
    assert!(results
        .windows(2)
        .all(|pair| pair[0].timestamp() <= pair[1].timestamp()));
}

#[tokio::test]
async fn test_stop_interrupts_interval() {
    let (tx, mut rx) = mpsc::channel(4);
    let service = ServiceConfig::new("broken", "not a url").with_interval(Duration::from_secs(3600));
    let watcher = Watcher::start_with(service, executor(), tx);

    let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.error_types(), vec![ErrorType::EndpointInvalid]);
    assert_eq!(watcher.state(), WatcherState::Running);

    watcher.stop();
    // 重复调用没有副作用
    watcher.stop();
    assert_ne!(watcher.state(), WatcherState::Running);

    timeout(WAIT, watcher.join()).await.unwrap();
    // 停止后不再有新结果，通道随任务结束而关闭
    assert!(timeout(WAIT, rx.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_state_reaches_stopped() {
    let (tx, _rx) = mpsc::channel(4);
    let service = ServiceConfig::new("broken", "not a url").with_interval(Duration::from_secs(3600));
    let watcher = Watcher::start_with(service, executor(), tx);

    watcher.stop();
    timeout(WAIT, async {
        while watcher.state() != WatcherState::Stopped {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    timeout(WAIT, watcher.join()).await.unwrap();
}

#[tokio::test]
async fn test_invalid_endpoint_keeps_looping() {
    let (tx, mut rx) = mpsc::channel(4);
    let service =
        ServiceConfig::new("broken", "ftp://files.example/").with_interval(Duration::from_millis(10));
    let watcher = Watcher::start_with(service, executor(), tx);

    for _ in 0..3 {
        let result = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(result.error_types(), vec![ErrorType::EndpointInvalid]);
    }

    watcher.stop();
    timeout(WAIT, watcher.join()).await.unwrap();
}

#[tokio::test]
async fn test_slow_consumer_blocks_watcher() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/")
        .with_status(200)
        .expect_at_most(2)
        .create_async()
        .await;

    let (tx, mut rx) = mpsc::channel(1);
    let service = ServiceConfig::new("shop", server.url()).with_interval(Duration::from_millis(5));
    let watcher = Watcher::start_with(service, executor(), tx);

    // 不读取结果：一个结果在通道中，一个阻塞在发送上
    tokio::time::sleep(Duration::from_millis(300)).await;

    watcher.stop();
    timeout(WAIT, watcher.join()).await.unwrap();
    mock.assert_async().await;

    // 阻塞中的结果在停止时被丢弃
    let mut received = 0;
    while let Some(result) = timeout(WAIT, rx.recv()).await.unwrap() {
        assert!(result.is_success());
        received += 1;
    }
    assert_eq!(received, 1);
}

#[tokio::test]
async fn test_closed_receiver_ends_loop() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let service =
        ServiceConfig::new("broken", "not a url").with_interval(Duration::from_millis(10));
    let watcher = Watcher::start_with(service, executor(), tx);

    timeout(WAIT, watcher.join()).await.unwrap();
}

#[tokio::test]
async fn test_dropped_handle_ends_loop() {
    let (tx, mut rx) = mpsc::channel(4);
    let service = ServiceConfig::new("broken", "not a url").with_interval(Duration::from_secs(3600));
    let watcher = Watcher::start_with(service, executor(), tx);

    assert!(timeout(WAIT, rx.recv()).await.unwrap().is_some());
    drop(watcher);

    assert!(timeout(WAIT, rx.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_collector_tracks_many_watchers() {
    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/").with_status(200).create_async().await;
    server.mock("GET", "/down").with_status(500).create_async().await;

    let (tx, rx) = mpsc::channel(4);
    let collector = Arc::new(Collector::new());
    let collector_task = Arc::clone(&collector).spawn(rx);

    let executor = executor();
    let watchers = vec![
        Watcher::start_with(
            ServiceConfig::new("up", server.url()).with_interval(Duration::from_millis(20)),
            Arc::clone(&executor),
            tx.clone(),
        ),
        Watcher::start_with(
            ServiceConfig::new("down", format!("{}/down", server.url()))
                .with_interval(Duration::from_millis(20)),
            Arc::clone(&executor),
            tx.clone(),
        ),
    ];
    drop(tx);

    timeout(WAIT, async {
        while collector.snapshot().await.len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    for watcher in &watchers {
        watcher.stop();
    }
    for watcher in watchers {
        timeout(WAIT, watcher.join()).await.unwrap();
    }
    timeout(WAIT, collector_task).await.unwrap().unwrap();

    let failing = collector.failing().await;
    assert_eq!(failing.len(), 1);
    assert_eq!(failing[0].id(), "down");
    assert!(collector.latest("up").await.unwrap().is_success());
}
