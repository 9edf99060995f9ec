//! 监视模块
//!
//! 提供按服务重复探测的监视器和结果收集器

pub mod collector;
pub mod watcher;

pub use collector::{Collector, ResultCallback};
pub use watcher::{Watcher, WatcherState, MIN_INTERVAL};
