//! 探测模块
//!
//! 提供单次探测的执行、连接故障分类以及结果数据模型

pub mod dialer;
pub mod executor;
pub mod fault;
pub mod result;
pub mod session;
pub mod settings;
pub mod tls;

pub use dialer::{Connection, Dialer, Target};
pub use executor::ProbeExecutor;
pub use fault::{DialFault, FaultKind, FaultRecorder};
pub use result::{ErrorType, ProbeError, ProbeResult, ProbeResultBuilder};
pub use session::{NoopSessionRunner, SessionError, SessionRunner};
pub use settings::ProbeSettings;
pub use tls::ExpiringCertificate;
