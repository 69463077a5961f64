//! 알림(alert) 싱크와 관리자.
//!
//! 스트리밍 엔진과 폴러는 실패를 호출자에게 반환하지 않고 알림으로 보고합니다.
//! 싱크의 실패나 패닉은 엔진으로 전파되지 않습니다.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// 알림 심각도.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "info"),
            AlertLevel::Warning => write!(f, "warning"),
            AlertLevel::Critical => write!(f, "critical"),
        }
    }
}

/// 알림 메시지.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    /// 부가 정보 (거래소, URL, 에러 등)
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl Alert {
    /// 새 알림을 생성합니다.
    pub fn new(level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// 컨텍스트 항목을 추가합니다.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }
}

/// 알림 싱크 에러.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("알림 전송 실패: {0}")]
    Delivery(String),
}

/// 알림 전달 대상.
pub trait AlertSink: Send + Sync {
    /// 알림을 전달합니다.
    fn emit(&self, alert: &Alert) -> Result<(), AlertError>;
}

/// 알림을 tracing 이벤트로 기록하는 기본 싱크.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn emit(&self, alert: &Alert) -> Result<(), AlertError> {
        match alert.level {
            AlertLevel::Info => {
                tracing::info!(context = ?alert.context, "{}", alert.message)
            }
            AlertLevel::Warning => {
                tracing::warn!(context = ?alert.context, "{}", alert.message)
            }
            AlertLevel::Critical => {
                tracing::error!(context = ?alert.context, "{}", alert.message)
            }
        }
        Ok(())
    }
}

/// 알림 관리자.
///
/// 복제 비용이 낮아 여러 태스크에서 공유할 수 있습니다.
#[derive(Clone)]
pub struct AlertManager {
    sink: Arc<dyn AlertSink>,
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(Arc::new(TracingAlertSink))
    }
}

impl fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertManager").finish_non_exhaustive()
    }
}

impl AlertManager {
    /// 주어진 싱크로 관리자를 생성합니다.
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink }
    }

    /// 알림을 전달합니다. 싱크의 에러와 패닉은 로그로만 남깁니다.
    pub fn send(&self, alert: Alert) {
        let sink = &self.sink;
        match catch_unwind(AssertUnwindSafe(|| sink.emit(&alert))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, level = %alert.level, "Alert sink failed");
            }
            Err(_) => {
                tracing::error!(level = %alert.level, "Alert sink panicked");
            }
        }
    }

    pub fn info(&self, message: impl Into<String>, context: BTreeMap<String, String>) {
        self.send(Alert {
            level: AlertLevel::Info,
            message: message.into(),
            context,
        });
    }

    pub fn warning(&self, message: impl Into<String>, context: BTreeMap<String, String>) {
        self.send(Alert {
            level: AlertLevel::Warning,
            message: message.into(),
            context,
        });
    }

    pub fn critical(&self, message: impl Into<String>, context: BTreeMap<String, String>) {
        self.send(Alert {
            level: AlertLevel::Critical,
            message: message.into(),
            context,
        });
    }
}
