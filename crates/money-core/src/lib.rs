//! # Money Core
//!
//! 거래소 커넥터가 공유하는 핵심 도메인 타입과 인프라를 제공합니다.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 시세, 거래량, 호가창, 지갑 이동 레코드
//! - 거래소별 API 자격증명 저장소
//! - 알림(alert) 싱크와 관리자
//! - 설정 관리
//! - 로깅 인프라

pub mod alert;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod logging;

pub use alert::{Alert, AlertError, AlertLevel, AlertManager, AlertSink, TracingAlertSink};
pub use config::*;
pub use credentials::{ApiKeyStore, Credential, CredentialStore};
pub use domain::*;
pub use error::*;
pub use logging::*;
