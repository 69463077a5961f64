//! 거래소 API 자격증명 저장소.
//!
//! 시크릿은 [`SecretString`]으로 보관되며 `Debug` 출력에서 마스킹됩니다.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use crate::config::VenueConfig;
use crate::domain::Venue;
use crate::error::{CoreError, CoreResult};

/// 거래소 API 자격증명.
#[derive(Clone)]
pub struct Credential {
    /// API 키
    pub key: String,
    /// API 시크릿
    pub secret: SecretString,
    /// 패스프레이즈 (Coinbase, OKX)
    pub passphrase: Option<SecretString>,
}

impl Credential {
    /// 키와 시크릿으로 자격증명을 생성합니다.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: SecretString::from(secret.into()),
            passphrase: None,
        }
    }

    /// 패스프레이즈를 설정합니다.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(SecretString::from(passphrase.into()));
        self
    }

    /// 시크릿 원문을 반환합니다.
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }

    /// 패스프레이즈 원문을 반환합니다.
    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_ref().map(|p| p.expose_secret())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("key", &mask(&self.key))
            .field("secret", &"***")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .finish()
    }
}

/// 앞 4자리만 남기고 마스킹합니다.
fn mask(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    format!("{}***", visible)
}

/// 거래소별 자격증명 조회.
pub trait CredentialStore: Send + Sync {
    /// 거래소 자격증명을 조회합니다.
    fn get(&self, venue: Venue) -> Option<Credential>;
}

/// 메모리 기반 자격증명 저장소.
#[derive(Default)]
pub struct ApiKeyStore {
    keys: RwLock<HashMap<Venue, Credential>>,
}

impl ApiKeyStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 자격증명을 등록하거나 교체합니다.
    pub fn set_key(&self, venue: Venue, credential: Credential) {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(venue, credential);
        }
    }

    /// 자격증명을 제거합니다.
    pub fn remove_key(&self, venue: Venue) -> Option<Credential> {
        self.keys.write().ok().and_then(|mut keys| keys.remove(&venue))
    }

    /// 모든 자격증명을 제거합니다.
    pub fn clear(&self) {
        if let Ok(mut keys) = self.keys.write() {
            keys.clear();
        }
    }

    /// 등록된 거래소 목록.
    pub fn venues(&self) -> Vec<Venue> {
        self.keys
            .read()
            .map(|keys| keys.keys().copied().collect())
            .unwrap_or_default()
    }

    /// 설정에 지정된 환경 변수에서 자격증명을 읽어 등록합니다.
    ///
    /// 키 또는 시크릿 변수 이름이 설정되지 않았으면 아무것도 하지 않고 `Ok(false)`를
    /// 반환합니다. 변수 이름은 있지만 값이 없으면 에러입니다.
    pub fn load_from_env(&self, venue: Venue, config: &VenueConfig) -> CoreResult<bool> {
        let (Some(key_var), Some(secret_var)) = (&config.api_key_env, &config.api_secret_env)
        else {
            return Ok(false);
        };

        let key = read_env(key_var)?;
        let secret = read_env(secret_var)?;
        let mut credential = Credential::new(key, secret);

        if let Some(pass_var) = &config.passphrase_env {
            credential = credential.with_passphrase(read_env(pass_var)?);
        }

        tracing::debug!(venue = %venue, key = %mask(&credential.key), "Credential loaded from env");
        self.set_key(venue, credential);
        Ok(true)
    }
}

fn read_env(name: &str) -> CoreResult<String> {
    std::env::var(name)
        .map_err(|_| CoreError::Credential(format!("environment variable {} is not set", name)))
}

impl CredentialStore for ApiKeyStore {
    fn get(&self, venue: Venue) -> Option<Credential> {
        self.keys.read().ok().and_then(|keys| keys.get(&venue).cloned())
    }
}

impl fmt::Debug for ApiKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyStore")
            .field("venues", &self.venues())
            .finish()
    }
}
