//! REST 요청 파이프라인.
//!
//! 모든 REST 작업은 다음 경로를 거칩니다:
//!
//! 1. 시도마다 요청 한도 토큰 획득 (재시도 포함)
//! 2. 인증이 필요하면 원본 요청으로 다시 서명
//! 3. 시도별 타임아웃을 적용해 전송
//! 4. 일시적 실패는 재시도, 소진 시 마지막 에러 반환
//!
//! 인증 헤더는 같은 이름의 호출자 헤더를 덮어씁니다.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use money_core::{CredentialStore, Venue, VenueConfig};

use crate::auth::{canonical_query, Authenticator};
use crate::error::{ExchangeError, ExchangeResult};
use crate::rate_limiter::RateLimiter;
use crate::retry::{with_retry, RetryConfig};

/// REST 요청 명세.
///
/// 호출마다 생성되며 재시도 중에도 변경되지 않습니다.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// 기본 URL 기준 경로 (앞의 `/`는 있어도 없어도 됨)
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
    pub requires_auth: bool,
    /// 고정 서명 시각. 없으면 시도마다 현재 시각을 사용합니다.
    pub timestamp: Option<DateTime<Utc>>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            requires_auth: false,
            timestamp: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 인증 필요 요청으로 표시합니다.
    pub fn signed(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// 로그용 요청 설명 (`GET api/v3/depth`).
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.path.trim_start_matches('/'))
    }
}

/// 가공하지 않은 2xx 응답.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    /// 본문을 JSON으로 역직렬화합니다.
    pub fn json<T: DeserializeOwned>(&self) -> ExchangeResult<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            ExchangeError::ParseError(format!("{} (body: {})", e, truncate(&self.body, 200)))
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// 요청 한도, 재시도, 인증을 결합한 REST 호출 경로.
pub struct RequestPipeline {
    venue: Venue,
    base_url: String,
    client: Client,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
    authenticator: Option<Authenticator>,
    credentials: Arc<dyn CredentialStore>,
    deadline: Option<Duration>,
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("venue", &self.venue)
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl RequestPipeline {
    /// 거래소 설정으로 파이프라인을 생성합니다.
    pub fn new(
        venue: Venue,
        base_url: impl Into<String>,
        config: &VenueConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ExchangeError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            venue,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            limiter: Arc::new(RateLimiter::from_config(config)?),
            retry: RetryConfig::from_config(config),
            authenticator: Authenticator::for_venue(venue),
            credentials,
            deadline: config.deadline(),
        })
    }

    /// 다른 파이프라인과 요청 한도를 공유합니다.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// 재시도를 포함한 전체 호출 데드라인.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// 요청을 실행합니다.
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> ExchangeResult<RawResponse> {
        self.execute_with_deadline(descriptor, self.deadline).await
    }

    /// 주어진 데드라인으로 요청을 실행합니다. 초과 시 [`ExchangeError::Timeout`].
    pub async fn execute_with_deadline(
        &self,
        descriptor: &RequestDescriptor,
        deadline: Option<Duration>,
    ) -> ExchangeResult<RawResponse> {
        let operation = format!("{} {}", self.venue, descriptor.describe());
        let call = with_retry(&self.retry, &operation, || self.attempt(descriptor));

        match deadline {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                ExchangeError::Timeout(format!(
                    "{} exceeded deadline of {}ms",
                    operation,
                    limit.as_millis()
                ))
            })?,
            None => call.await,
        }
    }

    /// 요청을 실행하고 응답을 역직렬화합니다.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> ExchangeResult<T> {
        self.execute(descriptor).await?.json()
    }

    async fn attempt(&self, descriptor: &RequestDescriptor) -> ExchangeResult<RawResponse> {
        self.limiter.acquire().await;

        let body = match &descriptor.body {
            Some(value) => serde_json::to_string(value)?,
            None => String::new(),
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &descriptor.headers {
            headers.insert(header_name(name)?, header_value(value)?);
        }

        // 토큰 대기 이후에 서명해야 timestamp가 전송 시각과 일치합니다.
        let query = if descriptor.requires_auth {
            let authenticator = self.authenticator.ok_or_else(|| {
                ExchangeError::NotSupported(format!("{} does not sign requests", self.venue))
            })?;
            let credential = self.credentials.get(self.venue);
            let signed = authenticator.sign_at(
                descriptor.method.as_str(),
                &descriptor.path,
                &descriptor.query,
                &body,
                credential.as_ref(),
                descriptor.timestamp.unwrap_or_else(Utc::now),
            )?;
            for (name, value) in &signed.headers {
                headers.insert(header_name(name)?, header_value(value)?);
            }
            signed.query
        } else {
            descriptor.query.clone()
        };

        let mut url = format!(
            "{}/{}",
            self.base_url,
            descriptor.path.trim_start_matches('/')
        );
        let query_string = canonical_query(&query);
        if !query_string.is_empty() {
            url.push('?');
            url.push_str(&query_string);
        }

        tracing::debug!(venue = %self.venue, method = %descriptor.method, url = %url, "REST request");

        let mut request = self
            .client
            .request(descriptor.method.clone(), &url)
            .headers(headers);
        if !body.is_empty() {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::debug!(
                venue = %self.venue,
                status = status.as_u16(),
                body = %truncate(&text, 200),
                "REST error response"
            );
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(RawResponse {
            status: status.as_u16(),
            headers: response_headers,
            body: text,
        })
    }
}

fn header_name(name: &str) -> ExchangeResult<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| ExchangeError::InvalidConfig(format!("header name {}: {}", name, e)))
}

fn header_value(value: &str) -> ExchangeResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ExchangeError::InvalidConfig(format!("header value: {}", e)))
}
