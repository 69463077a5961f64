//! 거래소별 API 요청 서명.
//!
//! | 거래소 | 서명 대상 | 키 | 인코딩 | 위치 |
//! |---|---|---|---|---|
//! | Binance | 정규화된 쿼리 문자열 (`timestamp` 포함) | 시크릿 원문 | hex | `signature` 쿼리 파라미터 |
//! | Coinbase | `timestamp + METHOD + /path?query + body` | base64 디코딩한 시크릿 | base64 | `CB-ACCESS-*` 헤더 |
//! | OKX | Coinbase와 동일 (ISO-8601 타임스탬프) | base64 디코딩한 시크릿 | base64 | `OK-ACCESS-*` 헤더 |
//!
//! 서명은 자격증명과 요청 한도 상태를 변경하지 않습니다.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use money_core::{Credential, Venue};

use crate::error::{ExchangeError, ExchangeResult};

type HmacSha256 = Hmac<Sha256>;

/// 서명 결과.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedRequest {
    /// 요청에 추가할 인증 헤더
    pub headers: Vec<(&'static str, String)>,
    /// 전송할 최종 쿼리 파라미터 (Binance는 `timestamp`, `signature` 포함)
    pub query: Vec<(String, String)>,
}

impl SignedRequest {
    /// 서명에 사용한 것과 동일한 인코딩의 쿼리 문자열.
    pub fn query_string(&self) -> String {
        canonical_query(&self.query)
    }

    /// 헤더 값 조회.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// 쿼리 파라미터를 `application/x-www-form-urlencoded` 형식으로 직렬화합니다.
///
/// 파라미터 순서는 입력 순서를 유지합니다.
pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in params {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}

/// 거래소별 인증 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authenticator {
    Binance,
    Coinbase,
    Okx,
}

impl Authenticator {
    /// 거래소에 맞는 인증 방식. 온체인 조회는 서명하지 않습니다.
    pub fn for_venue(venue: Venue) -> Option<Self> {
        match venue {
            Venue::Binance => Some(Authenticator::Binance),
            Venue::Coinbase => Some(Authenticator::Coinbase),
            Venue::Okx => Some(Authenticator::Okx),
            Venue::OnChain => None,
        }
    }

    pub fn venue(&self) -> Venue {
        match self {
            Authenticator::Binance => Venue::Binance,
            Authenticator::Coinbase => Venue::Coinbase,
            Authenticator::Okx => Venue::Okx,
        }
    }

    /// 현재 시각으로 요청을 서명합니다.
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        query: &[(String, String)],
        body: &str,
        credential: Option<&Credential>,
    ) -> ExchangeResult<SignedRequest> {
        self.sign_at(method, path, query, body, credential, Utc::now())
    }

    /// 주어진 시각으로 요청을 서명합니다.
    ///
    /// Binance 쿼리에 이미 `timestamp`가 있으면 그 값을 사용합니다.
    pub fn sign_at(
        &self,
        method: &str,
        path: &str,
        query: &[(String, String)],
        body: &str,
        credential: Option<&Credential>,
        now: DateTime<Utc>,
    ) -> ExchangeResult<SignedRequest> {
        let credential =
            credential.ok_or_else(|| ExchangeError::MissingCredential(self.venue().to_string()))?;

        match self {
            Authenticator::Binance => Self::sign_binance(query, credential, now),
            Authenticator::Coinbase => {
                let timestamp = coinbase_timestamp(now);
                let prehash = prehash(&timestamp, method, path, query, body);
                let signature = sign_base64(credential.secret(), &prehash)?;

                let mut headers = vec![
                    ("CB-ACCESS-KEY", credential.key.clone()),
                    ("CB-ACCESS-SIGN", signature),
                    ("CB-ACCESS-TIMESTAMP", timestamp),
                ];
                if let Some(passphrase) = credential.passphrase() {
                    headers.push(("CB-ACCESS-PASSPHRASE", passphrase.to_string()));
                }
                Ok(SignedRequest {
                    headers,
                    query: query.to_vec(),
                })
            }
            Authenticator::Okx => {
                let timestamp = okx_timestamp(now);
                let prehash = prehash(&timestamp, method, path, query, body);
                let signature = sign_base64(credential.secret(), &prehash)?;

                let mut headers = vec![
                    ("OK-ACCESS-KEY", credential.key.clone()),
                    ("OK-ACCESS-SIGN", signature),
                    ("OK-ACCESS-TIMESTAMP", timestamp),
                ];
                if let Some(passphrase) = credential.passphrase() {
                    headers.push(("OK-ACCESS-PASSPHRASE", passphrase.to_string()));
                }
                Ok(SignedRequest {
                    headers,
                    query: query.to_vec(),
                })
            }
        }
    }

    fn sign_binance(
        query: &[(String, String)],
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> ExchangeResult<SignedRequest> {
        let mut params = query.to_vec();
        if !params.iter().any(|(k, _)| k == "timestamp") {
            params.push(("timestamp".to_string(), now.timestamp_millis().to_string()));
        }

        let payload = canonical_query(&params);
        let mut mac = HmacSha256::new_from_slice(credential.secret().as_bytes())
            .map_err(|e| ExchangeError::Signing(e.to_string()))?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        params.push(("signature".to_string(), signature));
        Ok(SignedRequest {
            headers: vec![("X-MBX-APIKEY", credential.key.clone())],
            query: params,
        })
    }
}

/// `timestamp + METHOD + /path(?query) + body`
fn prehash(
    timestamp: &str,
    method: &str,
    path: &str,
    query: &[(String, String)],
    body: &str,
) -> String {
    let mut request_path = format!("/{}", path.trim_start_matches('/'));
    let query = canonical_query(query);
    if !query.is_empty() {
        request_path.push('?');
        request_path.push_str(&query);
    }
    format!(
        "{}{}{}{}",
        timestamp,
        method.to_ascii_uppercase(),
        request_path,
        body
    )
}

/// base64 시크릿으로 HMAC-SHA256 서명 후 base64 인코딩.
fn sign_base64(secret: &str, prehash: &str) -> ExchangeResult<String> {
    let key = BASE64
        .decode(secret)
        .map_err(|e| ExchangeError::Signing(format!("secret is not valid base64: {}", e)))?;
    let mut mac =
        HmacSha256::new_from_slice(&key).map_err(|e| ExchangeError::Signing(e.to_string()))?;
    mac.update(prehash.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// 초 단위 소수 타임스탬프 (예: `1700000000.123`).
fn coinbase_timestamp(now: DateTime<Utc>) -> String {
    format!("{}.{:03}", now.timestamp(), now.timestamp_subsec_millis())
}

/// 밀리초 정밀도 ISO-8601 UTC 타임스탬프 (예: `2023-11-14T22:13:20.123Z`).
fn okx_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
