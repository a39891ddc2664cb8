//! Binance USDⓈ-M 선물 포지션 수집기.
//!
//! 서명된 REST 요청(HMAC-SHA256)으로 `/fapi/v2/positionRisk`를 조회합니다.
//! 메인넷과 테스트넷 모두 지원.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use relay_core::{ExchangeCredentials, FetchError, PositionFetcher, RawPosition};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;
use tracing::{debug, error};

use crate::error::{ExchangeError, ExchangeResult};

type HmacSha256 = Hmac<Sha256>;

const MAINNET_URL: &str = "https://fapi.binance.com";
const TESTNET_URL: &str = "https://testnet.binancefuture.com";
const POSITION_RISK_ENDPOINT: &str = "/fapi/v2/positionRisk";

// ============================================================================
// 설정
// ============================================================================

/// Binance 선물 클라이언트 설정.
///
/// # 보안
/// - `Debug` 구현은 민감 정보(`api_key`, `api_secret`)를 마스킹합니다.
#[derive(Clone)]
pub struct BinanceFuturesConfig {
    /// API 키
    pub api_key: String,
    /// API 시크릿
    pub api_secret: SecretString,
    /// 테스트넷 사용
    pub testnet: bool,
    /// REST 기본 URL 오버라이드 (테스트/프록시용)
    pub base_url: Option<String>,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 수신 윈도우 (밀리초)
    pub recv_window: u64,
}

impl fmt::Debug for BinanceFuturesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chars: Vec<char> = self.api_key.chars().collect();
        let masked_key = if chars.len() > 8 {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", head, tail)
        } else {
            "***REDACTED***".to_string()
        };

        f.debug_struct("BinanceFuturesConfig")
            .field("api_key", &masked_key)
            .field("api_secret", &"***REDACTED***")
            .field("testnet", &self.testnet)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("recv_window", &self.recv_window)
            .finish()
    }
}

impl BinanceFuturesConfig {
    /// 새 설정 생성.
    pub fn new(api_key: impl Into<String>, api_secret: SecretString) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret,
            testnet: false,
            base_url: None,
            timeout_secs: 10,
            recv_window: 5000,
        }
    }

    /// 검증된 자격 증명에서 생성.
    pub fn from_credentials(credentials: &ExchangeCredentials) -> Self {
        Self {
            testnet: credentials.testnet,
            base_url: credentials.base_url.clone(),
            ..Self::new(credentials.api_key.clone(), credentials.api_secret.clone())
        }
    }

    /// 테스트넷 사용.
    pub fn with_testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    /// REST 기본 URL 지정.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// REST API 기본 URL 반환.
    pub fn rest_base_url(&self) -> &str {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/'),
            None if self.testnet => TESTNET_URL,
            None => MAINNET_URL,
        }
    }
}

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinancePositionRisk {
    symbol: String,
    position_amt: String,
    entry_price: String,
    mark_price: Option<String>,
    un_realized_profit: String,
    leverage: Option<String>,
    update_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BinanceError {
    code: i32,
    msg: String,
}

// ============================================================================
// Binance 클라이언트
// ============================================================================

/// Binance 선물 클라이언트.
pub struct BinanceFuturesClient {
    config: BinanceFuturesConfig,
    client: Client,
}

impl fmt::Debug for BinanceFuturesClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceFuturesClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BinanceFuturesClient {
    /// 새 Binance 선물 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ExchangeError::NetworkError`를 반환합니다.
    pub fn new(config: BinanceFuturesConfig) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ExchangeError::NetworkError(format!("HTTP 클라이언트 생성 실패: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// 설정 참조.
    pub fn config(&self) -> &BinanceFuturesConfig {
        &self.config
    }

    /// 현재 타임스탬프(밀리초) 반환.
    fn timestamp_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// HMAC-SHA256으로 쿼리 문자열 서명.
    fn sign(&self, query: &str) -> ExchangeResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.expose_secret().as_bytes())
            .map_err(|e| ExchangeError::Unauthorized(format!("invalid api secret: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// 파라미터에서 쿼리 문자열 생성.
    fn build_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// 서명된 API 요청 (인증 필요).
    async fn signed_get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let url = format!("{}{}", self.config.rest_base_url(), endpoint);

        let mut all_params = params.to_vec();
        all_params.push(("timestamp", Self::timestamp_ms().to_string()));
        all_params.push(("recvWindow", self.config.recv_window.to_string()));

        let query = Self::build_query(&all_params);
        let signature = self.sign(&query)?;
        let full_url = format!("{}?{}&signature={}", url, query, signature);

        debug!("GET (signed) {}", endpoint);

        let response = self
            .client
            .get(&full_url)
            .header("X-MBX-APIKEY", &self.config.api_key)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// API 응답 처리.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> ExchangeResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                error!("Failed to parse response: {} - Body: {}", e, body);
                ExchangeError::ParseError(e.to_string())
            });
        }

        // 에러 응답 파싱 시도
        if let Ok(error) = serde_json::from_str::<BinanceError>(&body) {
            return Err(map_error_code(error.code, &error.msg));
        }

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExchangeError::Unauthorized(body),
            StatusCode::TOO_MANY_REQUESTS | StatusCode::IM_A_TEAPOT => ExchangeError::RateLimited,
            _ => ExchangeError::ApiError {
                code: i32::from(status.as_u16()),
                message: body,
            },
        })
    }

    /// 선물 계좌의 모든 포지션 조회 (수량 0 포함).
    pub async fn position_risk(&self) -> ExchangeResult<Vec<RawPosition>> {
        let entries: Vec<BinancePositionRisk> =
            self.signed_get(POSITION_RISK_ENDPOINT, &[]).await?;
        entries.into_iter().map(to_raw_position).collect()
    }
}

/// Binance 에러 코드를 ExchangeError로 매핑.
fn map_error_code(code: i32, msg: &str) -> ExchangeError {
    match code {
        -1002 | -1022 | -2014 | -2015 => ExchangeError::Unauthorized(msg.to_string()),
        -1003 => ExchangeError::RateLimited,
        -1001 => ExchangeError::NetworkError(msg.to_string()),
        -1021 => ExchangeError::TimestampError(msg.to_string()),
        -1000 => ExchangeError::Unknown(msg.to_string()),
        _ => ExchangeError::ApiError {
            code,
            message: msg.to_string(),
        },
    }
}

fn parse_number(field: &str, value: &str) -> ExchangeResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ExchangeError::ParseError(format!("{} is not numeric: {}", field, value)))
}

fn to_raw_position(entry: BinancePositionRisk) -> ExchangeResult<RawPosition> {
    let mut raw = RawPosition::new(
        entry.symbol,
        parse_number("positionAmt", &entry.position_amt)?,
        parse_number("entryPrice", &entry.entry_price)?,
        parse_number("unRealizedProfit", &entry.un_realized_profit)?,
    );
    raw.mark_price = entry
        .mark_price
        .as_deref()
        .map(|v| parse_number("markPrice", v))
        .transpose()?;
    raw.leverage = entry.leverage.as_deref().and_then(|v| v.trim().parse().ok());
    raw.updated_at = entry
        .update_time
        .filter(|ms| *ms > 0)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
    Ok(raw)
}

#[async_trait]
impl PositionFetcher for BinanceFuturesClient {
    async fn fetch_positions(&self) -> Result<Vec<RawPosition>, FetchError> {
        self.position_risk().await.map_err(FetchError::from)
    }

    fn exchange_name(&self) -> &str {
        if self.config.testnet {
            "binance-futures-testnet"
        } else {
            "binance-futures"
        }
    }
}
