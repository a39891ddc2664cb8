//! TradingView 웹훅 수집기.
//!
//! 처리 순서: 인증 → 파싱 → 정규화 → 저장.
//! 모든 값은 쓰기 전에 검증되므로 거부된 요청은 저장소를 변경하지 않습니다.
//!
//! # 페이로드 형식
//!
//! ```json
//! {"symbol":"BTCUSD","indicator":"RSI","value":"{{plot_0}}","timeframe":"1D","secret":"..."}
//! ```
//!
//! 다중 출력 지표는 `value2`/`value3`를 함께 보낼 수 있습니다:
//! - `macd`: `value2` → `macd_signal`, `value2`가 있을 때 `value3` → `macd_histogram`
//! - `bb`: `value` → `bb` 와 `bb_upper`, `value2` → `bb_lower`

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{IndicatorKey, IndicatorRecord, DEFAULT_SOURCE, DEFAULT_TIMEFRAME};
use crate::error::Rejection;
use crate::store::IndicatorStore;

/// 지표 별칭 (소문자 입력 → 저장 이름).
const INDICATOR_ALIASES: &[(&str, &str)] = &[("200ma", "ma200"), ("bollinger", "bb")];

/// 웹훅 처리 성공 결과.
#[derive(Debug, Clone)]
pub struct IngestAck {
    /// 정규화된 심볼
    pub symbol: String,
    /// 하위 키 (예: `rsi_1d`)
    pub key: String,
    /// 저장된 레코드
    pub record: Arc<IndicatorRecord>,
    /// 함께 기록된 보조 값
    pub companions: Vec<CompanionWrite>,
}

/// 다중 출력 지표의 보조 값 기록 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionWrite {
    /// 하위 키 (예: `macd_signal_1d`)
    pub key: String,
    /// 저장된 값
    pub value: f64,
}

/// 검증을 마친 쓰기 계획.
struct ValidatedAlert {
    key: IndicatorKey,
    value: f64,
    source: String,
    companions: Vec<(IndicatorKey, f64)>,
}

/// 웹훅 수집기.
pub struct WebhookIngestor {
    store: Arc<IndicatorStore>,
    secret: Option<SecretString>,
}

impl std::fmt::Debug for WebhookIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookIngestor")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl WebhookIngestor {
    /// 새 수집기를 생성합니다.
    ///
    /// 빈 시크릿은 미설정과 같으며, 이 경우 모든 요청을 허용합니다.
    pub fn new(store: Arc<IndicatorStore>, secret: Option<SecretString>) -> Self {
        let secret = secret.filter(|s| !s.expose_secret().is_empty());
        Self { store, secret }
    }

    /// 시크릿 검증 활성화 여부.
    pub fn is_secured(&self) -> bool {
        self.secret.is_some()
    }

    /// 대상 저장소.
    pub fn store(&self) -> &Arc<IndicatorStore> {
        &self.store
    }

    /// 원시 페이로드를 처리합니다.
    ///
    /// `provided_secret`은 헤더나 쿼리로 전달된 시크릿입니다. 없으면 본문의
    /// `secret` 필드를 사용합니다.
    ///
    /// # Errors
    /// - `unauthorized`: 시크릿 불일치
    /// - `malformed_payload`: JSON 파싱 실패, 객체가 아님, 필수 필드 누락
    /// - `invalid_value`: 값을 유한한 숫자로 변환할 수 없음
    pub fn handle(
        &self,
        raw: &[u8],
        provided_secret: Option<&str>,
    ) -> Result<IngestAck, Rejection> {
        let parsed: Result<Value, _> = serde_json::from_slice(raw);

        if let Some(expected) = &self.secret {
            let body_secret = parsed
                .as_ref()
                .ok()
                .and_then(|v| v.get("secret"))
                .and_then(Value::as_str);
            let candidate = provided_secret.or(body_secret).unwrap_or_default();

            if !constant_time_eq(candidate.as_bytes(), expected.expose_secret().as_bytes()) {
                warn!("Webhook rejected: secret mismatch");
                return Err(Rejection::unauthorized());
            }
        }

        let payload = parsed.map_err(|e| Rejection::malformed(format!("invalid JSON: {}", e)))?;
        let object = payload
            .as_object()
            .ok_or_else(|| Rejection::malformed("payload must be a JSON object"))?;

        let alert = validate(object)?;

        let record = self
            .store
            .put_with_source(&alert.key, alert.value, &alert.source);
        let companions = alert
            .companions
            .iter()
            .map(|(key, value)| {
                self.store.put_with_source(key, *value, &alert.source);
                CompanionWrite {
                    key: key.sub_key(),
                    value: *value,
                }
            })
            .collect();

        debug!(
            key = %alert.key,
            value = alert.value,
            source = %alert.source,
            "Webhook alert stored"
        );

        Ok(IngestAck {
            symbol: alert.key.symbol().to_string(),
            key: alert.key.sub_key(),
            record,
            companions,
        })
    }
}

fn validate(object: &Map<String, Value>) -> Result<ValidatedAlert, Rejection> {
    let symbol = required_str(object, "symbol")?;
    let indicator = required_str(object, "indicator")?;
    let timeframe = optional_label(object, "timeframe")?.unwrap_or_else(|| DEFAULT_TIMEFRAME.into());
    let source = optional_label(object, "source")?.unwrap_or_else(|| DEFAULT_SOURCE.into());

    let value = match object.get("value") {
        None | Some(Value::Null) => {
            return Err(Rejection::malformed("missing required field 'value'"));
        }
        Some(v) => coerce_value("value", v)?,
    };

    let indicator = canonical_indicator(indicator);
    let key = IndicatorKey::new(symbol, &indicator, &timeframe);

    let companion_value = |field: &str| -> Result<Option<f64>, Rejection> {
        match object.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => coerce_value(field, v).map(Some),
        }
    };

    let mut companions = Vec::new();
    match key.indicator() {
        "macd" => {
            // 히스토그램은 시그널과 함께 올 때만 기록
            if let Some(v) = companion_value("value2")? {
                companions.push((IndicatorKey::new(symbol, "macd_signal", &timeframe), v));
                if let Some(h) = companion_value("value3")? {
                    companions.push((IndicatorKey::new(symbol, "macd_histogram", &timeframe), h));
                }
            }
        }
        "bb" => {
            companions.push((IndicatorKey::new(symbol, "bb_upper", &timeframe), value));
            if let Some(v) = companion_value("value2")? {
                companions.push((IndicatorKey::new(symbol, "bb_lower", &timeframe), v));
            }
        }
        _ => {}
    }

    Ok(ValidatedAlert {
        key,
        value,
        source,
        companions,
    })
}

fn required_str<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a str, Rejection> {
    match object.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) => Err(Rejection::malformed(format!("field '{}' is empty", field))),
        Some(_) => Err(Rejection::malformed(format!("field '{}' must be a string", field))),
        None => Err(Rejection::malformed(format!("missing required field '{}'", field))),
    }
}

/// 선택 문자열 필드. TradingView `{{interval}}`이 따옴표 없이 들어오는 경우를 위해 숫자도 허용합니다.
fn optional_label(object: &Map<String, Value>, field: &str) -> Result<Option<String>, Rejection> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(Rejection::malformed(format!(
            "field '{}' must be a string",
            field
        ))),
    }
}

fn coerce_value(field: &str, value: &Value) -> Result<f64, Rejection> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(Rejection::invalid_value(format!(
            "field '{}' is not a finite number: {}",
            field, value
        ))),
    }
}

fn canonical_indicator(indicator: &str) -> String {
    let lowered = indicator.trim().to_lowercase();
    INDICATOR_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(lowered)
}

/// 길이가 같은 입력에 대해 비교 시간이 내용과 무관한 비교.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
